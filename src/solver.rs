//! Two-phase solving pipeline.
//!
//! Phase 1 solves the hard rules alone and falls back to an all-rest schedule
//! when no candidate is found. Phase 2 re-solves with the weighted penalty
//! terms, anchored to the Phase 1 schedule. Both phases build a fresh model.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::backend::{SolveStatus, SolverBackend};
use crate::config::SolverSettings;
#[cfg(feature = "console")]
use crate::console::{self, PhaseTimer};
use crate::constraints::hard::HardConstraintBuilder;
use crate::constraints::soft::{PenaltyScore, SoftConstraintBuilder};
use crate::domain::{RequestTable, Schedule, ShiftDomain};
use crate::error::ScheduleError;
use crate::model::CpModel;
use crate::validation::{validate, Violation};

/// Default time limit per phase: 10 seconds.
const DEFAULT_TIME_LIMIT_SECS: u64 = 10;

/// Time limits of the two phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolverConfig {
    pub initial_time_limit: Duration,
    pub refine_time_limit: Duration,
}

impl SolverConfig {
    /// Creates a config with the default 10-second limit per phase.
    pub fn default_config() -> Self {
        Self {
            initial_time_limit: Duration::from_secs(DEFAULT_TIME_LIMIT_SECS),
            refine_time_limit: Duration::from_secs(DEFAULT_TIME_LIMIT_SECS),
        }
    }

    pub fn from_settings(settings: &SolverSettings) -> Self {
        Self {
            initial_time_limit: Duration::from_secs(settings.initial_time_limit_secs),
            refine_time_limit: Duration::from_secs(settings.refine_time_limit_secs),
        }
    }

    /// Same limit for both phases.
    pub fn with_time_limit(limit: Duration) -> Self {
        Self {
            initial_time_limit: limit,
            refine_time_limit: limit,
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

/// Outcome of Phase 1.
#[derive(Debug, Clone)]
pub struct InitialSolution {
    pub schedule: Schedule,
    pub status: SolveStatus,
    /// The schedule is the all-rest fallback.
    pub used_fallback: bool,
    pub elapsed: Duration,
}

/// Outcome of a successful Phase 2.
#[derive(Debug, Clone)]
pub struct RefinedSolution {
    pub schedule: Schedule,
    pub status: SolveStatus,
    pub objective: Option<i64>,
    pub score: PenaltyScore,
    pub elapsed: Duration,
}

/// Solves the hard rules only.
///
/// Accepts any candidate the backend returns, including one from a search that
/// ran out of time. Without a candidate every cell is set to the rest code.
pub fn solve_initial<B: SolverBackend>(
    domain: &ShiftDomain,
    requests: &RequestTable,
    backend: &B,
    config: &SolverConfig,
) -> InitialSolution {
    #[cfg(feature = "console")]
    let timer = PhaseTimer::start("HardFeasibility", 0);

    let mut model = CpModel::new("phase1");
    let cube = HardConstraintBuilder::new(domain, requests).build(&mut model);
    #[cfg(feature = "console")]
    console::print_model_size("HardFeasibility", model.vars().len(), model.constraints().len());

    let outcome = backend.solve(&model, config.initial_time_limit);
    info!(
        phase = "initial",
        backend = backend.name(),
        status = %outcome.status,
        objective = ?outcome.objective,
        elapsed_ms = outcome.elapsed.as_millis() as u64,
        "Solve finished"
    );

    let decoded = match outcome.status {
        SolveStatus::Optimal | SolveStatus::Feasible | SolveStatus::Unknown => {
            cube.decode(domain, &outcome)
        }
        SolveStatus::Infeasible => None,
    };
    let (schedule, used_fallback) = match decoded {
        Some(schedule) => (schedule, false),
        None => {
            warn!(
                status = %outcome.status,
                "No feasible schedule found, falling back to all rest"
            );
            (Schedule::filled(domain, domain.roles.rest), true)
        }
    };

    #[cfg(feature = "console")]
    timer.finish(outcome.status, outcome.objective);

    InitialSolution {
        schedule,
        status: outcome.status,
        used_fallback,
        elapsed: outcome.elapsed,
    }
}

/// Re-solves with the weighted penalties, anchored to `anchor`.
///
/// Only a proven optimum or a feasible incumbent is accepted.
pub fn refine<B: SolverBackend>(
    domain: &ShiftDomain,
    requests: &RequestTable,
    anchor: &Schedule,
    backend: &B,
    config: &SolverConfig,
) -> Result<RefinedSolution, ScheduleError> {
    #[cfg(feature = "console")]
    let timer = PhaseTimer::start("SoftRefinement", 1);

    let hard = HardConstraintBuilder::new(domain, requests);
    let mut model = CpModel::new("phase2");
    let (cube, _) = SoftConstraintBuilder::new(&hard, Some(anchor)).build(&mut model);
    #[cfg(feature = "console")]
    console::print_model_size("SoftRefinement", model.vars().len(), model.constraints().len());

    let outcome = backend.solve(&model, config.refine_time_limit);
    info!(
        phase = "refine",
        backend = backend.name(),
        status = %outcome.status,
        objective = ?outcome.objective,
        elapsed_ms = outcome.elapsed.as_millis() as u64,
        "Solve finished"
    );

    #[cfg(feature = "console")]
    timer.finish(outcome.status, outcome.objective);

    if !outcome.status.is_solution() {
        return Err(ScheduleError::RefinementFailed {
            status: outcome.status,
        });
    }
    let schedule = cube
        .decode(domain, &outcome)
        .ok_or(ScheduleError::RefinementFailed {
            status: outcome.status,
        })?;
    let score = PenaltyScore::of(domain, &schedule, Some(anchor));
    info!(
        rest = score.rest,
        night = score.night,
        shift = score.shift,
        compound = score.compound,
        stability = score.stability,
        "Refined schedule penalties"
    );

    Ok(RefinedSolution {
        schedule,
        status: outcome.status,
        objective: outcome.objective,
        score,
        elapsed: outcome.elapsed,
    })
}

/// Everything one pipeline run produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub initial: InitialSolution,
    pub refined: Result<RefinedSolution, ScheduleError>,
    /// Findings on the final schedule.
    pub violations: Vec<Violation>,
    pub elapsed: Duration,
}

impl RunOutcome {
    /// The refined schedule, or the Phase 1 schedule when refinement failed.
    pub fn final_schedule(&self) -> &Schedule {
        match &self.refined {
            Ok(refined) => &refined.schedule,
            Err(_) => &self.initial.schedule,
        }
    }

    pub fn final_status(&self) -> SolveStatus {
        match &self.refined {
            Ok(refined) => refined.status,
            Err(_) => self.initial.status,
        }
    }

    pub fn is_refined(&self) -> bool {
        self.refined.is_ok()
    }
}

/// Runs Phase 1, Phase 2 and validation.
///
/// Refinement is skipped when Phase 1 had to fall back, since the same hard
/// rules are re-applied in Phase 2.
///
/// ```no_run
/// use shift_scheduling::backend::PumpkinBackend;
/// use shift_scheduling::demo_data::DemoData;
/// use shift_scheduling::domain::{RequestTable, ShiftDomain};
/// use shift_scheduling::solver::{run_pipeline, SolverConfig};
///
/// let domain = ShiftDomain::new(&DemoData::Small.config()).unwrap();
/// let requests = RequestTable::for_domain(&domain);
/// let outcome = run_pipeline(&domain, &requests, &PumpkinBackend, &SolverConfig::default_config());
/// println!("{}", outcome.final_schedule());
/// ```
pub fn run_pipeline<B: SolverBackend>(
    domain: &ShiftDomain,
    requests: &RequestTable,
    backend: &B,
    config: &SolverConfig,
) -> RunOutcome {
    let start = Instant::now();
    #[cfg(feature = "console")]
    console::print_config(
        domain.staff.len(),
        domain.num_days(),
        domain.codes.len(),
        requests.len(),
    );
    info!(
        staff = domain.staff.len(),
        days = domain.num_days(),
        codes = domain.codes.len(),
        requests = requests.len(),
        "Starting shift scheduling"
    );

    let initial = solve_initial(domain, requests, backend, config);
    let refined = if initial.used_fallback {
        info!("Skipping refinement of the fallback schedule");
        Err(ScheduleError::RefinementFailed {
            status: initial.status,
        })
    } else {
        refine(domain, requests, &initial.schedule, backend, config)
    };
    if let Err(err) = &refined {
        warn!(error = %err, "Keeping the initial schedule");
    }

    let final_schedule = match &refined {
        Ok(refined) => &refined.schedule,
        Err(_) => &initial.schedule,
    };
    let violations = validate(domain, final_schedule);
    let elapsed = start.elapsed();

    let outcome = RunOutcome {
        initial,
        refined,
        violations,
        elapsed,
    };
    info!(
        status = %outcome.final_status(),
        refined = outcome.is_refined(),
        violations = outcome.violations.len(),
        duration_secs = elapsed.as_secs_f64(),
        "Solving complete"
    );

    #[cfg(feature = "console")]
    console::print_solving_ended(
        elapsed,
        outcome.final_status(),
        outcome.refined.as_ref().ok().and_then(|r| r.objective),
        outcome.initial.used_fallback,
        outcome.violations.len(),
    );

    outcome
}

#[cfg(test)]
mod tests {
    use chrono::Weekday;

    use super::*;
    use crate::backend::{PumpkinBackend, SolveOutcome};
    use crate::config::{ClinicConfig, ObjectiveWeights, PinDay, StaffConfig};
    use crate::demo_data::DemoData;
    use crate::domain::ShiftCategory;

    struct NoAnswer;

    impl SolverBackend for NoAnswer {
        fn name(&self) -> &'static str {
            "none"
        }

        fn solve(&self, _: &CpModel, _: Duration) -> SolveOutcome {
            SolveOutcome::without_solution(SolveStatus::Unknown, Duration::ZERO)
        }
    }

    fn config() -> SolverConfig {
        SolverConfig::with_time_limit(Duration::from_secs(30))
    }

    /// The first `size` Tiny staff, all unrestricted, with open days needing only the night.
    fn short_roster(size: usize) -> ClinicConfig {
        let mut clinic = DemoData::Tiny.config();
        clinic.staff = clinic
            .staff
            .iter()
            .take(size)
            .map(|s| StaffConfig::new(s.id.clone()))
            .collect();
        clinic.rules.outpatient_minimum = 0;
        clinic.rules.ward_minimum = 0;
        clinic
    }

    fn assert_hard_rules(domain: &ShiftDomain, schedule: &Schedule) {
        let night = domain.symbol(domain.roles.night);
        let off = domain.symbol(domain.roles.off);
        let rest = domain.symbol(domain.roles.rest);
        for day in domain.day_numbers() {
            let nights = (0..domain.staff.len())
                .filter(|&s| schedule.code(s, day) == night)
                .count();
            assert_eq!(nights, 1, "day {day}");
        }
        for staff in &domain.staff {
            let row = schedule.row(staff.index);
            assert_eq!(row.len(), domain.num_days() as usize);
            assert!(row.iter().all(|code| domain.code_index(code).is_some()));
            for day in 1..domain.num_days() {
                if schedule.code(staff.index, day) == night {
                    assert_eq!(schedule.code(staff.index, day + 1), off);
                }
            }
            assert!(schedule.count(staff.index, rest) >= domain.rules.min_rest_days as usize);
        }
    }

    #[test]
    fn test_pipeline_on_tiny_clinic() {
        let domain = ShiftDomain::new(&DemoData::Tiny.config()).unwrap();
        let requests = RequestTable::for_domain(&domain);

        let outcome = run_pipeline(&domain, &requests, &PumpkinBackend, &config());

        assert!(!outcome.initial.used_fallback);
        assert_hard_rules(&domain, &outcome.initial.schedule);
        assert_hard_rules(&domain, outcome.final_schedule());
        assert!(outcome.violations.is_empty());
    }

    #[test]
    fn test_fallback_without_candidate() {
        let domain = ShiftDomain::new(&DemoData::Tiny.config()).unwrap();
        let requests = RequestTable::for_domain(&domain);

        let initial = solve_initial(&domain, &requests, &NoAnswer, &config());
        assert!(initial.used_fallback);
        assert_eq!(initial.status, SolveStatus::Unknown);
        assert_eq!(initial.schedule, Schedule::filled(&domain, domain.roles.rest));

        let refined = refine(&domain, &requests, &initial.schedule, &NoAnswer, &config());
        assert!(matches!(
            refined,
            Err(ScheduleError::RefinementFailed {
                status: SolveStatus::Unknown
            })
        ));
    }

    #[test]
    fn test_conflicting_pins_fall_back_to_rest() {
        let mut clinic = DemoData::Tiny.config();
        clinic.staff[0] = StaffConfig::new(clinic.staff[0].id.clone()).pin("〇", PinDay::Day(3));
        let domain = ShiftDomain::new(&clinic).unwrap();
        let mut requests = RequestTable::for_domain(&domain);
        requests.set(0, 3, "休");

        let outcome = run_pipeline(&domain, &requests, &PumpkinBackend, &config());

        assert_eq!(outcome.initial.status, SolveStatus::Infeasible);
        assert!(outcome.initial.used_fallback);
        assert!(!outcome.is_refined());
        let rest = domain.symbol(domain.roles.rest);
        assert!(outcome
            .final_schedule()
            .rows()
            .all(|(_, row)| row.iter().all(|code| code == rest)));
    }

    #[test]
    fn test_rest_request_on_open_first_day() {
        let domain = ShiftDomain::new(&short_roster(3)).unwrap();
        let mut requests = RequestTable::for_domain(&domain);
        requests.set(1, 1, "休");

        let outcome = run_pipeline(&domain, &requests, &PumpkinBackend, &config());

        assert!(!outcome.initial.used_fallback);
        assert!(outcome.is_refined());
        assert_eq!(outcome.final_schedule().code(1, 1), "休");
        assert_hard_rules(&domain, outcome.final_schedule());
    }

    #[test]
    fn test_rest_request_on_closed_first_day() {
        let mut clinic = short_roster(4);
        clinic.calendar.closed_weekdays = vec![Weekday::Mon];
        let domain = ShiftDomain::new(&clinic).unwrap();
        let mut requests = RequestTable::for_domain(&domain);
        requests.set(1, 1, "休");

        let outcome = run_pipeline(&domain, &requests, &PumpkinBackend, &config());
        let schedule = outcome.final_schedule();

        assert!(!outcome.initial.used_fallback);
        assert!(outcome.is_refined());
        assert_eq!(schedule.code(1, 1), "休");
        for staff in 0..domain.staff.len() {
            let code = domain.code_index(schedule.code(staff, 1)).unwrap();
            assert!(domain.codes[code].category.allowed_when_closed());
        }
        assert_hard_rules(&domain, schedule);
    }

    #[test]
    fn test_closed_day_without_three_workers_falls_back() {
        // Night, early and late rotation need three people; one of three rests.
        let mut clinic = short_roster(3);
        clinic.calendar.closed_weekdays = vec![Weekday::Mon];
        let domain = ShiftDomain::new(&clinic).unwrap();
        let mut requests = RequestTable::for_domain(&domain);
        requests.set(1, 1, "休");

        let outcome = run_pipeline(&domain, &requests, &PumpkinBackend, &config());

        assert_eq!(outcome.initial.status, SolveStatus::Infeasible);
        assert!(outcome.initial.used_fallback);
        assert!(!outcome.is_refined());
        assert_eq!(
            outcome.final_schedule(),
            &Schedule::filled(&domain, domain.roles.rest)
        );

        let feasible = run_pipeline(
            &domain,
            &RequestTable::for_domain(&domain),
            &PumpkinBackend,
            &config(),
        );
        assert!(!feasible.initial.used_fallback);
    }

    #[test]
    fn test_stability_only_refinement_keeps_schedule() {
        let mut clinic = DemoData::Tiny.config();
        clinic.weights = ObjectiveWeights::stability_only();
        let domain = ShiftDomain::new(&clinic).unwrap();
        let requests = RequestTable::for_domain(&domain);

        let initial = solve_initial(&domain, &requests, &PumpkinBackend, &config());
        assert!(!initial.used_fallback);
        let refined =
            refine(&domain, &requests, &initial.schedule, &PumpkinBackend, &config()).unwrap();

        assert_eq!(refined.status, SolveStatus::Optimal);
        assert_eq!(refined.objective, Some(0));
        assert_eq!(refined.schedule, initial.schedule);
    }

    #[test]
    fn test_refined_schedule_honours_restrictions() {
        let domain = ShiftDomain::new(&DemoData::Tiny.config()).unwrap();
        let mut requests = RequestTable::for_domain(&domain);
        requests.set(2, 5, "休");

        let outcome = run_pipeline(&domain, &requests, &PumpkinBackend, &config());
        let schedule = outcome.final_schedule();

        assert_eq!(schedule.code(2, 5), "休");
        let night_free = domain
            .staff
            .iter()
            .filter(|s| s.restriction.forbidden.contains(&ShiftCategory::Night));
        for staff in night_free {
            assert_eq!(schedule.count(staff.index, domain.symbol(domain.roles.night)), 0);
        }
    }

    #[test]
    fn test_config_from_settings() {
        let settings = SolverSettings {
            initial_time_limit_secs: 3,
            refine_time_limit_secs: 7,
        };
        let config = SolverConfig::from_settings(&settings);
        assert_eq!(config.initial_time_limit, Duration::from_secs(3));
        assert_eq!(config.refine_time_limit, Duration::from_secs(7));
        assert_eq!(SolverConfig::default(), SolverConfig::default_config());
    }
}
