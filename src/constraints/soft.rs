//! Soft penalties and the weighted refinement objective.
//!
//! The builder re-applies every hard rule and adds five penalty terms:
//!
//! | term       | measures                                                     |
//! |------------|--------------------------------------------------------------|
//! | rest       | `|rest + off days − rest target|` per staff member           |
//! | night      | `|nights − night target|` per night-preferring staff member  |
//! | shift      | `|assignments of a code − even share|` per code              |
//! | compound   | staff who work nights but never the compound code            |
//! | stability  | cells that differ from the anchor schedule                   |

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ObjectiveWeights;
use crate::domain::{Schedule, ShiftDomain};
use crate::model::{CpModel, LinearExpr};

use super::hard::HardConstraintBuilder;
use super::VarCube;

/// Unweighted penalty expressions of one model.
#[derive(Debug, Clone, Default)]
pub struct PenaltyTerms {
    pub rest: LinearExpr,
    pub night: LinearExpr,
    pub shift: LinearExpr,
    pub compound: LinearExpr,
    pub stability: LinearExpr,
}

impl PenaltyTerms {
    /// Weighted sum; terms with a zero weight are left out.
    pub fn objective(&self, weights: &ObjectiveWeights) -> LinearExpr {
        [
            (&self.rest, weights.rest_balance),
            (&self.night, weights.night_balance),
            (&self.shift, weights.shift_balance),
            (&self.compound, weights.compound),
            (&self.stability, weights.stability),
        ]
        .into_iter()
        .filter(|(_, weight)| *weight != 0)
        .fold(LinearExpr::new(), |objective, (term, weight)| {
            objective.add_scaled(term, weight)
        })
    }
}

/// Builds the refinement model on top of the hard rules.
pub struct SoftConstraintBuilder<'a> {
    hard: &'a HardConstraintBuilder<'a>,
    anchor: Option<&'a Schedule>,
    weights: ObjectiveWeights,
}

impl<'a> SoftConstraintBuilder<'a> {
    /// Uses the weights configured on the domain.
    pub fn new(hard: &'a HardConstraintBuilder<'a>, anchor: Option<&'a Schedule>) -> Self {
        Self {
            hard,
            anchor,
            weights: hard.domain().weights.clone(),
        }
    }

    pub fn with_weights(mut self, weights: ObjectiveWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Adds hard rules, penalty terms and the objective to `model`.
    pub fn build(&self, model: &mut CpModel) -> (VarCube, PenaltyTerms) {
        let cube = self.hard.build(model);
        let w = &self.weights;
        let terms = PenaltyTerms {
            rest: self.when(w.rest_balance, "rest balance", || self.rest_balance(model, &cube)),
            night: self.when(w.night_balance, "night balance", || self.night_balance(model, &cube)),
            shift: self.when(w.shift_balance, "shift balance", || self.shift_balance(model, &cube)),
            compound: self.when(w.compound, "compound", || self.compound(model, &cube)),
            stability: self.when(w.stability, "stability", || self.stability(model, &cube)),
        };
        model.minimize(terms.objective(w));
        (cube, terms)
    }

    fn when(&self, weight: i64, name: &str, build: impl FnOnce() -> (LinearExpr, usize)) -> LinearExpr {
        if weight == 0 {
            info!(term = name, "Skipping penalty term with zero weight");
            return LinearExpr::new();
        }
        let (expr, added) = build();
        info!(term = name, weight, penalties = added, "Added penalty term");
        expr
    }

    fn domain(&self) -> &'a ShiftDomain {
        self.hard.domain()
    }

    // =========================================================================
    // Rest + off days close to the target
    // =========================================================================
    fn rest_balance(&self, model: &mut CpModel, cube: &VarCube) -> (LinearExpr, usize) {
        let d = self.domain();
        let target = d.targets.rest_days;
        let days = i64::from(d.num_days());
        let bound = target.abs().max((days - target).abs());
        let rest_like = [d.roles.rest, d.roles.off];

        let mut vars = Vec::with_capacity(d.staff.len());
        for staff in &d.staff {
            let dev = model.new_int_var(0, bound, format!("rest_dev[{}]", staff.id));
            let count = cube.for_staff(d, staff.index, &rest_like).offset(-target);
            model.add_abs_equality(dev, count);
            vars.push(dev);
        }
        let added = vars.len();
        (LinearExpr::sum(vars), added)
    }

    // =========================================================================
    // Nights close to the target for night-preferring staff
    // =========================================================================
    fn night_balance(&self, model: &mut CpModel, cube: &VarCube) -> (LinearExpr, usize) {
        let d = self.domain();
        let target = d.targets.night_shifts;
        let bound = target.abs().max((i64::from(d.num_days()) - target).abs());

        let mut vars = Vec::new();
        for staff in d.staff.iter().filter(|s| s.night_preferred) {
            let diff = model.new_int_var(0, bound, format!("night_dev[{}]", staff.id));
            let nights = cube.for_staff(d, staff.index, &[d.roles.night]);
            model.add_ge(LinearExpr::sum([diff]).add_scaled(&nights, -1), -target);
            model.add_ge(LinearExpr::sum([diff]).add_scaled(&nights, 1), target);
            vars.push(diff);
        }
        let added = vars.len();
        (LinearExpr::sum(vars), added)
    }

    // =========================================================================
    // Even spread of every code
    // =========================================================================
    fn shift_balance(&self, model: &mut CpModel, cube: &VarCube) -> (LinearExpr, usize) {
        let d = self.domain();
        let slots = (d.staff.len() * d.days.len()) as i64;
        let average = even_share(d);

        let mut vars = Vec::with_capacity(d.codes.len());
        for code in &d.codes {
            let dev = model.new_int_var(0, slots, format!("shift_dev[{}]", code.symbol));
            let total = d
                .day_numbers()
                .fold(LinearExpr::new(), |expr, day| {
                    expr.add_scaled(&cube.on_day(d, day, code.index), 1)
                });
            model.add_ge(LinearExpr::sum([dev]).add_scaled(&total, -1), -average);
            model.add_ge(LinearExpr::sum([dev]).add_scaled(&total, 1), average);
            vars.push(dev);
        }
        let added = vars.len();
        (LinearExpr::sum(vars), added)
    }

    // =========================================================================
    // Night workers should also hold the compound code
    // =========================================================================
    fn compound(&self, model: &mut CpModel, cube: &VarCube) -> (LinearExpr, usize) {
        let d = self.domain();
        let Some(compound) = d.roles.compound else {
            return (LinearExpr::new(), 0);
        };

        let mut flags = Vec::with_capacity(d.staff.len());
        for staff in &d.staff {
            let nights = cube.for_staff(d, staff.index, &[d.roles.night]);
            let compounds = cube.for_staff(d, staff.index, &[compound]);

            let has_night = model.new_bool_var(format!("has_night[{}]", staff.id));
            model.add_ge(nights.clone(), 1).only_enforce_if(has_night);
            model.add_le(nights, 0).only_enforce_if(!has_night);

            let lacks_compound = model.new_bool_var(format!("lacks_compound[{}]", staff.id));
            model.add_eq(compounds.clone(), 0).only_enforce_if(lacks_compound);
            model.add_ge(compounds, 1).only_enforce_if(!lacks_compound);

            let flag = model.new_bool_var(format!("compound_flag[{}]", staff.id));
            model
                .add_bool_and(&[has_night.into(), lacks_compound.into()])
                .only_enforce_if(flag);
            model
                .add_bool_or(&[!has_night, !lacks_compound])
                .only_enforce_if(!flag);
            flags.push(flag);
        }
        let added = flags.len();
        (LinearExpr::sum(flags), added)
    }

    // =========================================================================
    // Stay close to the anchor schedule
    // =========================================================================
    fn stability(&self, model: &mut CpModel, cube: &VarCube) -> (LinearExpr, usize) {
        let d = self.domain();
        let Some(anchor) = self.anchor else {
            return (LinearExpr::new(), 0);
        };

        let mut changed = Vec::new();
        for staff in &d.staff {
            for day in d.day_numbers() {
                let symbol = anchor.code(staff.index, day);
                let Some(code) = d.code_index(symbol) else {
                    warn!(staff = %staff.id, day, symbol, "Anchor holds an unknown code, not anchoring");
                    continue;
                };
                let kept = cube.get(staff.index, day, code);
                let flag = model.new_bool_var(format!("changed[{},{}]", staff.id, day));
                model.add_eq(LinearExpr::sum([kept, flag]), 1);
                model.add_hint(kept, 1);
                changed.push(flag);
            }
        }
        let added = changed.len();
        (LinearExpr::sum(changed), added)
    }
}

/// `⌊|staff| · |days| / |codes|⌋`.
fn even_share(domain: &ShiftDomain) -> i64 {
    let slots = (domain.staff.len() * domain.days.len()) as i64;
    slots / domain.codes.len().max(1) as i64
}

/// Penalty values of a concrete schedule, computed without a solver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PenaltyScore {
    pub rest: i64,
    pub night: i64,
    pub shift: i64,
    pub compound: i64,
    pub stability: i64,
}

impl PenaltyScore {
    /// Scores `schedule`; stability is measured against `anchor` when given.
    ///
    /// ```
    /// use shift_scheduling::constraints::soft::PenaltyScore;
    /// use shift_scheduling::demo_data::DemoData;
    /// use shift_scheduling::domain::{Schedule, ShiftDomain};
    ///
    /// let domain = ShiftDomain::new(&DemoData::Tiny.config()).unwrap();
    /// let all_rest = Schedule::filled(&domain, domain.roles.rest);
    /// let score = PenaltyScore::of(&domain, &all_rest, Some(&all_rest));
    ///
    /// assert_eq!(score.stability, 0);
    /// assert_eq!(score.compound, 0);
    /// ```
    pub fn of(domain: &ShiftDomain, schedule: &Schedule, anchor: Option<&Schedule>) -> Self {
        let rest_symbol = domain.symbol(domain.roles.rest);
        let off_symbol = domain.symbol(domain.roles.off);
        let night_symbol = domain.symbol(domain.roles.night);

        let rest = domain
            .staff
            .iter()
            .map(|s| {
                let count = schedule.count(s.index, rest_symbol) + schedule.count(s.index, off_symbol);
                (count as i64 - domain.targets.rest_days).abs()
            })
            .sum();
        let night = domain
            .staff
            .iter()
            .filter(|s| s.night_preferred)
            .map(|s| (schedule.count(s.index, night_symbol) as i64 - domain.targets.night_shifts).abs())
            .sum();
        let average = even_share(domain);
        let shift = domain
            .codes
            .iter()
            .map(|code| {
                let total: usize = (0..domain.staff.len())
                    .map(|s| schedule.count(s, &code.symbol))
                    .sum();
                (total as i64 - average).abs()
            })
            .sum();
        let compound = domain.roles.compound.map_or(0, |compound| {
            let compound_symbol = domain.symbol(compound);
            domain
                .staff
                .iter()
                .filter(|s| {
                    schedule.count(s.index, night_symbol) > 0
                        && schedule.count(s.index, compound_symbol) == 0
                })
                .count() as i64
        });
        let stability = anchor.map_or(0, |anchor| schedule.distance(anchor) as i64);

        Self {
            rest,
            night,
            shift,
            compound,
            stability,
        }
    }

    pub fn total(&self, weights: &ObjectiveWeights) -> i64 {
        weights.rest_balance * self.rest
            + weights.night_balance * self.night
            + weights.shift_balance * self.shift
            + weights.compound * self.compound
            + weights.stability * self.stability
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::backend::{PumpkinBackend, SolveStatus, SolverBackend};
    use crate::demo_data::DemoData;
    use crate::domain::RequestTable;

    fn tiny() -> ShiftDomain {
        ShiftDomain::new(&DemoData::Tiny.config()).unwrap()
    }

    #[test]
    fn test_zero_weights_are_skipped() {
        let domain = tiny();
        let requests = RequestTable::for_domain(&domain);
        let hard = HardConstraintBuilder::new(&domain, &requests);
        let anchor = Schedule::filled(&domain, domain.roles.rest);

        let mut model = CpModel::new("stability-only");
        let (_, terms) = SoftConstraintBuilder::new(&hard, Some(&anchor))
            .with_weights(ObjectiveWeights::stability_only())
            .build(&mut model);

        assert!(terms.rest.is_constant());
        assert_eq!(terms.stability.terms().len(), 5 * 7);
        assert_eq!(
            model.objective().map(|o| o.terms().len()),
            Some(5 * 7)
        );
    }

    #[test]
    fn test_score_of_hand_built_schedule() {
        let domain = tiny();
        let mut schedule = Schedule::filled(&domain, domain.roles.rest);
        // Staff 0 works a night and the following off day.
        schedule.set(0, 1, "夜");
        schedule.set(0, 2, "×");
        let anchor = Schedule::filled(&domain, domain.roles.rest);

        let score = PenaltyScore::of(&domain, &schedule, Some(&anchor));

        let days = domain.num_days() as i64;
        let target = domain.targets.rest_days;
        let expected_rest = (days - 1 - target).abs() + 4 * (days - target).abs();
        assert_eq!(score.rest, expected_rest);
        assert_eq!(score.stability, 1 + 1);
        assert_eq!(score.compound, 0);
    }

    #[test]
    fn test_objective_matches_score() {
        let domain = tiny();
        let requests = RequestTable::for_domain(&domain);
        let hard = HardConstraintBuilder::new(&domain, &requests);

        let mut model = CpModel::new("phase2");
        let (cube, _) = SoftConstraintBuilder::new(&hard, None).build(&mut model);
        let outcome = PumpkinBackend.solve(&model, Duration::from_secs(20));
        assert!(outcome.status.is_solution());

        let schedule = cube.decode(&domain, &outcome).unwrap();
        let score = PenaltyScore::of(&domain, &schedule, None).total(&domain.weights);
        let objective = outcome.objective.unwrap();
        assert!(objective >= score);
        if outcome.status == SolveStatus::Optimal {
            assert_eq!(objective, score);
        }
    }

    fn compound_only() -> ObjectiveWeights {
        ObjectiveWeights {
            rest_balance: 0,
            night_balance: 0,
            shift_balance: 0,
            compound: 1,
            stability: 0,
        }
    }

    #[test]
    fn test_compound_score_counts_night_workers_without_compound() {
        let domain = ShiftDomain::new(&DemoData::Small.config()).unwrap();
        let mut schedule = Schedule::filled(&domain, domain.roles.rest);
        schedule.set(0, 1, "夜");
        schedule.set(0, 2, "×");
        schedule.set(3, 5, "夜");
        schedule.set(3, 6, "×");
        assert_eq!(PenaltyScore::of(&domain, &schedule, None).compound, 2);

        schedule.set(3, 8, "4");
        assert_eq!(PenaltyScore::of(&domain, &schedule, None).compound, 1);

        // The compound code alone is no penalty.
        schedule.set(5, 8, "4");
        assert_eq!(PenaltyScore::of(&domain, &schedule, None).compound, 1);
    }

    #[test]
    fn test_compound_objective_matches_score() {
        let domain = ShiftDomain::new(&DemoData::Small.config()).unwrap();
        assert!(domain.roles.compound.is_some());
        let requests = RequestTable::for_domain(&domain);
        let hard = HardConstraintBuilder::new(&domain, &requests);

        let mut model = CpModel::new("compound");
        let (cube, terms) = SoftConstraintBuilder::new(&hard, None)
            .with_weights(compound_only())
            .build(&mut model);
        assert_eq!(terms.compound.terms().len(), domain.staff.len());

        let outcome = PumpkinBackend.solve(&model, Duration::from_secs(20));
        assert!(outcome.status.is_solution());
        let values = outcome.values.as_deref().unwrap();
        assert!(model.is_satisfied_by(values));

        // Every flag is tied both ways to its staff member's schedule.
        let schedule = cube.decode(&domain, &outcome).unwrap();
        let score = PenaltyScore::of(&domain, &schedule, None);
        assert_eq!(outcome.objective, Some(score.compound));
        assert_eq!(terms.compound.evaluate(values), score.compound);
    }
}
