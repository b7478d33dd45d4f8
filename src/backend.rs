//! Constraint-solver engines.
//!
//! [`SolverBackend`] is the seam between the model builders and a concrete
//! engine. [`PumpkinBackend`] runs models on the Pumpkin CP solver with a
//! linear SAT-UNSAT search over the objective.

use std::fmt;
use std::time::{Duration, Instant};

use pumpkin_solver::branching::branchers::dynamic_brancher::DynamicBrancher;
use pumpkin_solver::branching::branchers::warm_start::WarmStart;
use pumpkin_solver::branching::Brancher;
use pumpkin_solver::constraints as cp;
use pumpkin_solver::optimisation::linear_sat_unsat::LinearSatUnsat;
use pumpkin_solver::optimisation::OptimisationDirection;
use pumpkin_solver::results::{OptimisationResult, ProblemSolution, SolutionReference};
use pumpkin_solver::termination::TimeBudget;
use pumpkin_solver::variables::{AffineView, DomainId, Literal, TransformableVariable};
use pumpkin_solver::Solver;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::model::{self, ConstraintKind, CpModel, LinearExpr, VarId};

/// Engine verdict for one solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolveStatus {
    /// Proven optimal.
    Optimal,
    /// A solution exists but optimality is not proven.
    Feasible,
    /// Proven to have no solution.
    Infeasible,
    /// Stopped without a verdict.
    Unknown,
}

impl SolveStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SolveStatus::Optimal => "OPTIMAL",
            SolveStatus::Feasible => "FEASIBLE",
            SolveStatus::Infeasible => "INFEASIBLE",
            SolveStatus::Unknown => "UNKNOWN",
        }
    }

    /// Whether the status carries a solution.
    pub fn is_solution(self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::Feasible)
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    /// One value per model variable, when a candidate was found.
    pub values: Option<Vec<i64>>,
    pub objective: Option<i64>,
    pub elapsed: Duration,
}

impl SolveOutcome {
    pub fn without_solution(status: SolveStatus, elapsed: Duration) -> Self {
        Self {
            status,
            values: None,
            objective: None,
            elapsed,
        }
    }

    pub fn value(&self, var: impl Into<VarId>) -> Option<i64> {
        let var = var.into();
        self.values.as_ref().map(|values| values[var.index()])
    }

    pub fn has_candidate(&self) -> bool {
        self.values.is_some()
    }
}

/// A constraint engine able to run a [`CpModel`].
pub trait SolverBackend {
    fn name(&self) -> &'static str;

    /// Solves `model`, giving up after `time_limit`.
    fn solve(&self, model: &CpModel, time_limit: Duration) -> SolveOutcome;
}

/// Runs models on the Pumpkin solver.
#[derive(Debug, Clone, Copy, Default)]
pub struct PumpkinBackend;

#[derive(Clone, Copy)]
enum EngineVar {
    Bool(Literal),
    Int(DomainId),
}

impl EngineVar {
    fn view(self, coef: i32) -> AffineView<DomainId> {
        match self {
            EngineVar::Bool(lit) => lit.get_integer_variable().scaled(coef),
            EngineVar::Int(domain) => domain.scaled(coef),
        }
    }
}

/// Translates a [`CpModel`] into a Pumpkin solver instance.
struct Translation {
    solver: Solver,
    vars: Vec<EngineVar>,
    /// Set when posting detected infeasibility at the root.
    infeasible: bool,
}

fn narrow(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

impl Translation {
    fn new(model: &CpModel) -> Self {
        let mut solver = Solver::default();
        let vars = model
            .vars()
            .iter()
            .map(|info| {
                if info.is_bool {
                    EngineVar::Bool(solver.new_literal())
                } else {
                    EngineVar::Int(solver.new_bounded_integer(narrow(info.lower), narrow(info.upper)))
                }
            })
            .collect();
        Self {
            solver,
            vars,
            infeasible: false,
        }
    }

    fn literal(&self, lit: model::Literal) -> Literal {
        let EngineVar::Bool(engine) = self.vars[lit.var().id().index()] else {
            unreachable!("boolean literal over an integer variable");
        };
        if lit.is_negated() {
            !engine
        } else {
            engine
        }
    }

    fn terms(&self, expr: &LinearExpr) -> Vec<AffineView<DomainId>> {
        expr.terms()
            .iter()
            .map(|&(var, coef)| self.vars[var.index()].view(narrow(coef)))
            .collect()
    }

    fn post_linear(
        &mut self,
        expr: &LinearExpr,
        lower: Option<i64>,
        upper: Option<i64>,
        enforcement: Option<Literal>,
    ) {
        let constant = expr.constant_term();
        if expr.is_constant() {
            let holds = lower.map_or(true, |l| constant >= l) && upper.map_or(true, |u| constant <= u);
            if !holds {
                match enforcement {
                    Some(lit) => self.post_clause_false(lit),
                    None => self.infeasible = true,
                }
            }
            return;
        }

        let terms = self.terms(expr);
        if lower.is_some() && lower == upper {
            let rhs = narrow(lower.unwrap_or_default() - constant);
            let tag = self.solver.new_constraint_tag();
            let ok = self.post(cp::equals(terms, rhs, tag), enforcement);
            self.infeasible |= !ok;
            return;
        }
        if let Some(lower) = lower {
            let tag = self.solver.new_constraint_tag();
            let ok = self.post(
                cp::greater_than_or_equals(terms.clone(), narrow(lower - constant), tag),
                enforcement,
            );
            self.infeasible |= !ok;
        }
        if let Some(upper) = upper {
            let tag = self.solver.new_constraint_tag();
            let ok = self.post(
                cp::less_than_or_equals(terms, narrow(upper - constant), tag),
                enforcement,
            );
            self.infeasible |= !ok;
        }
    }

    /// Forces `lit` false.
    fn post_clause_false(&mut self, lit: Literal) {
        let view = vec![lit.get_integer_variable().scaled(1)];
        let tag = self.solver.new_constraint_tag();
        let ok = self.post(cp::equals(view, 0, tag), None);
        self.infeasible |= !ok;
    }

    fn post(
        &mut self,
        constraint: impl cp::Constraint + 'static,
        enforcement: Option<Literal>,
    ) -> bool {
        let poster = self.solver.add_constraint(constraint);
        match enforcement {
            Some(lit) => poster.implied_by(lit).is_ok(),
            None => poster.post().is_ok(),
        }
    }

    fn post_abs(&mut self, model: &CpModel, target: VarId, expr: &LinearExpr) {
        let (lo, hi) = model.bounds(expr);
        let signed = self.solver.new_bounded_integer(narrow(lo), narrow(hi));
        let mut terms = self.terms(expr);
        terms.push(signed.scaled(-1));
        let tag = self.solver.new_constraint_tag();
        let ok = self
            .solver
            .add_constraint(cp::equals(terms, narrow(-expr.constant_term()), tag))
            .post()
            .is_ok();
        self.infeasible |= !ok;

        let absolute = self.vars[target.index()].view(1);
        let tag = self.solver.new_constraint_tag();
        let ok = self
            .solver
            .add_constraint(cp::absolute(signed, absolute, tag))
            .post()
            .is_ok();
        self.infeasible |= !ok;
    }

    /// Returns the domain the search minimises.
    fn objective(&mut self, model: &CpModel) -> DomainId {
        let Some(expr) = model.objective().filter(|o| !o.is_constant()) else {
            return self.solver.new_bounded_integer(0, 0);
        };
        let (lo, hi) = model.bounds(expr);
        let objective = self.solver.new_bounded_integer(narrow(lo), narrow(hi));
        let mut terms = self.terms(expr);
        terms.push(objective.scaled(-1));
        let tag = self.solver.new_constraint_tag();
        let ok = self
            .solver
            .add_constraint(cp::equals(terms, narrow(-expr.constant_term()), tag))
            .post()
            .is_ok();
        self.infeasible |= !ok;
        objective
    }
}

/// Tries the hinted values first, then falls back to the default search.
fn brancher(solver: &Solver, vars: &[EngineVar], hints: &[(VarId, i64)]) -> DynamicBrancher {
    let mut branchers: Vec<Box<dyn Brancher>> = Vec::with_capacity(2);
    if !hints.is_empty() {
        let (hinted, values): (Vec<AffineView<DomainId>>, Vec<i32>) = hints
            .iter()
            .map(|&(var, value)| (vars[var.index()].view(1), narrow(value)))
            .unzip();
        branchers.push(Box::new(WarmStart::new(&hinted, &values)));
    }
    branchers.push(Box::new(solver.default_brancher()));
    DynamicBrancher::new(branchers)
}

fn read_values(vars: &[EngineVar], solution: &impl ProblemSolution) -> Vec<i64> {
    vars.iter()
        .map(|v| solution.get_integer_value(v.view(1)) as i64)
        .collect()
}

fn noop_callback<B>(_: &Solver, _: SolutionReference, _: &B) {}

impl SolverBackend for PumpkinBackend {
    fn name(&self) -> &'static str {
        "pumpkin"
    }

    fn solve(&self, model: &CpModel, time_limit: Duration) -> SolveOutcome {
        let start = Instant::now();
        let mut translation = Translation::new(model);

        for constraint in model.constraints() {
            let enforcement = constraint.enforcement.map(|lit| translation.literal(lit));
            match &constraint.kind {
                ConstraintKind::Linear { expr, lower, upper } => {
                    translation.post_linear(expr, *lower, *upper, enforcement);
                }
                ConstraintKind::AbsEquality { target, expr } => {
                    if enforcement.is_some() {
                        warn!(
                            model = model.name(),
                            "Reified absolute-value constraints are not supported"
                        );
                        return SolveOutcome::without_solution(SolveStatus::Unknown, start.elapsed());
                    }
                    translation.post_abs(model, target.id(), expr);
                }
            }
            if translation.infeasible {
                break;
            }
        }
        let objective = translation.objective(model);

        if translation.infeasible {
            info!(model = model.name(), "Model infeasible at the root");
            return SolveOutcome::without_solution(SolveStatus::Infeasible, start.elapsed());
        }

        let Translation {
            mut solver, vars, ..
        } = translation;
        debug!(
            model = model.name(),
            hints = model.hints().len(),
            "Warm-starting search from hints"
        );
        let mut brancher = brancher(&solver, &vars, model.hints());
        let mut termination = TimeBudget::starting_now(time_limit);
        let result = solver.optimise(
            &mut brancher,
            &mut termination,
            LinearSatUnsat::new(OptimisationDirection::Minimise, objective, noop_callback),
        );

        let (status, values) = match result {
            OptimisationResult::Optimal(solution) => (
                SolveStatus::Optimal,
                Some(read_values(&vars, &solution)),
            ),
            OptimisationResult::Satisfiable(solution) => (
                SolveStatus::Feasible,
                Some(read_values(&vars, &solution)),
            ),
            OptimisationResult::Unsatisfiable => (SolveStatus::Infeasible, None),
            OptimisationResult::Unknown => (SolveStatus::Unknown, None),
        };
        let objective = values.as_deref().and_then(|v| model.objective_value(v));

        debug!(
            model = model.name(),
            status = status.as_str(),
            objective = ?objective,
            "Engine finished"
        );
        SolveOutcome {
            status,
            values,
            objective,
            elapsed: start.elapsed(),
        }
    }
}
