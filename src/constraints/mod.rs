//! Constraint builders for the two solve phases.
//!
//! Both phases share the [`VarCube`]: one boolean indicator per
//! (staff, day, shift code). [`hard::HardConstraintBuilder`] encodes the
//! feasibility rules, [`soft::SoftConstraintBuilder`] re-applies them and adds
//! the weighted penalty terms.

pub mod hard;
pub mod soft;

use tracing::warn;

use crate::backend::SolveOutcome;
use crate::domain::{Schedule, ShiftDomain};
use crate::model::{BoolVar, CpModel, LinearExpr};

/// Boolean indicator for every (staff, day, code) triple.
#[derive(Debug, Clone)]
pub struct VarCube {
    num_days: usize,
    num_codes: usize,
    vars: Vec<BoolVar>,
}

impl VarCube {
    /// Declares `|staff| × |days| × |codes|` fresh indicators on `model`.
    pub fn new(model: &mut CpModel, domain: &ShiftDomain) -> Self {
        let num_days = domain.num_days() as usize;
        let num_codes = domain.codes.len();
        let mut vars = Vec::with_capacity(domain.staff.len() * num_days * num_codes);
        for staff in &domain.staff {
            for day in domain.day_numbers() {
                for code in &domain.codes {
                    vars.push(model.new_bool_var(format!("x[{},{},{}]", staff.id, day, code.symbol)));
                }
            }
        }
        Self {
            num_days,
            num_codes,
            vars,
        }
    }

    /// Indicator for `staff` holding `code` on `day` (1-based).
    pub fn get(&self, staff: usize, day: u32, code: usize) -> BoolVar {
        self.vars[(staff * self.num_days + day as usize - 1) * self.num_codes + code]
    }

    /// Number of staff members holding `code` on `day`.
    pub fn on_day(&self, domain: &ShiftDomain, day: u32, code: usize) -> LinearExpr {
        LinearExpr::sum((0..domain.staff.len()).map(|s| self.get(s, day, code)))
    }

    /// Number of days `staff` holds any of `codes`.
    pub fn for_staff(&self, domain: &ShiftDomain, staff: usize, codes: &[usize]) -> LinearExpr {
        LinearExpr::sum(
            domain
                .day_numbers()
                .flat_map(|d| codes.iter().map(move |&c| (d, c)))
                .map(|(d, c)| self.get(staff, d, c)),
        )
    }

    /// Reads the schedule out of a solver candidate.
    ///
    /// Returns `None` when the outcome has no candidate. A cell without a true
    /// indicator decodes to the rest code.
    pub fn decode(&self, domain: &ShiftDomain, outcome: &SolveOutcome) -> Option<Schedule> {
        let values = outcome.values.as_deref()?;
        let rows: Vec<Vec<usize>> = domain
            .staff
            .iter()
            .map(|staff| {
                domain
                    .day_numbers()
                    .map(|day| {
                        (0..self.num_codes)
                            .find(|&c| values[self.get(staff.index, day, c).id().index()] != 0)
                            .unwrap_or_else(|| {
                                warn!(staff = %staff.id, day, "No code assigned, using rest");
                                domain.roles.rest
                            })
                    })
                    .collect()
            })
            .collect();
        Some(Schedule::from_indices(domain, &rows))
    }
}
