//! Hard feasibility rules.

use tracing::{info, warn};

use crate::domain::{DayStatus, RequestTable, ShiftCategory, ShiftDomain};
use crate::model::{CpModel, LinearExpr};

use super::VarCube;

/// Encodes the operational rules every schedule must satisfy.
///
/// ```
/// use shift_scheduling::constraints::hard::HardConstraintBuilder;
/// use shift_scheduling::demo_data::DemoData;
/// use shift_scheduling::domain::{RequestTable, ShiftDomain};
/// use shift_scheduling::model::CpModel;
///
/// let domain = ShiftDomain::new(&DemoData::Tiny.config()).unwrap();
/// let requests = RequestTable::for_domain(&domain);
/// let mut model = CpModel::new("phase1");
/// let cube = HardConstraintBuilder::new(&domain, &requests).build(&mut model);
///
/// assert_eq!(model.vars().len(), 5 * 7 * domain.codes.len());
/// let _ = cube.get(0, 1, domain.roles.rest);
/// ```
pub struct HardConstraintBuilder<'a> {
    domain: &'a ShiftDomain,
    requests: &'a RequestTable,
}

impl<'a> HardConstraintBuilder<'a> {
    pub fn new(domain: &'a ShiftDomain, requests: &'a RequestTable) -> Self {
        Self { domain, requests }
    }

    pub fn domain(&self) -> &'a ShiftDomain {
        self.domain
    }

    /// Declares a fresh cube on `model` and adds every hard rule to it.
    pub fn build(&self, model: &mut CpModel) -> VarCube {
        let cube = VarCube::new(model, self.domain);

        let groups: [(&str, fn(&Self, &mut CpModel, &VarCube) -> usize); 11] = [
            ("one shift per day", Self::one_shift_per_day),
            ("role restrictions", Self::role_restrictions),
            ("weekday closure", Self::weekday_closure),
            ("daily staffing minimums", Self::staffing_minimums),
            ("single night coverage", Self::single_night),
            ("rest after night", Self::rest_after_night),
            ("previous period carryover", Self::carryover),
            ("minimum total rest", Self::minimum_rest),
            ("request pinning", Self::request_pins),
            ("fixed pins", Self::fixed_pins),
            ("substitute coverage hints", Self::substitute_hints),
        ];
        for (name, add) in groups {
            let added = add(self, model, &cube);
            info!(group = name, constraints = added, "Added hard constraints");
        }
        cube
    }

    // =========================================================================
    // One shift per staff member and day
    // =========================================================================
    fn one_shift_per_day(&self, model: &mut CpModel, cube: &VarCube) -> usize {
        let d = self.domain;
        let mut added = 0;
        for staff in &d.staff {
            for day in d.day_numbers() {
                let all = LinearExpr::sum((0..d.codes.len()).map(|c| cube.get(staff.index, day, c)));
                model.add_eq(all, 1);
                added += 1;
            }
        }
        added
    }

    // =========================================================================
    // Forbidden categories and exclusive whitelists
    // =========================================================================
    fn role_restrictions(&self, model: &mut CpModel, cube: &VarCube) -> usize {
        let d = self.domain;
        let mut added = 0;
        for staff in d.staff.iter().filter(|s| !s.restriction.is_unrestricted()) {
            for code in d.codes.iter().filter(|c| staff.restriction.forbids(c)) {
                for day in d.day_numbers() {
                    model.add_eq(LinearExpr::sum([cube.get(staff.index, day, code.index)]), 0);
                    added += 1;
                }
            }
        }
        added
    }

    // =========================================================================
    // Closed and half-day weekdays
    // =========================================================================
    fn weekday_closure(&self, model: &mut CpModel, cube: &VarCube) -> usize {
        let d = self.domain;
        let mut added = 0;
        for day in d.days.iter().filter(|day| day.status != DayStatus::Open) {
            for code in d.codes.iter().filter(|c| !d.allowed_on(c.index, day)) {
                for staff in &d.staff {
                    model.add_eq(LinearExpr::sum([cube.get(staff.index, day.number, code.index)]), 0);
                    added += 1;
                }
            }
        }
        added
    }

    // =========================================================================
    // Daily staffing minimums
    // =========================================================================
    fn staffing_minimums(&self, model: &mut CpModel, cube: &VarCube) -> usize {
        let d = self.domain;
        let outpatient = d.codes_in(ShiftCategory::Outpatient);
        let ward = d.codes_in(ShiftCategory::Ward);
        let covering = |day: u32, codes: &[usize]| {
            codes
                .iter()
                .fold(LinearExpr::new(), |expr, &c| expr.add_scaled(&cube.on_day(d, day, c), 1))
        };

        let mut added = 0;
        for day in &d.days {
            match day.status {
                DayStatus::Open => {
                    model.add_ge(covering(day.number, &outpatient), d.rules.outpatient_minimum.into());
                    model.add_ge(covering(day.number, &ward), d.rules.ward_minimum.into());
                    added += 2;
                }
                DayStatus::Closed => {
                    model.add_eq(cube.on_day(d, day.number, d.roles.early_rotation), 1);
                    model.add_eq(cube.on_day(d, day.number, d.roles.late_rotation), 1);
                    added += 2;
                }
                DayStatus::HalfDay => {
                    model.add_ge(cube.on_day(d, day.number, d.roles.half_day_coverage), 1);
                    added += 1;
                }
            }
        }
        added
    }

    // =========================================================================
    // Exactly one night per day
    // =========================================================================
    fn single_night(&self, model: &mut CpModel, cube: &VarCube) -> usize {
        let d = self.domain;
        for day in d.day_numbers() {
            model.add_eq(cube.on_day(d, day, d.roles.night), 1);
        }
        d.days.len()
    }

    // =========================================================================
    // Night is followed by the off code
    // =========================================================================
    fn rest_after_night(&self, model: &mut CpModel, cube: &VarCube) -> usize {
        let d = self.domain;
        let mut added = 0;
        for staff in &d.staff {
            for day in 1..d.num_days() {
                let next_off = LinearExpr::sum([cube.get(staff.index, day + 1, d.roles.off)]);
                model
                    .add_eq(next_off, 1)
                    .only_enforce_if(cube.get(staff.index, day, d.roles.night));
                added += 1;
            }
        }
        added
    }

    // =========================================================================
    // Night on the last day of the previous period
    // =========================================================================
    fn carryover(&self, model: &mut CpModel, cube: &VarCube) -> usize {
        let d = self.domain;
        let mut added = 0;
        for staff in d.staff.iter().filter(|s| s.prev_period_night) {
            model.add_eq(LinearExpr::sum([cube.get(staff.index, 1, d.roles.off)]), 1);
            added += 1;
        }
        added
    }

    // =========================================================================
    // Minimum number of rest days
    // =========================================================================
    fn minimum_rest(&self, model: &mut CpModel, cube: &VarCube) -> usize {
        let d = self.domain;
        for staff in &d.staff {
            model.add_ge(
                cube.for_staff(d, staff.index, &[d.roles.rest]),
                d.rules.min_rest_days.into(),
            );
        }
        d.staff.len()
    }

    // =========================================================================
    // Requests are binding
    // =========================================================================
    fn request_pins(&self, model: &mut CpModel, cube: &VarCube) -> usize {
        let d = self.domain;
        let mut added = 0;
        for (staff, day, symbol) in self.requests.iter() {
            if staff >= d.staff.len() || day > d.num_days() {
                continue;
            }
            let Some(code) = d.code_index(symbol) else {
                warn!(staff = %d.staff[staff].id, day, symbol, "Unknown request symbol, skipping");
                continue;
            };
            model.add_eq(LinearExpr::sum([cube.get(staff, day, code)]), 1);
            added += 1;
        }
        added
    }

    // =========================================================================
    // Configured single-day pins
    // =========================================================================
    fn fixed_pins(&self, model: &mut CpModel, cube: &VarCube) -> usize {
        let mut added = 0;
        for staff in &self.domain.staff {
            for &(day, code) in &staff.restriction.pins {
                model.add_eq(LinearExpr::sum([cube.get(staff.index, day, code)]), 1);
                added += 1;
            }
        }
        added
    }

    // =========================================================================
    // Substitute coverage (advisory)
    // =========================================================================
    fn substitute_hints(&self, model: &mut CpModel, cube: &VarCube) -> usize {
        let d = self.domain;
        let mut added = 0;
        for rule in &d.substitutions {
            for day in d.day_numbers() {
                let covering = model.new_int_var(
                    0,
                    rule.substitutes.len() as i64,
                    format!("cover[{},{},{}]", d.staff[rule.primary].id, d.symbol(rule.code), day),
                );
                let on_code = LinearExpr::sum(rule.substitutes.iter().map(|&s| cube.get(s, day, rule.code)));
                model.add_eq(on_code.term(covering, -1), 0);
                model.add_hint(covering, 1);
                added += 1;
            }
        }
        added
    }
}
