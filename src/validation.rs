//! Post-hoc schedule checks.
//!
//! Independent of the solver: any schedule, including one read from outside,
//! can be checked for unknown codes and night shifts not followed by the off
//! code.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{Schedule, ShiftDomain};

/// A single finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Violation {
    /// A cell holds a symbol outside the code set.
    UnknownCode { staff: String, day: u32, code: String },
    /// A night on `day - 1` is followed by something other than the off code.
    NightNotFollowedByOff {
        staff: String,
        day: u32,
        found: String,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::UnknownCode { staff, day, code } => {
                write!(f, "Invalid shift '{code}' for {staff} on day {day}")
            }
            Violation::NightNotFollowedByOff { staff, day, found } => {
                write!(
                    f,
                    "Night shift not followed by off for {staff} on day {day} (found '{found}')"
                )
            }
        }
    }
}

/// Checks `schedule` and returns findings staff by staff.
///
/// Within one staff member, unknown codes are listed before night findings,
/// each in day order.
///
/// ```
/// use shift_scheduling::demo_data::DemoData;
/// use shift_scheduling::domain::{Schedule, ShiftDomain};
/// use shift_scheduling::validation::validate;
///
/// let domain = ShiftDomain::new(&DemoData::Tiny.config()).unwrap();
/// let schedule = Schedule::filled(&domain, domain.roles.rest);
/// assert!(validate(&domain, &schedule).is_empty());
/// ```
pub fn validate(domain: &ShiftDomain, schedule: &Schedule) -> Vec<Violation> {
    let night = domain.symbol(domain.roles.night);
    let off = domain.symbol(domain.roles.off);

    let mut violations = Vec::new();
    for (staff, row) in schedule.rows() {
        for (d, code) in row.iter().enumerate() {
            if domain.code_index(code).is_none() {
                violations.push(Violation::UnknownCode {
                    staff: staff.to_string(),
                    day: d as u32 + 1,
                    code: code.clone(),
                });
            }
        }
        for (d, pair) in row.windows(2).enumerate() {
            if pair[0] == night && pair[1] != off {
                violations.push(Violation::NightNotFollowedByOff {
                    staff: staff.to_string(),
                    day: d as u32 + 2,
                    found: pair[1].clone(),
                });
            }
        }
    }
    info!(violations = violations.len(), "Validated schedule");
    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo_data::DemoData;

    fn tiny() -> ShiftDomain {
        ShiftDomain::new(&DemoData::Tiny.config()).unwrap()
    }

    #[test]
    fn test_night_without_off() {
        let domain = tiny();
        let mut schedule = Schedule::filled(&domain, domain.roles.rest);
        schedule.set(1, 3, "夜");
        schedule.set(1, 4, "1");

        let violations = validate(&domain, &schedule);

        let staff = schedule.staff()[1].clone();
        assert_eq!(
            violations,
            vec![Violation::NightNotFollowedByOff {
                staff: staff.clone(),
                day: 4,
                found: "1".into(),
            }]
        );
        assert!(violations[0].to_string().contains(&staff));
        assert!(violations[0].to_string().contains("day 4"));
    }

    #[test]
    fn test_night_on_last_day_is_fine() {
        let domain = tiny();
        let mut schedule = Schedule::filled(&domain, domain.roles.rest);
        schedule.set(0, domain.num_days(), "夜");
        schedule.set(2, 1, "夜");
        schedule.set(2, 2, "×");

        assert!(validate(&domain, &schedule).is_empty());
    }

    #[test]
    fn test_unknown_codes_come_first() {
        let domain = tiny();
        let mut schedule = Schedule::filled(&domain, domain.roles.rest);
        schedule.set(0, 1, "夜");
        schedule.set(0, 5, "??");
        schedule.set(1, 2, "");

        let violations = validate(&domain, &schedule);

        assert_eq!(violations.len(), 3);
        assert!(matches!(&violations[0], Violation::UnknownCode { day: 5, code, .. } if code == "??"));
        assert!(matches!(violations[1], Violation::NightNotFollowedByOff { day: 2, .. }));
        assert!(matches!(&violations[2], Violation::UnknownCode { day: 2, code, .. } if code.is_empty()));
    }
}
