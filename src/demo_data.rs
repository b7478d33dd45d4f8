//! Demo clinics and request generators.

use chrono::Weekday;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{
    CalendarConfig, ClinicConfig, PeriodConfig, PinDay, RoleConfig, ShiftCodeConfig, SoftTargets,
    StaffConfig, StaffingRules, SubstituteRule,
};
use crate::domain::{RequestTable, ShiftCategory, ShiftDomain};

/// Probability that a staff member files a rest request.
const REQUEST_PROBABILITY: f64 = 0.6;

/// Most rest requests generated for a single day.
const MAX_REQUESTS_PER_DAY: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoData {
    /// Five staff, one week, every day open, reduced code set.
    Tiny,
    Small,
    Large,
}

impl std::str::FromStr for DemoData {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TINY" => Ok(DemoData::Tiny),
            "SMALL" => Ok(DemoData::Small),
            "LARGE" => Ok(DemoData::Large),
            _ => Err(()),
        }
    }
}

impl DemoData {
    pub fn as_str(&self) -> &'static str {
        match self {
            DemoData::Tiny => "TINY",
            DemoData::Small => "SMALL",
            DemoData::Large => "LARGE",
        }
    }

    fn parameters(&self) -> DemoDataParameters {
        match self {
            DemoData::Tiny => DemoDataParameters {
                names: &["ann", "ben", "cat", "dan", "eve"],
                days: 7,
                rules: StaffingRules {
                    outpatient_minimum: 1,
                    ward_minimum: 1,
                    min_rest_days: 1,
                },
                targets: SoftTargets {
                    rest_days: 2,
                    night_shifts: 1,
                },
            },
            DemoData::Small => DemoDataParameters {
                names: &["amy", "beth", "carl", "dan", "elsa", "flo", "gus", "hugo"],
                days: 14,
                rules: StaffingRules {
                    outpatient_minimum: 2,
                    ward_minimum: 1,
                    min_rest_days: 2,
                },
                targets: SoftTargets {
                    rest_days: 6,
                    night_shifts: 2,
                },
            },
            DemoData::Large => DemoDataParameters {
                names: &[
                    "amy", "beth", "carl", "dan", "elsa", "flo", "gus", "hugo", "ivy", "jack",
                    "kate", "liam",
                ],
                days: 28,
                rules: StaffingRules {
                    outpatient_minimum: 3,
                    ward_minimum: 2,
                    min_rest_days: 3,
                },
                targets: SoftTargets {
                    rest_days: 11,
                    night_shifts: 3,
                },
            },
        }
    }

    /// Builds the demo clinic configuration.
    pub fn config(&self) -> ClinicConfig {
        let params = self.parameters();
        let mut config = ClinicConfig {
            period: PeriodConfig {
                num_days: params.days,
                first_weekday: Weekday::Mon,
                year: None,
                month: None,
            },
            rules: params.rules,
            targets: params.targets,
            ..ClinicConfig::default()
        };

        if *self == DemoData::Tiny {
            config.calendar = CalendarConfig {
                closed_weekdays: Vec::new(),
                half_day_weekdays: Vec::new(),
            };
            config.shift_codes = [
                ("休", ShiftCategory::Rest),
                ("夜", ShiftCategory::Night),
                ("〇", ShiftCategory::Ward),
                ("1", ShiftCategory::Outpatient),
                ("×", ShiftCategory::Off),
                ("早日", ShiftCategory::EarlyRotation),
                ("残日", ShiftCategory::LateRotation),
                ("2/", ShiftCategory::Outpatient),
            ]
            .into_iter()
            .map(|(symbol, category)| ShiftCodeConfig::new(symbol, category))
            .collect();
            config.roles = RoleConfig {
                compound_code: None,
                ..RoleConfig::default()
            };
            config.staff = params.names.iter().map(|&name| StaffConfig::new(name)).collect();
            config.staff[1] = StaffConfig::new(params.names[1]).forbid([ShiftCategory::Night]);
            return config;
        }

        config.staff = params
            .names
            .iter()
            .enumerate()
            .map(|(i, &name)| match i {
                1 => StaffConfig::new(name).forbid([ShiftCategory::Night]),
                2 => StaffConfig::new(name)
                    .allow_only(["CT", "2", "休", "×", "/訪"])
                    .pin(
                        "/訪",
                        PinDay::NthWeekday {
                            weekday: Weekday::Tue,
                            nth: 2,
                        },
                    ),
                6 => StaffConfig {
                    night_preferred: true,
                    ..StaffConfig::new(name)
                },
                7 => StaffConfig {
                    prev_period_night: true,
                    ..StaffConfig::new(name)
                },
                _ => StaffConfig::new(name),
            })
            .collect();
        config.substitutes = vec![SubstituteRule {
            primary: params.names[2].to_string(),
            code: "CT".to_string(),
            substitutes: vec![params.names[3].to_string(), params.names[4].to_string()],
        }];
        config
    }
}

struct DemoDataParameters {
    names: &'static [&'static str],
    days: u32,
    rules: StaffingRules,
    targets: SoftTargets,
}

/// List of available demo data sets.
pub fn list_demo_data() -> Vec<&'static str> {
    vec!["TINY", "SMALL", "LARGE"]
}

/// Generates scattered rest requests for `domain`.
///
/// At most one request per staff member and [`MAX_REQUESTS_PER_DAY`] per day.
/// Days that are pinned for the staff member, or that must be off after a
/// night in the previous period, are never requested.
pub fn generate_requests(domain: &ShiftDomain) -> RequestTable {
    let mut rng = StdRng::seed_from_u64(0);
    let rest = domain.roles.rest;
    let rest_symbol = domain.symbol(rest);
    let mut per_day = vec![0usize; domain.num_days() as usize + 1];
    let mut table = RequestTable::for_domain(domain);

    for staff in &domain.staff {
        if staff.restriction.forbids(&domain.codes[rest]) || !rng.gen_bool(REQUEST_PROBABILITY) {
            continue;
        }
        let candidates: Vec<u32> = domain
            .day_numbers()
            .filter(|&day| per_day[day as usize] < MAX_REQUESTS_PER_DAY)
            .filter(|&day| !staff.restriction.pins.iter().any(|&(pinned, _)| pinned == day))
            .filter(|&day| !(staff.prev_period_night && day == 1))
            .collect();
        if let Some(&day) = candidates.choose(&mut rng) {
            table.set(staff.index, day, rest_symbol);
            per_day[day as usize] += 1;
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DayStatus;

    #[test]
    fn test_demo_configs_resolve() {
        for demo in [DemoData::Tiny, DemoData::Small, DemoData::Large] {
            let domain = ShiftDomain::new(&demo.config()).unwrap();
            assert_eq!(domain.staff.len(), demo.parameters().names.len());
        }
    }

    #[test]
    fn test_small_clinic_calendar_and_pin() {
        let domain = ShiftDomain::new(&DemoData::Small.config()).unwrap();

        assert_eq!(domain.num_days(), 14);
        assert_eq!(domain.day(4).status, DayStatus::Closed);
        assert_eq!(domain.day(6).status, DayStatus::HalfDay);
        assert_eq!(domain.day(7).status, DayStatus::Closed);
        let visit = domain.code_index("/訪").unwrap();
        assert_eq!(domain.staff[2].restriction.pins, vec![(9, visit)]);
        assert_eq!(domain.substitutions.len(), 1);
    }

    #[test]
    fn test_generated_requests() {
        let domain = ShiftDomain::new(&DemoData::Small.config()).unwrap();
        let requests = generate_requests(&domain);

        assert!(!requests.is_empty());
        assert_eq!(requests, generate_requests(&domain));
        for day in domain.day_numbers() {
            let count = (0..domain.staff.len())
                .filter(|&s| requests.get(s, day).is_some())
                .count();
            assert!(count <= MAX_REQUESTS_PER_DAY);
        }
        assert_eq!(requests.get(2, 9), None);
        assert_eq!(requests.get(7, 1), None);
        assert!(requests.iter().all(|(_, _, symbol)| symbol == "休"));
    }

    #[test]
    fn test_demo_data_from_str() {
        assert_eq!("small".parse::<DemoData>(), Ok(DemoData::Small));
        assert_eq!("TINY".parse::<DemoData>(), Ok(DemoData::Tiny));
        assert!("huge".parse::<DemoData>().is_err());
        assert_eq!(DemoData::Large.as_str(), "LARGE");
        assert_eq!(list_demo_data().len(), 3);
    }
}
