//! Domain model for clinic duty scheduling.
//!
//! [`ShiftDomain`] is the resolved, index-based view of a [`ClinicConfig`]:
//! staff, shift codes and days are addressed by position so the constraint
//! builders can work on plain indices.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{ClinicConfig, ObjectiveWeights, PinDay, SoftTargets, StaffingRules};
use crate::error::ConfigError;

/// What kind of duty a shift code stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftCategory {
    Rest,
    Off,
    Night,
    EarlyRotation,
    LateRotation,
    Outpatient,
    Ward,
    Visit,
    Other,
}

impl ShiftCategory {
    /// Whether a code of this category may be worked while the clinic is closed.
    pub fn allowed_when_closed(self) -> bool {
        matches!(
            self,
            ShiftCategory::Rest
                | ShiftCategory::Off
                | ShiftCategory::Night
                | ShiftCategory::EarlyRotation
                | ShiftCategory::LateRotation
        )
    }
}

/// An enumerated shift code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftCode {
    pub index: usize,
    pub symbol: String,
    pub category: ShiftCategory,
}

/// Opening status of a day, derived from its weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    Open,
    Closed,
    HalfDay,
}

/// One day of the period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Day {
    /// 1-based day number.
    pub number: u32,
    pub weekday: Weekday,
    pub status: DayStatus,
}

/// Per-staff restriction rule with code symbols resolved to indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Restriction {
    pub forbidden: HashSet<ShiftCategory>,
    pub allowed: Option<Vec<usize>>,
    /// Resolved `(day, code)` pins.
    pub pins: Vec<(u32, usize)>,
}

impl Restriction {
    /// Whether this rule forbids `code` on every day.
    pub fn forbids(&self, code: &ShiftCode) -> bool {
        self.forbidden.contains(&code.category)
            || self
                .allowed
                .as_ref()
                .is_some_and(|allowed| !allowed.contains(&code.index))
    }

    pub fn is_unrestricted(&self) -> bool {
        self.forbidden.is_empty() && self.allowed.is_none()
    }
}

/// A staff member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Staff {
    /// Index of this staff member in `ShiftDomain.staff`.
    pub index: usize,
    pub id: String,
    pub restriction: Restriction,
    pub night_preferred: bool,
    pub prev_period_night: bool,
}

/// Indices of codes with a fixed role in the rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleCodes {
    pub rest: usize,
    pub off: usize,
    pub night: usize,
    pub early_rotation: usize,
    pub late_rotation: usize,
    pub half_day_coverage: usize,
    pub compound: Option<usize>,
}

/// Resolved substitute rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    pub primary: usize,
    pub code: usize,
    pub substitutes: Vec<usize>,
}

/// Immutable static configuration of one run.
#[derive(Debug, Clone)]
pub struct ShiftDomain {
    pub staff: Vec<Staff>,
    pub codes: Vec<ShiftCode>,
    pub days: Vec<Day>,
    pub roles: RoleCodes,
    pub rules: StaffingRules,
    pub targets: SoftTargets,
    pub weights: ObjectiveWeights,
    pub substitutions: Vec<Substitution>,
    code_index: HashMap<String, usize>,
    staff_index: HashMap<String, usize>,
}

impl ShiftDomain {
    /// Resolves a configuration, failing on any inconsistency.
    pub fn new(config: &ClinicConfig) -> Result<Self, ConfigError> {
        let mut code_index = HashMap::new();
        let mut codes = Vec::with_capacity(config.shift_codes.len());
        for (index, entry) in config.shift_codes.iter().enumerate() {
            if code_index.insert(entry.symbol.clone(), index).is_some() {
                return Err(ConfigError::DuplicateCode(entry.symbol.clone()));
            }
            codes.push(ShiftCode {
                index,
                symbol: entry.symbol.clone(),
                category: entry.category,
            });
        }

        let designated = |category: ShiftCategory| -> Result<usize, ConfigError> {
            let mut matching = codes.iter().filter(|c| c.category == category);
            let first = matching
                .next()
                .ok_or(ConfigError::MissingCategory(category))?;
            if matching.next().is_some() {
                return Err(ConfigError::AmbiguousCategory(category));
            }
            Ok(first.index)
        };
        let lookup = |symbol: &str, context: &str| -> Result<usize, ConfigError> {
            code_index
                .get(symbol)
                .copied()
                .ok_or_else(|| ConfigError::UnknownCode {
                    code: symbol.to_string(),
                    context: context.to_string(),
                })
        };

        let roles = RoleCodes {
            rest: designated(ShiftCategory::Rest)?,
            off: designated(ShiftCategory::Off)?,
            night: designated(ShiftCategory::Night)?,
            early_rotation: designated(ShiftCategory::EarlyRotation)?,
            late_rotation: designated(ShiftCategory::LateRotation)?,
            half_day_coverage: lookup(&config.roles.half_day_coverage, "roles.half_day_coverage")?,
            compound: config
                .roles
                .compound_code
                .as_deref()
                .map(|symbol| lookup(symbol, "roles.compound_code"))
                .transpose()?,
        };

        let (num_days, first_weekday) = config.period.resolve()?;
        let days: Vec<Day> = (1..=num_days)
            .map(|number| {
                let weekday = nth_weekday_after(first_weekday, number - 1);
                let status = if config.calendar.closed_weekdays.contains(&weekday) {
                    DayStatus::Closed
                } else if config.calendar.half_day_weekdays.contains(&weekday) {
                    DayStatus::HalfDay
                } else {
                    DayStatus::Open
                };
                Day {
                    number,
                    weekday,
                    status,
                }
            })
            .collect();

        if config.staff.is_empty() {
            return Err(ConfigError::EmptyRoster);
        }
        let mut staff_index = HashMap::new();
        let mut staff = Vec::with_capacity(config.staff.len());
        for (index, entry) in config.staff.iter().enumerate() {
            if staff_index.insert(entry.id.clone(), index).is_some() {
                return Err(ConfigError::DuplicateStaff(entry.id.clone()));
            }
            let context = format!("staff '{}'", entry.id);
            let allowed = entry
                .allowed_codes
                .as_ref()
                .map(|symbols| {
                    symbols
                        .iter()
                        .map(|s| lookup(s, &context))
                        .collect::<Result<Vec<_>, _>>()
                })
                .transpose()?;
            let mut restriction = Restriction {
                forbidden: entry.forbidden.iter().copied().collect(),
                allowed,
                pins: Vec::new(),
            };
            for pin in &entry.pins {
                let code = lookup(&pin.code, &context)?;
                let Some(day) = resolve_pin_day(&days, pin.on) else {
                    warn!(staff = %entry.id, code = %pin.code, on = ?pin.on, "Pinned date is outside the period, skipping");
                    continue;
                };
                check_pin(
                    &entry.id,
                    &codes[code],
                    &days[day as usize - 1],
                    &restriction,
                    roles.half_day_coverage,
                )?;
                restriction.pins.push((day, code));
            }
            staff.push(Staff {
                index,
                id: entry.id.clone(),
                restriction,
                night_preferred: entry.night_preferred,
                prev_period_night: entry.prev_period_night,
            });
        }

        let substitutions = config
            .substitutes
            .iter()
            .map(|rule| {
                let staff_lookup = |id: &str| {
                    staff_index
                        .get(id)
                        .copied()
                        .ok_or_else(|| ConfigError::UnknownStaff {
                            id: id.to_string(),
                            context: format!("substitute rule for '{}'", rule.primary),
                        })
                };
                Ok(Substitution {
                    primary: staff_lookup(&rule.primary)?,
                    code: lookup(&rule.code, "substitute rule")?,
                    substitutes: rule
                        .substitutes
                        .iter()
                        .map(|id| staff_lookup(id))
                        .collect::<Result<Vec<_>, _>>()?,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            staff,
            codes,
            days,
            roles,
            rules: config.rules.clone(),
            targets: config.targets.clone(),
            weights: config.weights.clone(),
            substitutions,
            code_index,
            staff_index,
        })
    }

    pub fn num_days(&self) -> u32 {
        self.days.len() as u32
    }

    /// Returns day `number` (1-based).
    pub fn day(&self, number: u32) -> &Day {
        &self.days[number as usize - 1]
    }

    /// Iterates over the 1-based day numbers.
    pub fn day_numbers(&self) -> impl Iterator<Item = u32> {
        1..=self.num_days()
    }

    pub fn code_index(&self, symbol: &str) -> Option<usize> {
        self.code_index.get(symbol).copied()
    }

    pub fn staff_index(&self, id: &str) -> Option<usize> {
        self.staff_index.get(id).copied()
    }

    pub fn symbol(&self, code: usize) -> &str {
        &self.codes[code].symbol
    }

    /// Indices of all codes in `category`.
    pub fn codes_in(&self, category: ShiftCategory) -> Vec<usize> {
        self.codes
            .iter()
            .filter(|c| c.category == category)
            .map(|c| c.index)
            .collect()
    }

    /// Whether `code` may be worked on `day` given the closure rules.
    pub fn allowed_on(&self, code: usize, day: &Day) -> bool {
        let code = &self.codes[code];
        match day.status {
            DayStatus::Open => true,
            DayStatus::Closed => code.category.allowed_when_closed(),
            DayStatus::HalfDay => !banned_on_half_day(code, self.roles.half_day_coverage),
        }
    }
}

/// Outpatient and ward codes are banned on half-days, except the coverage code.
pub fn banned_on_half_day(code: &ShiftCode, half_day_coverage: usize) -> bool {
    matches!(
        code.category,
        ShiftCategory::Outpatient | ShiftCategory::Ward
    ) && code.index != half_day_coverage
}

fn nth_weekday_after(first: Weekday, offset: u32) -> Weekday {
    (0..offset % 7).fold(first, |weekday, _| weekday.succ())
}

fn resolve_pin_day(days: &[Day], on: PinDay) -> Option<u32> {
    match on {
        PinDay::Day(number) if (1..=days.len() as u32).contains(&number) => Some(number),
        PinDay::Day(_) => None,
        PinDay::NthWeekday { weekday, nth } => days
            .iter()
            .filter(|d| d.weekday == weekday)
            .nth((nth as usize).checked_sub(1)?)
            .map(|d| d.number),
    }
}

fn check_pin(
    staff: &str,
    code: &ShiftCode,
    day: &Day,
    restriction: &Restriction,
    half_day_coverage: usize,
) -> Result<(), ConfigError> {
    let conflict = |reason| ConfigError::PinConflict {
        staff: staff.to_string(),
        code: code.symbol.clone(),
        day: day.number,
        reason,
    };
    if restriction.forbids(code) {
        return Err(conflict("the staff member's own restriction"));
    }
    match day.status {
        DayStatus::Closed if !code.category.allowed_when_closed() => {
            Err(conflict("the closed-day code subset"))
        }
        DayStatus::HalfDay if banned_on_half_day(code, half_day_coverage) => {
            Err(conflict("the half-day ban"))
        }
        _ => Ok(()),
    }
}

/// Optional requested code per (staff, day), as read from the request file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTable {
    cells: Vec<Vec<Option<String>>>,
}

impl RequestTable {
    /// A table without requests, sized for `domain`.
    pub fn for_domain(domain: &ShiftDomain) -> Self {
        Self::empty(domain.staff.len(), domain.num_days())
    }

    pub fn empty(num_staff: usize, num_days: u32) -> Self {
        Self {
            cells: vec![vec![None; num_days as usize]; num_staff],
        }
    }

    /// Records a request; later requests for the same cell replace earlier ones.
    pub fn set(&mut self, staff: usize, day: u32, symbol: impl Into<String>) {
        self.cells[staff][day as usize - 1] = Some(symbol.into());
    }

    pub fn get(&self, staff: usize, day: u32) -> Option<&str> {
        self.cells
            .get(staff)
            .and_then(|row| row.get((day as usize).checked_sub(1)?))
            .and_then(|cell| cell.as_deref())
    }

    /// Iterates `(staff, day, symbol)` over all present requests.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u32, &str)> + '_ {
        self.cells.iter().enumerate().flat_map(|(staff, row)| {
            row.iter().enumerate().filter_map(move |(d, cell)| {
                cell.as_deref().map(|symbol| (staff, d as u32 + 1, symbol))
            })
        })
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Total mapping staff × day → shift symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    staff: Vec<String>,
    cells: Vec<Vec<String>>,
}

impl Schedule {
    /// Builds a schedule from explicit rows; every row must have the same length.
    pub fn new(staff: Vec<String>, cells: Vec<Vec<String>>) -> Self {
        debug_assert_eq!(staff.len(), cells.len());
        debug_assert!(cells.windows(2).all(|w| w[0].len() == w[1].len()));
        Self { staff, cells }
    }

    /// Every cell set to `code`.
    pub fn filled(domain: &ShiftDomain, code: usize) -> Self {
        let symbol = domain.symbol(code).to_string();
        Self::new(
            domain.staff.iter().map(|s| s.id.clone()).collect(),
            vec![vec![symbol; domain.num_days() as usize]; domain.staff.len()],
        )
    }

    /// Builds a schedule from per-cell code indices.
    pub fn from_indices(domain: &ShiftDomain, indices: &[Vec<usize>]) -> Self {
        Self::new(
            domain.staff.iter().map(|s| s.id.clone()).collect(),
            indices
                .iter()
                .map(|row| row.iter().map(|&c| domain.symbol(c).to_string()).collect())
                .collect(),
        )
    }

    pub fn staff(&self) -> &[String] {
        &self.staff
    }

    pub fn num_days(&self) -> u32 {
        self.cells.first().map_or(0, |row| row.len() as u32)
    }

    /// Code of `staff` on `day` (1-based).
    pub fn code(&self, staff: usize, day: u32) -> &str {
        &self.cells[staff][day as usize - 1]
    }

    pub fn set(&mut self, staff: usize, day: u32, symbol: impl Into<String>) {
        self.cells[staff][day as usize - 1] = symbol.into();
    }

    pub fn row(&self, staff: usize) -> &[String] {
        &self.cells[staff]
    }

    /// Iterates `(staff id, row)` pairs.
    pub fn rows(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.staff
            .iter()
            .map(String::as_str)
            .zip(self.cells.iter().map(Vec::as_slice))
    }

    /// How often `staff` holds `symbol` over the period.
    pub fn count(&self, staff: usize, symbol: &str) -> usize {
        self.cells[staff].iter().filter(|c| *c == symbol).count()
    }

    /// Number of cells that differ from `other`.
    pub fn distance(&self, other: &Schedule) -> usize {
        self.cells
            .iter()
            .flatten()
            .zip(other.cells.iter().flatten())
            .filter(|(a, b)| a != b)
            .count()
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.staff.iter().map(|s| s.chars().count()).max().unwrap_or(0);
        for (id, row) in self.rows() {
            write!(f, "{id:<width$} |")?;
            for code in row {
                write!(f, " {code}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaffConfig;

    fn config() -> ClinicConfig {
        let mut config = ClinicConfig::default();
        config.period.num_days = 14;
        config.staff = vec![
            StaffConfig::new("amy").forbid([ShiftCategory::Night]),
            StaffConfig::new("beth").allow_only(["CT", "2", "休", "×", "/訪"]).pin(
                "/訪",
                PinDay::NthWeekday {
                    weekday: Weekday::Tue,
                    nth: 2,
                },
            ),
            StaffConfig::new("carl"),
        ];
        config
    }

    #[test]
    fn test_resolves_roles_and_days() {
        let domain = ShiftDomain::new(&config()).unwrap();

        assert_eq!(domain.symbol(domain.roles.rest), "休");
        assert_eq!(domain.symbol(domain.roles.night), "夜");
        assert_eq!(domain.symbol(domain.roles.off), "×");
        assert_eq!(domain.symbol(domain.roles.half_day_coverage), "2/");
        assert_eq!(domain.num_days(), 14);
        assert_eq!(domain.day(1).weekday, Weekday::Mon);
        assert_eq!(domain.day(4).status, DayStatus::Closed);
        assert_eq!(domain.day(6).status, DayStatus::HalfDay);
        assert_eq!(domain.day(8).weekday, Weekday::Mon);
        assert_eq!(domain.day(8).status, DayStatus::Open);
    }

    #[test]
    fn test_resolves_restrictions_and_pins() {
        let domain = ShiftDomain::new(&config()).unwrap();
        let night = &domain.codes[domain.roles.night];

        assert!(domain.staff[0].restriction.forbids(night));
        assert!(domain.staff[1].restriction.forbids(night));
        assert!(!domain.staff[2].restriction.forbids(night));
        assert!(domain.staff[2].restriction.is_unrestricted());
        // Second Tuesday of a period starting on Monday.
        assert_eq!(
            domain.staff[1].restriction.pins,
            vec![(9, domain.code_index("/訪").unwrap())]
        );
    }

    #[test]
    fn test_half_day_ban_spares_coverage_code() {
        let domain = ShiftDomain::new(&config()).unwrap();
        let saturday = *domain.day(6);

        assert!(domain.allowed_on(domain.roles.half_day_coverage, &saturday));
        assert!(!domain.allowed_on(domain.code_index("1").unwrap(), &saturday));
        assert!(!domain.allowed_on(domain.code_index("〇").unwrap(), &saturday));
        assert!(domain.allowed_on(domain.code_index("早").unwrap(), &saturday));
    }

    #[test]
    fn test_rejects_unknown_code() {
        let mut config = config();
        config.staff[0].allowed_codes = Some(vec!["XYZ".into()]);

        let err = ShiftDomain::new(&config).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownCode { ref code, .. } if code == "XYZ"));
    }

    #[test]
    fn test_rejects_missing_designated_category() {
        let mut config = config();
        config
            .shift_codes
            .retain(|c| c.category != ShiftCategory::EarlyRotation);

        let err = ShiftDomain::new(&config).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingCategory(ShiftCategory::EarlyRotation)
        ));
    }

    #[test]
    fn test_rejects_duplicates() {
        let mut config = config();
        config.staff.push(StaffConfig::new("amy"));
        assert!(matches!(
            ShiftDomain::new(&config),
            Err(ConfigError::DuplicateStaff(_))
        ));

        let mut config = self::config();
        let first = config.shift_codes[0].clone();
        config.shift_codes.push(first);
        assert!(matches!(
            ShiftDomain::new(&config),
            Err(ConfigError::DuplicateCode(_))
        ));
    }

    #[test]
    fn test_rejects_pin_on_closed_day() {
        let mut config = config();
        config.staff[1].pins[0].on = PinDay::NthWeekday {
            weekday: Weekday::Thu,
            nth: 2,
        };

        let err = ShiftDomain::new(&config).unwrap_err();
        assert!(matches!(err, ConfigError::PinConflict { day: 11, .. }));
    }

    #[test]
    fn test_half_day_pins_follow_the_half_day_ban() {
        let mut config = config();
        config.staff[2] = StaffConfig::new("carl").pin("2/", PinDay::Day(6));
        let domain = ShiftDomain::new(&config).unwrap();
        assert_eq!(
            domain.staff[2].restriction.pins,
            vec![(6, domain.roles.half_day_coverage)]
        );

        config.staff[2] = StaffConfig::new("carl").pin("1", PinDay::Day(6));
        let err = ShiftDomain::new(&config).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::PinConflict {
                day: 6,
                reason: "the half-day ban",
                ..
            }
        ));
    }

    #[test]
    fn test_skips_pin_outside_period() {
        let mut config = config();
        config.staff[1].pins[0].on = PinDay::Day(40);

        let domain = ShiftDomain::new(&config).unwrap();
        assert!(domain.staff[1].restriction.pins.is_empty());
    }

    #[test]
    fn test_request_table() {
        let mut table = RequestTable::empty(2, 5);
        table.set(1, 3, "休");
        table.set(0, 5, "夜");

        assert_eq!(table.get(1, 3), Some("休"));
        assert_eq!(table.get(1, 4), None);
        assert_eq!(table.get(7, 1), None);
        assert_eq!(
            table.iter().collect::<Vec<_>>(),
            vec![(0, 5, "夜"), (1, 3, "休")]
        );
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_schedule_counts() {
        let domain = ShiftDomain::new(&config()).unwrap();
        let mut schedule = Schedule::filled(&domain, domain.roles.rest);
        schedule.set(2, 1, "夜");
        schedule.set(2, 2, "×");

        assert_eq!(schedule.num_days(), 14);
        assert_eq!(schedule.code(2, 1), "夜");
        assert_eq!(schedule.count(2, "休"), 12);
        assert_eq!(schedule.distance(&Schedule::filled(&domain, domain.roles.rest)), 2);
    }
}
