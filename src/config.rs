//! Run configuration loaded from TOML.
//!
//! Everything that used to be a global constant of the clinic (roster, shift
//! codes, weekday rules, weights) lives in [`ClinicConfig`]. It is loaded once
//! per run and resolved into an immutable [`ShiftDomain`].
//!
//! [`ShiftDomain`]: crate::domain::ShiftDomain

use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::domain::ShiftCategory;
use crate::error::ConfigError;

/// Default location of the clinic configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/clinic.toml";

/// Complete configuration of one scheduling run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClinicConfig {
    pub paths: PathsConfig,
    pub solver: SolverSettings,
    pub period: PeriodConfig,
    pub calendar: CalendarConfig,
    pub shift_codes: Vec<ShiftCodeConfig>,
    pub roles: RoleConfig,
    pub rules: StaffingRules,
    pub targets: SoftTargets,
    pub weights: ObjectiveWeights,
    pub staff: Vec<StaffConfig>,
    pub substitutes: Vec<SubstituteRule>,
    pub request_format: RequestFormat,
    pub template: TemplateLayout,
}

impl ClinicConfig {
    /// Reads and parses a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

impl Default for ClinicConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            solver: SolverSettings::default(),
            period: PeriodConfig::default(),
            calendar: CalendarConfig::default(),
            shift_codes: standard_shift_codes(),
            roles: RoleConfig::default(),
            rules: StaffingRules::default(),
            targets: SoftTargets::default(),
            weights: ObjectiveWeights::default(),
            staff: Vec::new(),
            substitutes: Vec::new(),
            request_format: RequestFormat::default(),
            template: TemplateLayout::default(),
        }
    }
}

/// Input and output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub requests: PathBuf,
    pub output: PathBuf,
    pub template: Option<PathBuf>,
    pub report: PathBuf,
    pub json: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            requests: PathBuf::from("data/requests.csv"),
            output: PathBuf::from("shift_output.csv"),
            template: None,
            report: PathBuf::from("violation_log.txt"),
            json: None,
        }
    }
}

/// Wall-clock limits for the two solve phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub initial_time_limit_secs: u64,
    pub refine_time_limit_secs: u64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            initial_time_limit_secs: 10,
            refine_time_limit_secs: 10,
        }
    }
}

/// Planning period.
///
/// When both `year` and `month` are set the period covers that calendar
/// month and `num_days`/`first_weekday` are derived from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodConfig {
    pub num_days: u32,
    pub first_weekday: Weekday,
    pub year: Option<i32>,
    pub month: Option<u32>,
}

impl Default for PeriodConfig {
    fn default() -> Self {
        Self {
            num_days: 31,
            first_weekday: Weekday::Mon,
            year: None,
            month: None,
        }
    }
}

impl PeriodConfig {
    /// Returns the effective `(num_days, first_weekday)` pair.
    ///
    /// ```
    /// use chrono::Weekday;
    /// use shift_scheduling::config::PeriodConfig;
    ///
    /// let period = PeriodConfig { year: Some(2025), month: Some(8), ..Default::default() };
    /// assert_eq!(period.resolve().unwrap(), (31, Weekday::Fri));
    /// ```
    pub fn resolve(&self) -> Result<(u32, Weekday), ConfigError> {
        match (self.year, self.month) {
            (Some(year), Some(month)) => {
                let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
                    ConfigError::InvalidPeriod(format!("{year}-{month} is not a calendar month"))
                })?;
                let next = if month == 12 {
                    NaiveDate::from_ymd_opt(year + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(year, month + 1, 1)
                }
                .ok_or_else(|| {
                    ConfigError::InvalidPeriod(format!("{year}-{month} has no following month"))
                })?;
                let days = (next - first).num_days() as u32;
                Ok((days, first.weekday()))
            }
            (None, None) if self.num_days == 0 => {
                Err(ConfigError::InvalidPeriod("num_days must be positive".into()))
            }
            (None, None) => Ok((self.num_days, self.first_weekday)),
            _ => Err(ConfigError::InvalidPeriod(
                "year and month must be given together".into(),
            )),
        }
    }
}

/// Which weekdays the clinic is closed or only open in the morning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub closed_weekdays: Vec<Weekday>,
    pub half_day_weekdays: Vec<Weekday>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            closed_weekdays: vec![Weekday::Thu, Weekday::Sun],
            half_day_weekdays: vec![Weekday::Sat],
        }
    }
}

/// One entry of the shift-code enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftCodeConfig {
    pub symbol: String,
    pub category: ShiftCategory,
}

impl ShiftCodeConfig {
    pub fn new(symbol: impl Into<String>, category: ShiftCategory) -> Self {
        Self {
            symbol: symbol.into(),
            category,
        }
    }
}

/// The clinic's standard code set, in index order.
pub fn standard_shift_codes() -> Vec<ShiftCodeConfig> {
    use ShiftCategory::*;
    [
        ("休", Rest),
        ("夜", Night),
        ("早", Other),
        ("残", Other),
        ("〇", Ward),
        ("1", Outpatient),
        ("2", Outpatient),
        ("3", Outpatient),
        ("4", Outpatient),
        ("×", Off),
        ("/訪", Visit),
        ("CT", Outpatient),
        ("早日", EarlyRotation),
        ("残日", LateRotation),
        ("1/", Other),
        ("2/", Outpatient),
        ("3/", Other),
        ("4/", Other),
        ("/休", Other),
        ("休/", Other),
        ("F", Outpatient),
        ("2・CT", Other),
    ]
    .into_iter()
    .map(|(symbol, category)| ShiftCodeConfig::new(symbol, category))
    .collect()
}

/// Codes with a special role that is not expressed by category alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleConfig {
    /// Code that must be covered at least once on half-days.
    pub half_day_coverage: String,
    /// Code every night worker should hold at least once.
    pub compound_code: Option<String>,
}

impl Default for RoleConfig {
    fn default() -> Self {
        Self {
            half_day_coverage: "2/".to_string(),
            compound_code: Some("4".to_string()),
        }
    }
}

/// Hard staffing thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StaffingRules {
    pub outpatient_minimum: u32,
    pub ward_minimum: u32,
    pub min_rest_days: u32,
}

impl Default for StaffingRules {
    fn default() -> Self {
        Self {
            outpatient_minimum: 4,
            ward_minimum: 3,
            min_rest_days: 4,
        }
    }
}

/// Targets of the balance penalties.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftTargets {
    /// Rest plus off days each staff member should get.
    pub rest_days: i64,
    /// Night shifts for night-preferring staff.
    pub night_shifts: i64,
}

impl Default for SoftTargets {
    fn default() -> Self {
        Self {
            rest_days: 13,
            night_shifts: 5,
        }
    }
}

/// Scalar weights of the refinement objective.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveWeights {
    pub rest_balance: i64,
    pub night_balance: i64,
    pub shift_balance: i64,
    pub compound: i64,
    pub stability: i64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            rest_balance: 3,
            night_balance: 2,
            shift_balance: 1,
            compound: 2,
            stability: 1,
        }
    }
}

impl ObjectiveWeights {
    /// Weights that only keep the refinement close to its anchor.
    pub fn stability_only() -> Self {
        Self {
            rest_balance: 0,
            night_balance: 0,
            shift_balance: 0,
            compound: 0,
            stability: 1,
        }
    }
}

/// A roster entry with its restriction rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StaffConfig {
    pub id: String,
    /// Categories this person may never work.
    pub forbidden: Vec<ShiftCategory>,
    /// Exclusive whitelist of codes; `None` means unrestricted.
    pub allowed_codes: Option<Vec<String>>,
    pub pins: Vec<PinConfig>,
    pub night_preferred: bool,
    /// Worked night on the last day of the previous period.
    pub prev_period_night: bool,
}

impl StaffConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn forbid(mut self, categories: impl IntoIterator<Item = ShiftCategory>) -> Self {
        self.forbidden.extend(categories);
        self
    }

    pub fn allow_only(mut self, codes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_codes = Some(codes.into_iter().map(Into::into).collect());
        self
    }

    pub fn pin(mut self, code: impl Into<String>, on: PinDay) -> Self {
        self.pins.push(PinConfig {
            code: code.into(),
            on,
        });
        self
    }
}

/// A fixed assignment of one code on one computed date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinConfig {
    pub code: String,
    pub on: PinDay,
}

/// How the date of a pin is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinDay {
    /// A day number, 1-based.
    Day(u32),
    /// The `nth` occurrence (1-based) of `weekday` in the period.
    NthWeekday { weekday: Weekday, nth: u32 },
}

/// Substitutes that should cover a duty of a sole primary.
///
/// Only produces a search hint; see DESIGN.md.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstituteRule {
    pub primary: String,
    pub code: String,
    pub substitutes: Vec<String>,
}

/// Layout of the request CSV.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestFormat {
    /// Header of the trailing notes column, dropped when present.
    pub notes_header: String,
    /// Calendar rows after the header that carry no requests.
    pub metadata_rows: usize,
}

impl Default for RequestFormat {
    fn default() -> Self {
        Self {
            notes_header: "特記事項".to_string(),
            metadata_rows: 2,
        }
    }
}

/// Position of the schedule grid inside the output template (0-based).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateLayout {
    pub first_row: usize,
    pub name_column: usize,
    pub first_day_column: usize,
}

impl Default for TemplateLayout {
    fn default() -> Self {
        Self {
            first_row: 5,
            name_column: 0,
            first_day_column: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_from_month() {
        let period = PeriodConfig {
            year: Some(2024),
            month: Some(2),
            ..Default::default()
        };
        assert_eq!(period.resolve().unwrap(), (29, Weekday::Thu));

        let december = PeriodConfig {
            year: Some(2025),
            month: Some(12),
            ..Default::default()
        };
        assert_eq!(december.resolve().unwrap(), (31, Weekday::Mon));
    }

    #[test]
    fn test_period_rejects_half_month() {
        let period = PeriodConfig {
            year: Some(2025),
            month: None,
            ..Default::default()
        };
        assert!(matches!(period.resolve(), Err(ConfigError::InvalidPeriod(_))));

        let empty = PeriodConfig {
            num_days: 0,
            ..Default::default()
        };
        assert!(empty.resolve().is_err());
    }

    #[test]
    fn test_parse_toml() {
        let text = r#"
            [period]
            num_days = 7
            first_weekday = "Wed"

            [rules]
            outpatient_minimum = 1
            ward_minimum = 0
            min_rest_days = 1

            [[staff]]
            id = "amy"
            forbidden = ["night"]

            [[staff]]
            id = "carl"
            allowed_codes = ["CT", "2", "休"]
            pins = [{ code = "CT", on = { nth_weekday = { weekday = "Fri", nth = 1 } } }]

            [[substitutes]]
            primary = "carl"
            code = "CT"
            substitutes = ["amy"]
        "#;
        let config = ClinicConfig::from_toml(text).unwrap();

        assert_eq!(config.period.resolve().unwrap(), (7, Weekday::Wed));
        assert_eq!(config.rules.min_rest_days, 1);
        assert_eq!(config.staff.len(), 2);
        assert_eq!(config.staff[0].forbidden, vec![ShiftCategory::Night]);
        assert_eq!(
            config.staff[1].pins[0].on,
            PinDay::NthWeekday {
                weekday: Weekday::Fri,
                nth: 1
            }
        );
        // Sections that are absent fall back to the clinic defaults.
        assert_eq!(config.shift_codes.len(), 22);
        assert_eq!(config.weights, ObjectiveWeights::default());
    }

    #[test]
    fn test_shipped_config_resolves() {
        let config = ClinicConfig::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config/clinic.toml")).unwrap();
        let domain = crate::domain::ShiftDomain::new(&config).unwrap();

        assert_eq!(domain.staff.len(), 14);
        assert_eq!(domain.num_days(), 31);
        assert_eq!(domain.day(1).weekday, Weekday::Fri);
        // Second Tuesday of August 2025.
        let visit = domain.code_index("/訪").unwrap();
        assert_eq!(domain.staff[10].restriction.pins, vec![(12, visit)]);
        assert_eq!(domain.substitutions[0].substitutes, vec![2, 7]);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ClinicConfig::load("does/not/exist.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
