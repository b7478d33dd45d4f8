//! Serializable views of run results.

use serde::{Deserialize, Serialize};

use crate::constraints::soft::PenaltyScore;
use crate::domain::Schedule;
use crate::solver::RunOutcome;
use crate::validation::Violation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffRowDto {
    pub id: String,
    pub shifts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDto {
    pub num_days: u32,
    pub rows: Vec<StaffRowDto>,
    #[serde(default)]
    pub solver_status: Option<String>,
    #[serde(default)]
    pub refined: bool,
    #[serde(default)]
    pub used_fallback: bool,
    #[serde(default)]
    pub objective: Option<i64>,
    #[serde(default)]
    pub penalties: Option<PenaltyScore>,
    #[serde(default, skip_deserializing)]
    pub violations: Vec<Violation>,
}

impl ScheduleDto {
    /// A bare schedule without run metadata.
    pub fn from_schedule(schedule: &Schedule) -> Self {
        Self {
            num_days: schedule.num_days(),
            rows: schedule
                .rows()
                .map(|(id, row)| StaffRowDto {
                    id: id.to_string(),
                    shifts: row.to_vec(),
                })
                .collect(),
            solver_status: None,
            refined: false,
            used_fallback: false,
            objective: None,
            penalties: None,
            violations: Vec::new(),
        }
    }

    /// The final schedule of a run with its verdicts.
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        let refined = outcome.refined.as_ref().ok();
        Self {
            solver_status: Some(outcome.final_status().as_str().to_string()),
            refined: refined.is_some(),
            used_fallback: outcome.initial.used_fallback,
            objective: refined.and_then(|r| r.objective),
            penalties: refined.map(|r| r.score),
            violations: outcome.violations.clone(),
            ..Self::from_schedule(outcome.final_schedule())
        }
    }

    pub fn to_schedule(&self) -> Schedule {
        let (staff, cells): (Vec<String>, Vec<Vec<String>>) = self
            .rows
            .iter()
            .map(|row| {
                let mut shifts = row.shifts.clone();
                shifts.resize(self.num_days as usize, String::new());
                (row.id.clone(), shifts)
            })
            .unzip();
        Schedule::new(staff, cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo_data::DemoData;
    use crate::domain::ShiftDomain;

    #[test]
    fn test_json_shape() {
        let domain = ShiftDomain::new(&DemoData::Tiny.config()).unwrap();
        let mut schedule = Schedule::filled(&domain, domain.roles.rest);
        schedule.set(0, 1, "夜");

        let dto = ScheduleDto::from_schedule(&schedule);
        let json = serde_json::to_value(&dto).unwrap();

        assert_eq!(json["numDays"], 7);
        assert_eq!(json["rows"][0]["shifts"][0], "夜");
        assert_eq!(json["usedFallback"], false);
        assert_eq!(dto.to_schedule(), schedule);
    }

    #[test]
    fn test_short_rows_are_padded() {
        let json = r#"{"numDays":3,"rows":[{"id":"ann","shifts":["休"]}]}"#;
        let dto: ScheduleDto = serde_json::from_str(json).unwrap();
        let schedule = dto.to_schedule();

        assert_eq!(schedule.num_days(), 3);
        assert_eq!(schedule.code(0, 3), "");
    }
}
