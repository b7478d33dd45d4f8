//! Output writers: schedule CSV, violation report and JSON dump.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};
use tracing::{info, warn};

use crate::config::TemplateLayout;
use crate::domain::Schedule;
use crate::dto::ScheduleDto;
use crate::error::ExportError;
use crate::solver::RunOutcome;
use crate::validation::Violation;

/// Text of an empty report.
pub const NO_VIOLATIONS: &str = "No violations found.";

/// Writes `schedule` to `output`.
///
/// With a template, the template is copied and the day cells of every row
/// whose name column matches a staff id are overwritten. Without one, a plain
/// `staff,1,…,N` table is written.
pub fn write_schedule(
    schedule: &Schedule,
    output: &Path,
    template: Option<(&Path, &TemplateLayout)>,
) -> Result<(), ExportError> {
    let rows = match template {
        Some((path, layout)) => fill_template(schedule, path, layout)?,
        None => plain_rows(schedule),
    };

    let csv_err = |source| ExportError::Csv {
        path: output.to_path_buf(),
        source,
    };
    let mut writer = WriterBuilder::new()
        .flexible(true)
        .from_path(output)
        .map_err(csv_err)?;
    for row in &rows {
        writer.write_record(row).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| ExportError::Io {
        path: output.to_path_buf(),
        source,
    })?;
    info!(path = %output.display(), rows = rows.len(), "Wrote schedule");
    Ok(())
}

fn plain_rows(schedule: &Schedule) -> Vec<Vec<String>> {
    let header = std::iter::once("staff".to_string())
        .chain((1..=schedule.num_days()).map(|d| d.to_string()))
        .collect();
    std::iter::once(header)
        .chain(schedule.rows().map(|(id, row)| {
            std::iter::once(id.to_string()).chain(row.iter().cloned()).collect()
        }))
        .collect()
}

fn fill_template(
    schedule: &Schedule,
    path: &Path,
    layout: &TemplateLayout,
) -> Result<Vec<Vec<String>>, ExportError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|source| ExportError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| ExportError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }

    let template_rows: HashMap<String, usize> = rows
        .iter()
        .enumerate()
        .skip(layout.first_row)
        .filter_map(|(r, row)| {
            let name = row.get(layout.name_column)?.trim();
            (!name.is_empty()).then(|| (name.to_string(), r))
        })
        .collect();

    for (id, shifts) in schedule.rows() {
        let Some(&r) = template_rows.get(id) else {
            warn!(staff = id, template = %path.display(), "Staff missing from template, skipping");
            continue;
        };
        let row = &mut rows[r];
        let needed = layout.first_day_column + shifts.len();
        if row.len() < needed {
            row.resize(needed, String::new());
        }
        row[layout.first_day_column..needed].clone_from_slice(shifts);
    }
    Ok(rows)
}

/// Report text for `violations`, one per line.
///
/// ```
/// use shift_scheduling::export::format_report;
///
/// assert_eq!(format_report(&[]), "No violations found.\n");
/// ```
pub fn format_report(violations: &[Violation]) -> String {
    if violations.is_empty() {
        return format!("{NO_VIOLATIONS}\n");
    }
    violations.iter().map(|v| format!("{v}\n")).collect()
}

/// Writes the violation report; always produces a file.
pub fn write_report(violations: &[Violation], path: &Path) -> Result<(), ExportError> {
    fs::write(path, format_report(violations)).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), violations = violations.len(), "Wrote violation report");
    Ok(())
}

/// Where the artifacts of a run go.
#[derive(Debug, Clone, Copy)]
pub struct OutputTargets<'a> {
    pub schedule: &'a Path,
    pub template: Option<(&'a Path, &'a TemplateLayout)>,
    pub report: &'a Path,
    pub json: Option<&'a Path>,
}

/// Writes every artifact of `outcome`.
///
/// Each artifact is attempted even when an earlier one fails, so the
/// violation report exists whatever happens to the schedule file. Returns the
/// first error in the order report, schedule, JSON.
pub fn write_outputs(outcome: &RunOutcome, targets: &OutputTargets<'_>) -> Result<(), ExportError> {
    let report = write_report(&outcome.violations, targets.report);
    let schedule = write_schedule(outcome.final_schedule(), targets.schedule, targets.template);
    let json = targets.json.map_or(Ok(()), |path| write_json(outcome, path));
    report.and(schedule).and(json)
}

/// Writes the final schedule of `outcome` with its verdicts as JSON.
pub fn write_json(outcome: &RunOutcome, path: &Path) -> Result<(), ExportError> {
    let json = serde_json::to_string_pretty(&ScheduleDto::from_outcome(outcome))?;
    fs::write(path, json).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "Wrote JSON schedule");
    Ok(())
}
