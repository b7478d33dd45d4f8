//! Colorful console output for solver runs.

use num_format::{Locale, ToFormattedString};
use owo_colors::OwoColorize;
use std::time::{Duration, Instant};

use crate::backend::SolveStatus;

/// ASCII art banner for solver startup.
pub fn print_banner() {
    let banner = r#"
  ____  _     _  __ _
 / ___|| |__ (_)/ _| |_ ___
 \___ \| '_ \| | |_| __/ __|
  ___) | | | | |  _| |_\__ \
 |____/|_| |_|_|_|  \__|___/
"#;
    println!("{}", banner.cyan().bold());
    println!(
        "  {} {}\n",
        format!("v{}", env!("CARGO_PKG_VERSION")).bright_black(),
        "Clinic Duty Scheduling".bright_cyan()
    );
}

/// Prints the problem dimensions.
pub fn print_config(staff: usize, days: u32, codes: usize, requests: usize) {
    println!(
        "{} {} {} Problem: staff ({}), days ({}), shift codes ({}), requests ({})",
        timestamp().bright_black(),
        "INFO".bright_green(),
        "[Solver]".bright_cyan(),
        staff.to_formatted_string(&Locale::en).bright_yellow(),
        days.to_formatted_string(&Locale::en).bright_yellow(),
        codes.to_formatted_string(&Locale::en).bright_yellow(),
        requests.to_formatted_string(&Locale::en).bright_yellow()
    );
}

/// Prints the size of a built model.
pub fn print_model_size(phase_name: &str, variables: usize, constraints: usize) {
    println!(
        "{} {} {} variable count ({}), constraint count ({})",
        timestamp().bright_black(),
        "INFO".bright_green(),
        format!("[{}]", phase_name).bright_cyan(),
        variables.to_formatted_string(&Locale::en).bright_yellow(),
        constraints.to_formatted_string(&Locale::en).bright_yellow()
    );
}

/// Prints a phase start message.
pub fn print_phase_start(phase_name: &str, phase_index: usize) {
    println!(
        "{} {} {} {} phase ({}) started",
        timestamp().bright_black(),
        "INFO".bright_green(),
        format!("[{}]", phase_name).bright_cyan(),
        phase_name.white().bold(),
        phase_index.to_string().yellow()
    );
}

/// Prints a phase end message with the solve verdict.
pub fn print_phase_end(
    phase_name: &str,
    phase_index: usize,
    duration: Duration,
    status: SolveStatus,
    objective: Option<i64>,
) {
    println!(
        "{} {} {} {} phase ({}) ended: time spent ({}), status ({}), objective ({})",
        timestamp().bright_black(),
        "INFO".bright_green(),
        format!("[{}]", phase_name).bright_cyan(),
        phase_name.white().bold(),
        phase_index.to_string().yellow(),
        format_duration(duration).yellow(),
        format_status(status),
        format_objective(objective)
    );
}

/// Prints the run summary.
pub fn print_solving_ended(
    total_duration: Duration,
    final_status: SolveStatus,
    objective: Option<i64>,
    used_fallback: bool,
    violations: usize,
) {
    println!(
        "{} {} {} Solving ended: time spent ({}), status ({}), objective ({})",
        timestamp().bright_black(),
        "INFO".bright_green(),
        "[Solver]".bright_cyan(),
        format_duration(total_duration).yellow(),
        format_status(final_status),
        format_objective(objective)
    );

    // Pretty summary box (60 chars wide, 56 char content area)
    println!();
    println!("{}", "╔══════════════════════════════════════════════════════════╗".bright_cyan());

    let clean = !used_fallback && violations == 0;
    let status_text = if used_fallback {
        "✗ NO FEASIBLE SCHEDULE (all-rest fallback)"
    } else if violations > 0 {
        "✗ SCHEDULE HAS VIOLATIONS"
    } else {
        "✓ FEASIBLE SCHEDULE FOUND"
    };
    let status_colored = if clean {
        status_text.bright_green().bold().to_string()
    } else {
        status_text.bright_red().bold().to_string()
    };
    let status_padding = 56usize.saturating_sub(status_text.chars().count());
    let left_pad = status_padding / 2;
    let right_pad = status_padding - left_pad;
    println!(
        "{}{}{}{}{}",
        "║".bright_cyan(),
        " ".repeat(left_pad),
        status_colored,
        " ".repeat(right_pad),
        "║".bright_cyan()
    );

    println!("{}", "╠══════════════════════════════════════════════════════════╣".bright_cyan());

    let rows = [
        ("Solver Status:", final_status.as_str().to_string()),
        (
            "Objective:",
            objective.map_or_else(|| "-".to_string(), |o| o.to_formatted_string(&Locale::en)),
        ),
        ("Violations:", violations.to_formatted_string(&Locale::en)),
        ("Solving Time:", format!("{:.2}s", total_duration.as_secs_f64())),
    ];
    for (label, value) in rows {
        println!(
            "{}  {:<18}{:>36}  {}",
            "║".bright_cyan(),
            label,
            value,
            "║".bright_cyan()
        );
    }

    println!("{}", "╚══════════════════════════════════════════════════════════╝".bright_cyan());
    println!();
}

/// Formats a duration nicely.
fn format_duration(d: Duration) -> String {
    let total_ms = d.as_millis();
    if total_ms < 1000 {
        format!("{}ms", total_ms)
    } else if total_ms < 60_000 {
        format!("{:.2}s", d.as_secs_f64())
    } else {
        let mins = total_ms / 60_000;
        let secs = (total_ms % 60_000) / 1000;
        format!("{}m {}s", mins, secs)
    }
}

fn format_status(status: SolveStatus) -> String {
    match status {
        SolveStatus::Optimal => status.as_str().bright_green().to_string(),
        SolveStatus::Feasible => status.as_str().green().to_string(),
        SolveStatus::Infeasible => status.as_str().bright_red().to_string(),
        SolveStatus::Unknown => status.as_str().yellow().to_string(),
    }
}

fn format_objective(objective: Option<i64>) -> String {
    match objective {
        Some(0) => "0".bright_green().to_string(),
        Some(value) => value.to_formatted_string(&Locale::en).white().to_string(),
        None => "-".bright_black().to_string(),
    }
}

/// Returns a timestamp string.
fn timestamp() -> String {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| {
            let secs = d.as_secs();
            let millis = d.subsec_millis();
            format!("{}.{:03}", secs, millis)
        })
        .unwrap_or_else(|_| "0.000".to_string())
}

/// A timer for one solve phase.
pub struct PhaseTimer {
    start: Instant,
    phase_name: String,
    phase_index: usize,
}

impl PhaseTimer {
    pub fn start(phase_name: impl Into<String>, phase_index: usize) -> Self {
        let name = phase_name.into();
        print_phase_start(&name, phase_index);
        Self {
            start: Instant::now(),
            phase_name: name,
            phase_index,
        }
    }

    pub fn finish(self, status: SolveStatus, objective: Option<i64>) {
        print_phase_end(
            &self.phase_name,
            self.phase_index,
            self.start.elapsed(),
            status,
            objective,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
    }
}
