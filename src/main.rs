//! Clinic duty scheduling - command line entry point.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shift_scheduling::backend::PumpkinBackend;
use shift_scheduling::config::{ClinicConfig, DEFAULT_CONFIG_PATH};
use shift_scheduling::demo_data::{self, DemoData};
use shift_scheduling::domain::ShiftDomain;
use shift_scheduling::export::{self, OutputTargets};
use shift_scheduling::requests::load_requests;
use shift_scheduling::solver::{run_pipeline, SolverConfig};

#[derive(Debug, Parser)]
#[command(version, about = "Two-phase clinic duty-shift scheduler")]
struct Args {
    /// Clinic configuration file.
    #[arg(long, env = "SHIFT_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Request CSV, overriding the configured path.
    #[arg(long)]
    requests: Option<PathBuf>,

    /// Schedule CSV to write, overriding the configured path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Time limit per solve phase in seconds.
    #[arg(long)]
    time_limit: Option<u64>,

    /// Run a demo clinic (TINY, SMALL, LARGE) with generated requests.
    #[arg(long)]
    demo: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("shift_scheduling=info".parse()?),
        )
        .init();

    let args = Args::parse();

    #[cfg(feature = "console")]
    shift_scheduling::console::print_banner();

    let (config, demo) = match &args.demo {
        Some(name) => {
            let demo: DemoData = name.parse().map_err(|()| {
                anyhow!(
                    "unknown demo data set '{name}', expected one of {:?}",
                    demo_data::list_demo_data()
                )
            })?;
            (demo.config(), Some(demo))
        }
        None => (ClinicConfig::load(&args.config)?, None),
    };
    let domain = ShiftDomain::new(&config).context("invalid clinic configuration")?;

    let requests = match demo {
        Some(demo) => {
            info!(demo = demo.as_str(), "Generating demo requests");
            demo_data::generate_requests(&domain)
        }
        None => {
            let path = args.requests.as_ref().unwrap_or(&config.paths.requests);
            load_requests(path, &domain, &config.request_format)?
        }
    };

    let mut solver_config = SolverConfig::from_settings(&config.solver);
    if let Some(secs) = args.time_limit {
        solver_config = SolverConfig::with_time_limit(std::time::Duration::from_secs(secs));
    }

    let outcome = run_pipeline(&domain, &requests, &PumpkinBackend, &solver_config);

    let targets = OutputTargets {
        schedule: args.output.as_deref().unwrap_or(&config.paths.output),
        template: config
            .paths
            .template
            .as_deref()
            .map(|path| (path, &config.template)),
        report: &config.paths.report,
        json: config.paths.json.as_deref(),
    };
    export::write_outputs(&outcome, &targets)?;

    if outcome.initial.used_fallback {
        info!("No feasible schedule exists for these rules and requests; wrote the all-rest fallback");
    }
    Ok(())
}
