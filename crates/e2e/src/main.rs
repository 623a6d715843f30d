//! pagerun binary: runs one scenario and exits non-zero if it fails
//!
//! Exit codes: 0 passed, 1 a step failed, 2 the runner could not start.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pagerun_e2e::config::RunnerConfig;
use pagerun_e2e::playwright::PlaywrightSession;
use pagerun_e2e::{ReadinessProbe, ReportSink, Scenario, ScenarioDriver};

#[derive(Parser, Debug)]
#[command(name = "pagerun")]
#[command(about = "Run a scripted browser scenario and write a report")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "pagerun.toml")]
    config: PathBuf,

    /// Scenario file (overrides the config)
    #[arg(short, long)]
    scenario: Option<PathBuf>,

    /// Output directory for reports (overrides the config)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            return ExitCode::from(2);
        }
    };

    match runtime.block_on(async_main(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::from(2)
        }
    }
}

async fn async_main(cli: Cli) -> anyhow::Result<bool> {
    let mut config = RunnerConfig::load(&cli.config)?;
    if let Some(scenario) = cli.scenario {
        config.scenario = Some(scenario);
    }
    if let Some(output) = cli.output {
        config.output_dir = output;
    }

    let scenario = Scenario::load(config.scenario.as_deref())?;
    info!("pagerun v{}", env!("CARGO_PKG_VERSION"));

    let session = PlaywrightSession::launch(&config.playwright).await?;
    let driver = ScenarioDriver::new(
        session,
        ReadinessProbe::new(config.readiness.clone()),
        ReportSink::new(&config.output_dir),
    );

    let outcome = driver.run(&scenario).await;

    if let Err(e) = driver.into_browser().close().await {
        warn!(error = %e, "Browser session did not close cleanly");
    }

    match outcome {
        Ok(run) => {
            if let Err(e) = run.saved {
                warn!(error = %e, "Scenario passed but the report could not be written");
            }
            println!("{} {}", "✓".green(), format!("{} passed", scenario.name).bold());
            Ok(true)
        }
        Err(e) => {
            error!("Scenario failed: {}", e);
            println!("{} {}", "✗".red(), format!("{} failed: {}", scenario.name, e).bold());
            Ok(false)
        }
    }
}
