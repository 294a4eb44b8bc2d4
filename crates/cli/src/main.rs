use crate::{
    commands::{CommonArgs, SimulationArgs, Statement},
    env::EnvManager,
    error::CliError,
    output::BatchWriter,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use clap::Parser;
use commands::Commands;
use engine_config::settings::ProtocolSettings;
use engine_runtime::{
    actor::{messages::ReaperMsg, reaper::spawn_reaper},
    execution::{
        executor::{self, PollOptions, StreamSummary},
        settings::{SimulationSettings, StatementKind},
    },
    manager::QueryManager,
};
use model::core::identifiers::QueryId;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod env;
mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(
    name = "rowstream",
    version = "0.1.0",
    about = "Token-based query result streaming"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    // Initialize logger
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            common,
            simulation,
            target_bytes,
            max_wait_ms,
            output,
            quiet,
        } => {
            let options = PollOptions {
                max_wait: max_wait_ms.map(Duration::from_millis),
                target_bytes,
            };
            let code = run(&common, simulation, options, output.as_deref(), quiet).await?;
            if !matches!(code, ExitCode::Success) {
                std::process::exit(code.as_i32());
            }
        }
        Commands::Config { common } => {
            let settings = load_settings(&common)?;
            let json = serde_json::to_string_pretty(&settings)?;
            println!("{json}");
        }
    }

    Ok(())
}

async fn run(
    common: &CommonArgs,
    simulation: SimulationArgs,
    options: PollOptions,
    output: Option<&str>,
    quiet: bool,
) -> Result<ExitCode, CliError> {
    let settings = load_settings(common)?;
    let manager = Arc::new(QueryManager::new(settings));
    let (reaper, reaper_handle) = spawn_reaper(manager.clone()).await?;

    let shutdown = ShutdownCoordinator::new(CancellationToken::new());
    shutdown.register_handlers();

    let query_id = simulation
        .query_id
        .clone()
        .map(QueryId::from)
        .unwrap_or_else(QueryId::generate);
    let simulation = simulation_settings(simulation);
    info!(query_id = %query_id, settings = ?simulation, "Starting simulated query");

    let mut writer = BatchWriter::open(output, quiet)?;
    let mut write_error = None;
    let result = executor::run_simulation(
        manager.clone(),
        query_id.clone(),
        simulation,
        options,
        shutdown.cancel_token(),
        |batch| {
            if write_error.is_none() {
                write_error = writer.write(batch).err();
            }
        },
    )
    .await;

    if let Err(err) = reaper.send(ReaperMsg::Stop).await {
        warn!(error = %err, "Reaper already stopped");
    }
    drop(reaper);
    reaper_handle.await.map_err(engine_runtime::error::RuntimeError::from)?;

    let summary: StreamSummary = result?;
    if let Some(err) = write_error {
        return Err(err);
    }
    writer.finish()?;
    output::print_summary(query_id.as_str(), &summary)?;

    if shutdown.is_shutdown_requested() {
        return Ok(ExitCode::ShutdownRequested);
    }
    if summary.error.is_some() {
        return Ok(ExitCode::QueryFailed);
    }
    Ok(ExitCode::Success)
}

fn simulation_settings(args: SimulationArgs) -> SimulationSettings {
    let statement = match args.statement {
        Statement::Select => StatementKind::Select,
        Statement::Ddl => StatementKind::Ddl,
        Statement::Update => StatementKind::Update {
            rows: args.update_rows,
        },
    };

    SimulationSettings {
        statement,
        locations: args.locations,
        pages_per_location: args.pages,
        rows_per_page: args.rows,
        page_delay: Duration::from_millis(args.delay_ms),
        corrupt_page: args.corrupt_page,
        failing_location: args.failing_location,
    }
}

/// Settings file (explicit or `~/.rowstream/config.json`), then `ROWSTREAM_*`
/// variables from the environment and the optional env file.
fn load_settings(common: &CommonArgs) -> Result<ProtocolSettings, CliError> {
    let mut env = EnvManager::new();
    if let Some(path) = &common.env_file {
        env.load_from_file(path)?;
    }

    let path = common
        .config
        .as_ref()
        .map(PathBuf::from)
        .or_else(default_config_path);
    let mut settings = match &path {
        Some(path) => ProtocolSettings::from_file(path)?,
        None => ProtocolSettings::default(),
    };
    settings.apply_env(env.all())?;
    settings.validate()?;

    info!(path = ?path, settings = ?settings, "Protocol settings loaded");
    Ok(settings)
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".rowstream").join("config.json"))
        .filter(|path| path.exists())
}
