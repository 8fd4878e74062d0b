//! Ora Profiler - live SQL trace streaming for Oracle sessions.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ora_profiler::config::{ConfigLoader, ProfilerConfig};
use ora_profiler::display::print_sessions;
use ora_profiler::error::ProfilerError;
use ora_profiler::hub::{Hub, SessionPoller};
use ora_profiler::server::ProfilerServer;
use ora_profiler::session::{SessionDirectory, SqlPlusDirectory};
use ora_profiler::trace::TraceController;

#[derive(Parser)]
#[command(
    name = "ora-profiler",
    about = "Stream SQL statements executed by Oracle sessions",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file to use instead of the default search paths.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the observer WebSocket endpoint.
    Serve {
        /// sqlplus connect string, e.g. scott/tiger@//db01:1521/ORCL.
        #[arg(long)]
        conn: Option<String>,
        /// Listen address as host:port.
        #[arg(long)]
        addr: Option<String>,
    },
    /// Print the current session list once.
    Sessions {
        /// sqlplus connect string, e.g. scott/tiger@//db01:1521/ORCL.
        #[arg(long)]
        conn: Option<String>,
    },
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<ProfilerConfig, ProfilerError> {
    let loader = path.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    Ok(loader.load()?)
}

fn directory(config: &ProfilerConfig) -> Result<SqlPlusDirectory, ProfilerError> {
    let connection = config
        .database
        .connection
        .clone()
        .filter(|c| !c.trim().is_empty())
        .ok_or(ProfilerError::MissingConnection)?;
    Ok(SqlPlusDirectory::new(
        config.database.sqlplus_bin.clone(),
        connection,
    ))
}

async fn serve(config: ProfilerConfig) -> Result<(), ProfilerError> {
    let directory = Arc::new(directory(&config)?);
    directory.ping().await?;
    tracing::info!("Database reachable");

    let cancel = CancellationToken::new();
    let (hub, handle) = Hub::new(config.hub.event_capacity);
    let controller = Arc::new(TraceController::new(directory.clone(), handle.clone()));

    let server = ProfilerServer::new(handle.clone(), Arc::clone(&controller))
        .with_config(config.server.clone())
        .with_connection(config.connection.clone(), config.hub.queue_capacity);
    let listener = server.bind().await?;

    let hub_task = tokio::spawn(hub.run(cancel.clone()));
    let poller = SessionPoller::new(
        directory,
        handle,
        config.database.exclude_program.clone(),
        config.poller.interval(),
    );
    let poller_task = tokio::spawn(poller.run(cancel.clone()));

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, shutting down");
                cancel.cancel();
            }
        }
    });

    let result = server.serve(listener, cancel.clone()).await;

    cancel.cancel();
    controller.stop().await;
    if let Err(e) = poller_task.await {
        tracing::warn!(error = %e, "Session poller task failed");
    }
    if let Err(e) = hub_task.await {
        tracing::warn!(error = %e, "Hub task failed");
    }

    Ok(result?)
}

async fn sessions(config: ProfilerConfig) -> Result<(), ProfilerError> {
    let directory = directory(&config)?;
    let sessions = directory
        .list_sessions(&config.database.exclude_program)
        .await?;
    print_sessions(&sessions);
    Ok(())
}

async fn run(cli: Cli) -> Result<(), ProfilerError> {
    let mut config = load_config(cli.config)?;

    match cli.command {
        Commands::Serve { conn, addr } => {
            if let Some(conn) = conn {
                config.database.connection = Some(conn);
            }
            if let Some(addr) = addr {
                config.server.apply_addr(&addr)?;
            }
            tracing::info!(
                address = %config.server.addr(),
                sqlplus = %config.database.sqlplus_bin.display(),
                "Starting profiler"
            );
            serve(config).await
        }
        Commands::Sessions { conn } => {
            if let Some(conn) = conn {
                config.database.connection = Some(conn);
            }
            sessions(config).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Profiler failed");
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}
