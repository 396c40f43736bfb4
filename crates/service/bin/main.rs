use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use nl_sql::routes::create_router;
use nl_sql::state::{create_state, ServerState};
use nl_sql_configuration::environment::ProcessEnvironment;
use nl_sql_configuration::version1::configuration_jsonschema;
use nl_sql_configuration::{
    make_runtime_configuration, parse_configuration, write_parsed_configuration, Configuration,
    ParsedConfiguration,
};
use tracing_subscriber::EnvFilter;

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API.
    Serve {
        #[arg(long, env = "NL_SQL_CONFIGURATION", value_name = "DIRECTORY")]
        configuration: PathBuf,
        #[arg(long, env = "PORT", default_value_t = 8080)]
        port: u16,
    },
    /// Introspect the configured database and print the schema snapshot.
    Introspect {
        #[arg(long, env = "NL_SQL_CONFIGURATION", value_name = "DIRECTORY")]
        configuration: PathBuf,
    },
    /// Print the JSON schema of the configuration file.
    PrintSchemaAndExit,
    /// Write a default configuration into a directory.
    Initialize {
        #[arg(long, env = "NL_SQL_CONFIGURATION", value_name = "DIRECTORY")]
        configuration: PathBuf,
    },
}

#[tokio::main]
pub async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve {
            configuration,
            port,
        } => serve(&configuration, port).await,
        Command::Introspect { configuration } => {
            let mut metrics_registry = prometheus::Registry::new();
            let pipeline = create_state(&load(&configuration).await?, &mut metrics_registry).await?;
            let snapshot = pipeline.schema().await?;
            println!("{}", serde_json::to_string_pretty(&*snapshot)?);
            Ok(())
        }
        Command::PrintSchemaAndExit => {
            println!(
                "{}",
                serde_json::to_string_pretty(&configuration_jsonschema())?
            );
            Ok(())
        }
        Command::Initialize { configuration } => {
            tokio::fs::create_dir_all(&configuration).await?;
            write_parsed_configuration(ParsedConfiguration::initial(), &configuration).await?;
            tracing::info!(directory = %configuration.display(), "wrote default configuration");
            Ok(())
        }
    }
}

async fn load(configuration_dir: &Path) -> anyhow::Result<Configuration> {
    let parsed = parse_configuration(configuration_dir).await?;
    Ok(make_runtime_configuration(parsed, ProcessEnvironment)?)
}

async fn serve(configuration_dir: &Path, port: u16) -> anyhow::Result<()> {
    let configuration = load(configuration_dir).await?;
    let mut metrics_registry = prometheus::Registry::new();
    let pipeline = create_state(&configuration, &mut metrics_registry).await?;
    let state = ServerState::new(pipeline, metrics_registry);

    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let expired = pipeline.sweep_idle(chrono::Utc::now()).await;
            if expired > 0 {
                tracing::info!(expired, "expired idle sessions");
            }
        }
    });

    let address = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%address, "starting server");
    axum::Server::bind(&address)
        .serve(create_router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "unable to listen for the shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
