mod config;
mod error;
mod events;
mod llm;
mod session;
mod telemetry;
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::warn;

use crate::config::Config;
use crate::llm::OpenAiClient;
use crate::session::{SessionController, SubmitOutcome};

#[derive(Parser)]
#[command(name = "chatterm")]
#[command(version)]
#[command(about = "Chat with a language model from your terminal", long_about = None)]
struct Cli {
    /// Config file to use instead of ~/.chatterm/config.toml
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message and print the reply
    Ask {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Show the effective configuration
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },
}

fn build_session(config: &Config) -> Arc<SessionController> {
    let credential = config.credential();
    if !credential.is_present() {
        warn!(
            credential = %credential.describe(),
            "provider credential unavailable; requests will fail until it is set"
        );
    }

    let client = OpenAiClient::new(config.provider.clone(), credential);
    Arc::new(
        SessionController::new(Arc::new(client), config.session.context)
            .with_timeout(config.session.request_timeout()),
    )
}

async fn ask(config: &Config, text: &str) -> Result<ExitCode> {
    telemetry::init_stderr(config.log.filter.as_deref())?;
    let session = build_session(config);

    let outcome = session.submit(text).await?;
    let snapshot = session.snapshot();
    let entry = |sequence: u64| {
        snapshot
            .messages
            .iter()
            .find(|m| m.sequence() == sequence)
            .map(|m| m.content())
            .unwrap_or_default()
    };

    match outcome {
        SubmitOutcome::Answered { sequence } => {
            println!("{}", entry(sequence));
            Ok(ExitCode::SUCCESS)
        }
        SubmitOutcome::Failed { sequence, .. } => {
            eprintln!("{}", entry(sequence));
            Ok(ExitCode::FAILURE)
        }
        SubmitOutcome::Ignored => {
            eprintln!("Nothing to send.");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn show_config(config: &Config, path: &Path, init: bool) -> Result<ExitCode> {
    if init {
        if path.exists() {
            println!("Config already exists at {}", path.display());
        } else {
            config.save(path)?;
            println!("Wrote default config to {}", path.display());
        }
    }

    let missing = if path.exists() { "" } else { " (not found, using defaults)" };
    println!("Config file: {}{missing}", path.display());
    println!("Log file:    {}", config.log_file()?.display());
    println!("Credential:  {}", config.credential().describe());
    println!();
    print!("{}", toml::to_string_pretty(config).context("Failed to serialize config")?);
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let config = Config::load_from(&config_path)?;

    match cli.command {
        None => {
            telemetry::init_file(&config.log_file()?, config.log.filter.as_deref())?;
            let session = build_session(&config);
            ui::terminal::run(session, &config.ui).await?;
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Ask { text }) => ask(&config, &text.join(" ")).await,
        Some(Commands::Config { init }) => show_config(&config, &config_path, init),
    }
}
