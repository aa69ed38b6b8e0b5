use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use newsbot_core::{
    clock::SystemClock,
    config::{Config, Credentials, DEFAULT_INFO_PATH, INFO_ENV_VAR},
    updater::{Updater, UpdaterSettings},
};
use newsbot_discord::DiscordClient;
use newsbot_twitter::TwitterClient;

/// Relay Twitter lists into Discord channels.
#[derive(Debug, Parser)]
#[command(name = "newsbot", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the relay until interrupted (default).
    Run,
    /// Print the credentials document as a single-line config var assignment.
    FlattenConfig {
        #[arg(long, default_value = DEFAULT_INFO_PATH)]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run().await,
        Command::FlattenConfig { path } => flatten_config(&path),
    }
}

async fn run() -> anyhow::Result<()> {
    newsbot_core::logging::init("newsbot")?;

    let cfg = Config::load().context("loading configuration")?;

    let gateway = DiscordClient::connect(&cfg.credentials.discord.bot_token)
        .await
        .context("connecting to discord")?;
    info!(guild = %gateway.guild(), "discord ready");

    let source = TwitterClient::new(cfg.credentials.twitter.clone())
        .context("building twitter client")?;

    let mut updater = Updater::new(
        UpdaterSettings::from(&cfg),
        Arc::new(gateway),
        Arc::new(source),
        Arc::new(SystemClock),
    );
    updater.setup().await.context("initial setup")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        on_signal.cancel();
    });

    updater.run(cancel).await.context("update loop")?;
    info!("Finished");
    Ok(())
}

fn flatten_config(path: &std::path::Path) -> anyhow::Result<()> {
    let creds = Credentials::load(path)
        .with_context(|| format!("reading {}", path.display()))?;
    println!("{INFO_ENV_VAR}={}", creds.to_compact_json()?);
    Ok(())
}
