//! Nimbus command-line entry point.
//!
//! Usage:
//!   nimbus query "What's the weather in London?"
//!   nimbus --config nimbus.toml query --owner dana "Set up alerts for Chicago above 90 degrees"
//!   nimbus monitor --subscribe "Monitor Denver below 35 degrees"
//!
//! # Environment Variables
//!
//! - `RUST_LOG` - log filter (default: info,nimbus_coordinator=debug)
//! - `OPENAI_API_KEY` - API key for the `openai` LLM provider
//! - `NIMBUS_CONFIG` - config file path when `--config` is not given

use clap::{Parser, Subcommand};
use nimbus_alerts::LogSink;
use nimbus_coordinator::{CoordinatorConfig, Nimbus, demo_sources};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "nimbus", version, about = "Weather agent coordination")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "NIMBUS_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Answer one request and print the aggregated response as JSON
    Query {
        /// The request text
        text: String,

        /// Who is asking (defaults to the configured default owner)
        #[arg(long)]
        owner: Option<String>,
    },

    /// Run the periodic alert monitor until Ctrl-C
    Monitor {
        /// Requests to run before monitoring starts, e.g. "Monitor Chicago above 90 degrees"
        #[arg(long = "subscribe")]
        subscribe: Vec<String>,

        #[arg(long)]
        owner: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,nimbus_coordinator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration");
            CoordinatorConfig::from_file(path)?
        }
        None => CoordinatorConfig::default(),
    };

    let sources = demo_sources(config.sources.fetch_timeout());
    let nimbus = Nimbus::build(config, sources, Arc::new(LogSink))?;
    let default_owner = nimbus.config().alerts.default_owner.clone();

    match cli.command {
        Command::Query { text, owner } => {
            let owner = owner.unwrap_or(default_owner);
            let response = nimbus.hub().handle_as(&owner, &text).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Monitor { subscribe, owner } => {
            let owner = owner.unwrap_or(default_owner);
            for text in &subscribe {
                let response = nimbus.hub().handle_as(&owner, text).await;
                for subscription in &response.subscriptions {
                    info!(
                        subscription_id = %subscription.subscription_id,
                        locations = subscription.locations.len(),
                        "Subscribed"
                    );
                }
                if response.subscriptions.is_empty() {
                    eprintln!("No subscription created for {text:?}:\n{}", response.combined_text());
                }
            }

            let handle = nimbus.monitor().start();
            info!("Monitoring; press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;

            let stats = handle.shutdown().await;
            info!(
                passes = stats.passes,
                failed_passes = stats.failed_passes,
                events = stats.events,
                "Monitor stopped"
            );
        }
    }

    Ok(())
}
