use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};

use newsrelay::config::Config;
use newsrelay::http::HttpClient;
use newsrelay::{fetch, relay};

#[derive(Parser)]
#[command(
    name = "newsrelay",
    about = "District news relay — scrapes mirrored channel previews, filters ads, dedups, reposts"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the full relay over all configured targets
    Run {
        /// Path to config file
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Override the dedup store path from the config
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Fetch one source channel and print its fresh items as JSON (no sends)
    Fetch {
        /// Source handle, with or without the leading @
        handle: String,

        /// Path to config file
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Ok(Config::load(path)?)
    } else {
        tracing::info!(path = %path.display(), "config file not found, using built-in defaults");
        Ok(Config::default())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newsrelay=info".parse().unwrap()),
        )
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { config, store } => {
            let mut cfg = load_config(&config)?;
            if let Some(store) = store {
                cfg.relay.store_path = store;
            }
            cfg.validate()?;
            relay::run(&cfg).await?;
            Ok(())
        }
        Command::Fetch { handle, config } => {
            let cfg = load_config(&config)?;
            let http = HttpClient::new(relay::USER_AGENT)?;
            let items = fetch::fetch_sources(&http, &[handle], cfg.relay.fresh_hours).await;
            println!("{}", serde_json::to_string_pretty(&items)?);
            Ok(())
        }
    }
}
