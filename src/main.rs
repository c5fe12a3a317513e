//! # Digital Twin CLI (`twin`)
//!
//! ## Usage
//!
//! ```bash
//! twin --config ./config/twin.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `twin init` | Create the analytics database schema |
//! | `twin ask "<query>"` | Answer one question and print it |
//! | `twin serve` | Start the HTTP API server |
//! | `twin analytics` | Print aggregate chat analytics |
//! | `twin verify <url>` | Check every endpoint of a running deployment |
//!
//! ## Examples
//!
//! ```bash
//! # Ask with full response metadata
//! twin ask "How do you handle conflict?" --json
//!
//! # Serve with debug logging
//! RUST_LOG=digital_twin=debug twin serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use digital_twin::{analytics, config, migrate, pipeline, server, verify};

/// Digital Twin CLI: answer questions about a professional profile.
///
/// All commands except `verify` read a TOML configuration file. See
/// `config/twin.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "twin",
    about = "Digital Twin — answer questions about a professional profile",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/twin.toml")]
    config: PathBuf,

    /// Log at debug level unless `RUST_LOG` is set.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the analytics database schema.
    ///
    /// Creates `chat_logs` and `popular_questions`. Idempotent.
    Init,

    /// Answer a single question.
    Ask {
        /// The question text.
        query: String,

        /// Print the answer and its metadata as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP API server on `[server].bind`.
    Serve,

    /// Print aggregate chat analytics.
    Analytics,

    /// Verify a running deployment endpoint by endpoint.
    ///
    /// Exits non-zero when any check fails.
    Verify {
        /// Base URL, e.g. `https://twin.example.com`.
        url: String,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "digital_twin=debug,tower_http=debug"
    } else {
        "digital_twin=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Commands that don't require config
    if let Commands::Verify { url } = &cli.command {
        return verify::run_verify(url).await;
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Analytics database initialized successfully.");
        }
        Commands::Ask { query, json } => {
            pipeline::run_ask(&cfg, &query, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Analytics => {
            analytics::run_analytics(&cfg).await?;
        }
        // Handled above
        Commands::Verify { .. } => {}
    }

    Ok(())
}
