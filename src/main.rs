mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rapport::config::RapportConfig;
use rapport::memory::gifts::GiftKind;

#[derive(Parser)]
#[command(name = "rapport", version, about = "Memory and relationship state engine for companion characters")]
struct Cli {
    /// Path to a config file (defaults to ~/.rapport/config.toml)
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decay and prune episodic memories for every user
    Decay,
    /// Summarize recent interactions into episodes
    Summarize {
        /// Start of the window (RFC 3339). Defaults to now minus the configured lookback.
        #[arg(long)]
        since: Option<String>,
    },
    /// Move an identity's rows to an account
    Reconcile {
        /// Anonymous token or account key being merged
        source: String,
        /// Account key receiving the rows
        target: String,
        character: String,
    },
    /// Show the memory bundle for a user-character pair
    Inspect {
        user: String,
        character: String,
        /// Maximum episodes to show
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Show the relationship score and stage for a pair
    Score { user: String, character: String },
    /// Apply a tip or gift bonus to a pair
    Gift {
        user: String,
        character: String,
        amount: u64,
        #[arg(long, default_value = "gift")]
        kind: GiftKind,
    },
    /// Show engine statistics
    Stats,
    /// Run database diagnostics
    Doctor,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RapportConfig::load_from(path)?,
        None => RapportConfig::load()?,
    };

    // Log to stderr so stdout stays clean for command output.
    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Decay => cli::maintenance::decay(&config)?,
        Command::Summarize { since } => cli::maintenance::summarize(&config, since.as_deref())?,
        Command::Reconcile {
            source,
            target,
            character,
        } => cli::reconcile::reconcile(&config, &source, &target, &character)?,
        Command::Inspect {
            user,
            character,
            limit,
        } => cli::inspect::inspect(&config, &user, &character, limit)?,
        Command::Score { user, character } => cli::score::score(&config, &user, &character)?,
        Command::Gift {
            user,
            character,
            amount,
            kind,
        } => cli::score::gift(&config, &user, &character, amount, kind)?,
        Command::Stats => cli::stats::stats(&config)?,
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}
