mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use alchm_config::EngineConfig;

#[derive(Debug, Parser)]
#[command(
    name = "alchm",
    version,
    about = "Elemental and astrological scoring for food recommendations"
)]
struct Cli {
    /// Engine configuration (TOML).  Missing file means defaults.
    #[arg(long, global = true, default_value = "config/alchm.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Rank candidates for a natal chart and print them as JSON.
    Rank {
        /// JSON array of candidates.
        #[arg(long, value_name = "PATH")]
        candidates: PathBuf,
        /// JSON natal chart.
        #[arg(long, value_name = "PATH")]
        natal: PathBuf,
        /// JSON moment chart.  Defaults to the natal chart.
        #[arg(long, value_name = "PATH")]
        moment: Option<PathBuf>,
        #[arg(long)]
        limit: Option<usize>,
        /// Omit the human-readable reasons.
        #[arg(long)]
        no_reasons: bool,
    },
    /// Print thermodynamic metrics for each candidate.
    Thermo {
        #[arg(long, value_name = "PATH")]
        candidates: PathBuf,
    },
    /// Score a recipe's elemental profile against a user's.
    Compat {
        #[arg(long, value_name = "PATH")]
        recipe: PathBuf,
        #[arg(long, value_name = "PATH")]
        user: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = EngineConfig::load_from(&cli.config)?;

    // RUST_LOG wins; otherwise the configured level.  Logs go to stderr so
    // stdout stays valid JSON.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let rendered = match cli.command {
        Commands::Rank {
            candidates,
            natal,
            moment,
            limit,
            no_reasons,
        } => {
            let request = commands::RankRequest {
                candidates,
                natal,
                moment,
                limit,
                include_reasons: !no_reasons,
            };
            commands::run_rank(&config, &request).await?
        }
        Commands::Thermo { candidates } => commands::run_thermo(&candidates)?,
        Commands::Compat { recipe, user } => commands::run_compat(&recipe, &user)?,
    };

    println!("{rendered}");
    Ok(())
}
