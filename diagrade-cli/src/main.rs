//! Diagrade CLI — score UML use-case diagrams from the terminal.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Diagrade: automated grading of UML use-case diagrams
#[derive(Parser, Debug)]
#[command(name = "diagrade", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (where diagrade.toml is looked up)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Score a single student diagram against a reference solution
    Score {
        /// Path to the student diagram source
        #[arg(long)]
        student: PathBuf,
        /// Path to the reference diagram source
        #[arg(long)]
        reference: PathBuf,
        /// Path to the problem description text
        #[arg(long)]
        problem: PathBuf,
        /// Diagram type tag (auto-detected when omitted)
        #[arg(long)]
        diagram_type: Option<String>,
        /// Override weight for the actor category
        #[arg(long)]
        actor_weight: Option<f64>,
        /// Override weight for the use-case category
        #[arg(long)]
        use_case_weight: Option<f64>,
        /// Override weight for the relationship category
        #[arg(long)]
        relationship_weight: Option<f64>,
    },
    /// Score a batch manifest (JSON array of score requests)
    Batch {
        /// Path to the manifest file
        manifest: PathBuf,
    },
    /// Print the pipeline capability description
    Status,
    /// Print the health payload
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; ignore a missing file.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "diagrade_core=warn,diagrade_cli=warn",
        1 => "diagrade_core=info,diagrade_cli=info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = diagrade_core::config::load_config(Some(&cli.workspace))
        .map_err(|e| anyhow::anyhow!("Configuration error: {e}"))?;

    match cli.command {
        Commands::Score {
            student,
            reference,
            problem,
            diagram_type,
            actor_weight,
            use_case_weight,
            relationship_weight,
        } => {
            commands::score(
                config,
                commands::ScoreArgs {
                    student,
                    reference,
                    problem,
                    diagram_type,
                    actor_weight,
                    use_case_weight,
                    relationship_weight,
                },
            )
            .await
        }
        Commands::Batch { manifest } => commands::batch(config, &manifest).await,
        Commands::Status => commands::status(&config),
        Commands::Health => commands::health(&config),
    }
}
