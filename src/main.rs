//! # mrdoc CLI
//!
//! ```bash
//! mrdoc --config ./config/mrdoc.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mrdoc serve` | Start the HTTP API |
//! | `mrdoc open` | List open merge requests |
//! | `mrdoc changes <mr_id>` | Filter, persist, and index a merge request |
//! | `mrdoc index-docs` | Index the documentation tree |
//! | `mrdoc prompt <mr_id> [--summary]` | Print the documentation-update (or summary) prompt |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use mrdoc::commands;
use mrdoc::config::load_config;
use mrdoc::pipeline::Services;
use mrdoc::prompts::PromptKind;
use mrdoc::server::run_server;

/// Merge-request change filter and RAG document builder.
///
/// Settings are read from a TOML file; `GITLAB_*`, `CODE_CHANGE_*`,
/// `DOC_EXCLUDE_FILE_PATHS` and `PROXY` environment variables (or a `.env`
/// file) override it. See `config/mrdoc.example.toml`.
#[derive(Parser)]
#[command(name = "mrdoc", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mrdoc.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// List open merge requests.
    Open,

    /// Fetch, filter, and persist a merge request's changes, then build its index.
    Changes {
        /// Merge request IID.
        mr_id: u64,
    },

    /// Build the documentation index from `[docs].root`.
    IndexDocs,

    /// Print the documentation-update prompt for a processed merge request.
    Prompt {
        mr_id: u64,

        /// Print the summary prompt instead of the documentation-update prompt.
        #[arg(long)]
        summary: bool,

        /// Use this prompt instead of the default template.
        #[arg(long)]
        text: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;
    let services = Services::from_config(cfg)?;

    match cli.command {
        Commands::Serve => run_server(services).await?,
        Commands::Open => commands::run_open(&services).await?,
        Commands::Changes { mr_id } => commands::run_changes(&services, mr_id).await?,
        Commands::IndexDocs => commands::run_index_docs(&services).await?,
        Commands::Prompt { mr_id, summary, text } => {
            let kind = if summary { PromptKind::Summary } else { PromptKind::Documentation };
            commands::run_prompt(&services, mr_id, kind, text.as_deref())?
        }
    }

    Ok(())
}
