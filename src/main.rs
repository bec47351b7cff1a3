use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use kb_embeddings::Result;
use kb_embeddings::commands::{
    add_record, build_content, reset_record, run_backfill, search, show_status,
};
use kb_embeddings::config::{resolve_config_dir, run_interactive_config, show_config};
use kb_embeddings::database::{EntityKind, NewRecord};

#[derive(Parser)]
#[command(name = "kb-embeddings")]
#[command(about = "Embedding backfill and semantic search for knowledge records")]
#[command(version)]
struct Cli {
    /// Use this directory for configuration and the record database
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding provider and backfill settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Embed every record of a business unit that has no embedding yet
    Backfill {
        /// Business unit whose records are embedded
        #[arg(long)]
        tenant: String,
    },
    /// Find the records most similar to a query
    Search {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        query: String,
        /// Only search one record kind (knowledge, guideline, training, faq, canned)
        #[arg(long)]
        kind: Option<EntityKind>,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
        /// Minimum cosine similarity, between -1 and 1
        #[arg(long)]
        threshold: Option<f32>,
        /// Also return records containing the query text
        #[arg(long)]
        hybrid: bool,
    },
    /// Show embedded and pending record counts
    Status {
        #[arg(long)]
        tenant: String,
    },
    /// Add a record without an embedding
    Add {
        #[arg(long)]
        tenant: String,
        /// Record kind (knowledge, guideline, training, faq, canned)
        #[arg(long)]
        kind: EntityKind,
        /// Topic, title or question, depending on the kind
        #[arg(long)]
        heading: Option<String>,
        /// Content, answer or message, depending on the kind
        #[arg(long)]
        body: String,
        #[arg(long)]
        category: Option<String>,
        /// Short answer shown with FAQ records
        #[arg(long)]
        short_answer: Option<String>,
    },
    /// Clear a record's embedding so the next backfill embeds it again
    Reset {
        #[arg(long)]
        kind: EntityKind,
        /// Record ID
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_dir = resolve_config_dir(cli.config_dir.as_deref())?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Backfill { tenant } => {
            let report = run_backfill(&config_dir, &tenant).await?;
            if report.has_failures() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Search {
            tenant,
            query,
            kind,
            limit,
            threshold,
            hybrid,
        } => {
            search(&config_dir, &tenant, &query, kind, limit, threshold, hybrid).await?;
        }
        Commands::Status { tenant } => {
            show_status(&config_dir, &tenant).await?;
        }
        Commands::Add {
            tenant,
            kind,
            heading,
            body,
            category,
            short_answer,
        } => {
            let record = NewRecord {
                business_unit_id: tenant,
                category,
                content: build_content(kind, heading, body, short_answer)?,
            };
            add_record(&config_dir, record).await?;
        }
        Commands::Reset { kind, id } => {
            reset_record(&config_dir, kind, &id).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
