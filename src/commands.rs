use anyhow::{Context, Result, bail};
use console::style;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::database::{Database, EntityKind, NewRecord, RecordContent, RecordStore};
use crate::embeddings::{EmbeddingClient, estimate_cost};
use crate::indexer::{BackfillReport, BackfillRunner, build_embed_text};
use crate::search::{SearchOptions, SemanticSearch};

async fn open_database(config: &Config) -> Result<Database> {
    Database::initialize_from_config_dir(config.get_base_dir())
        .await
        .context("Failed to initialize database")
}

/// Embed every record of a tenant that has no embedding yet and print the outcome.
///
/// The caller decides what failures mean for the exit code via [`BackfillReport::has_failures`].
#[inline]
pub async fn run_backfill(config_dir: &Path, business_unit_id: &str) -> Result<BackfillReport> {
    let config = Config::load(config_dir)?;
    let database = open_database(&config).await?;
    let client = EmbeddingClient::from_config(&config)?;

    let pending_cost = estimate_pending_cost(&database, business_unit_id).await?;
    println!(
        "🚀 Embedding backfill for business unit {} (model: {})",
        business_unit_id, config.provider.model
    );
    if pending_cost > 0.0 {
        println!("   Estimated cost: ${:.6}", pending_cost);
    }
    println!();

    let runner = BackfillRunner::from_config(&config, Arc::new(database), Arc::new(client));
    let report = runner.run(business_unit_id).await?;

    print_report(&report);
    Ok(report)
}

/// Advisory USD cost of embedding everything still pending for a tenant
async fn estimate_pending_cost(database: &Database, business_unit_id: &str) -> Result<f64> {
    let mut total = 0.0;
    for kind in EntityKind::BACKFILL_ORDER {
        for record in database.scan_unembedded(kind, business_unit_id).await? {
            total += estimate_cost(&build_embed_text(&record));
        }
    }
    Ok(total)
}

fn print_report(report: &BackfillReport) {
    println!("{}", style("Backfill Summary").bold());
    println!("{}", "=".repeat(50));

    for (kind, stats) in &report.entities {
        println!("{:<18} {}", format!("{}:", kind.label()), stats);
    }

    println!("{}", "-".repeat(50));
    let totals = report.totals();
    println!("{:<18} {}", "Total:", totals);
    println!("Duration: {:.1}s", report.duration.as_secs_f64());

    if totals.failed > 0 {
        println!(
            "{}",
            style(format!("❌ {} record(s) failed to embed", totals.failed)).red()
        );
    } else {
        println!("{}", style("✅ Backfill completed").green());
    }
}

/// Rank a tenant's embedded records against a free-text query
#[inline]
pub async fn search(
    config_dir: &Path,
    business_unit_id: &str,
    query: &str,
    kind: Option<EntityKind>,
    limit: Option<usize>,
    threshold: Option<f32>,
    hybrid: bool,
) -> Result<()> {
    let config = Config::load(config_dir)?;
    let database = open_database(&config).await?;
    let client = EmbeddingClient::from_config(&config)?;

    let defaults = SearchOptions::from(&config.search);
    let options = SearchOptions {
        limit: limit.unwrap_or(defaults.limit),
        threshold: threshold.unwrap_or(defaults.threshold),
        hybrid,
    };

    let search = SemanticSearch::new(Arc::new(database), Arc::new(client));
    let results = match kind {
        Some(kind) => search.search(business_unit_id, kind, query, &options).await?,
        None => {
            search
                .search_all_kinds(business_unit_id, query, &options)
                .await?
        }
    };

    if results.is_empty() {
        println!(
            "No records above similarity {:.2} for \"{}\"",
            options.threshold, query
        );
        return Ok(());
    }

    println!("🔍 {} result(s) for \"{}\":", results.len(), query);
    println!();
    for (rank, result) in results.iter().enumerate() {
        let record = &result.record;
        println!(
            "{}. [{}] {} (similarity: {:.3}, {} match)",
            rank + 1,
            record.kind(),
            crate::indexer::display_label(record),
            result.similarity,
            result.match_type
        );
        println!("   ID: {}", record.id);
        if let Some(category) = &record.category {
            println!("   Category: {}", category);
        }
    }

    Ok(())
}

/// Print embedded vs. pending counts per record table for a tenant
#[inline]
pub async fn show_status(config_dir: &Path, business_unit_id: &str) -> Result<()> {
    let config = Config::load(config_dir)?;
    let database = open_database(&config).await?;

    println!("📊 Embedding Status for business unit {}", business_unit_id);
    println!("{}", "=".repeat(50));
    println!("Model: {}", config.provider.model);
    println!("Database: {}", config.database_path().display());
    println!();

    let mut embedded = 0;
    let mut pending = 0;
    for kind in EntityKind::BACKFILL_ORDER {
        let counts = database.embedding_counts(kind, business_unit_id).await?;
        println!(
            "{:<18} {} embedded, {} pending",
            format!("{}:", kind.label()),
            counts.embedded,
            counts.pending
        );
        embedded += counts.embedded;
        pending += counts.pending;
    }

    println!("{}", "-".repeat(50));
    println!("{:<18} {} embedded, {} pending", "Total:", embedded, pending);

    if pending > 0 {
        println!();
        println!(
            "Run 'kb-embeddings backfill --tenant {}' to embed pending records.",
            business_unit_id
        );
    }

    Ok(())
}

/// Assemble typed record content from the generic heading/body/extra CLI fields
#[inline]
pub fn build_content(
    kind: EntityKind,
    heading: Option<String>,
    body: String,
    extra: Option<String>,
) -> Result<RecordContent> {
    if extra.is_some() && kind != EntityKind::Faq {
        bail!("--short-answer is only supported for FAQ records");
    }

    let required = |heading: Option<String>, what: &str| {
        heading.with_context(|| format!("{} records require --heading ({})", kind.label(), what))
    };

    let content = match kind {
        EntityKind::KnowledgeBase => RecordContent::KnowledgeBase {
            topic: heading,
            content: body,
        },
        EntityKind::Guideline => RecordContent::Guideline {
            title: required(heading, "the title")?,
            content: body,
        },
        EntityKind::TrainingData => RecordContent::TrainingData {
            question: required(heading, "the question")?,
            answer: body,
        },
        EntityKind::Faq => RecordContent::Faq {
            question: required(heading, "the question")?,
            answer: body,
            short_answer: extra,
        },
        EntityKind::CannedMessage => RecordContent::CannedMessage {
            title: heading,
            message: body,
        },
    };

    Ok(content)
}

/// Insert a raw record without an embedding
#[inline]
pub async fn add_record(config_dir: &Path, record: NewRecord) -> Result<()> {
    let config = Config::load(config_dir)?;
    let database = open_database(&config).await?;

    let created = database.insert_record(record).await?;
    info!("Added {} record {}", created.kind(), created.id);

    println!("Created {} record (ID: {})", created.kind(), created.id);
    println!("It will be embedded by the next backfill.");

    Ok(())
}

/// Clear one record's embedding so the next backfill embeds it again
#[inline]
pub async fn reset_record(config_dir: &Path, kind: EntityKind, id: &str) -> Result<()> {
    let config = Config::load(config_dir)?;
    let database = open_database(&config).await?;

    if !database.clear_embedding(kind, id).await? {
        bail!("{} record not found: {}", kind.label(), id);
    }

    println!("Cleared embedding of {} record {}", kind, id);
    Ok(())
}
