// Indexer module
// This module drives the embedding backfill over every record table of a tenant

pub mod adapters;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::database::{EntityKind, KnowledgeRecord, RecordStore};
use crate::embeddings::Embedder;

pub use adapters::{build_embed_text, display_label, fields_to_embed, persist};


/// Pause after each successful embedding when nothing else is configured
pub const DEFAULT_BACKFILL_DELAY: Duration = Duration::from_millis(100);

/// Outcome counts for one entity table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityStats {
    pub total: usize,
    pub success: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl EntityStats {
    #[inline]
    pub fn accumulate(&mut self, other: &EntityStats) {
        self.total += other.total;
        self.success += other.success;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

impl fmt::Display for EntityStats {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} total, {} embedded, {} skipped, {} failed",
            self.total, self.success, self.skipped, self.failed
        )
    }
}

/// Result of one backfill run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    /// Per-table counts in the order the tables were visited
    pub entities: Vec<(EntityKind, EntityStats)>,
    pub duration: Duration,
}

impl BackfillReport {
    #[inline]
    pub fn totals(&self) -> EntityStats {
        self.entities
            .iter()
            .fold(EntityStats::default(), |mut totals, (_, stats)| {
                totals.accumulate(stats);
                totals
            })
    }

    #[inline]
    pub fn stats_for(&self, kind: EntityKind) -> Option<EntityStats> {
        self.entities
            .iter()
            .find(|(entity, _)| *entity == kind)
            .map(|(_, stats)| *stats)
    }

    #[inline]
    pub fn has_failures(&self) -> bool {
        self.totals().failed > 0
    }
}

/// Where a backfill currently is within one entity table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillPhase {
    Scanning,
    Processing { index: usize },
    Done,
}

enum RecordOutcome {
    Embedded,
    Skipped,
}

/// Embeds every record of a tenant that has no embedding yet.
///
/// Tables and records are processed strictly one at a time. A failure on one record is
/// logged and counted; it never stops the remaining records or tables.
pub struct BackfillRunner {
    store: Arc<dyn RecordStore>,
    embedder: Arc<dyn Embedder>,
    delay: Duration,
}

impl BackfillRunner {
    #[inline]
    pub fn new(store: Arc<dyn RecordStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            delay: DEFAULT_BACKFILL_DELAY,
        }
    }

    /// Build a runner paced by the `[backfill]` section of `config`
    #[inline]
    pub fn from_config(
        config: &Config,
        store: Arc<dyn RecordStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self::new(store, embedder).with_delay(Duration::from_millis(config.backfill.delay_ms))
    }

    /// Fixed wait after every successfully embedded record
    #[inline]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Run one backfill for `business_unit_id` across all record tables.
    ///
    /// Only a failing table scan ends the run early; per-record failures are reported in
    /// the returned [`BackfillReport`].
    #[inline]
    pub async fn run(&self, business_unit_id: &str) -> Result<BackfillReport> {
        let started = Instant::now();
        info!(
            "Starting embedding backfill for business unit {} with model {}",
            business_unit_id,
            self.embedder.model()
        );

        let mut entities = Vec::with_capacity(EntityKind::BACKFILL_ORDER.len());
        for kind in EntityKind::BACKFILL_ORDER {
            let stats = self.backfill_kind(kind, business_unit_id).await?;
            info!("{}: {}", kind.label(), stats);
            entities.push((kind, stats));
        }

        let report = BackfillReport {
            entities,
            duration: started.elapsed(),
        };

        info!(
            "Backfill finished in {:.1}s: {}",
            report.duration.as_secs_f64(),
            report.totals()
        );

        Ok(report)
    }

    async fn backfill_kind(&self, kind: EntityKind, business_unit_id: &str) -> Result<EntityStats> {
        let mut phase = BackfillPhase::Scanning;
        debug!("{} backfill phase: {:?}", kind, phase);

        let candidates = self
            .store
            .scan_unembedded(kind, business_unit_id)
            .await
            .with_context(|| format!("Failed to scan {} records", kind.label()))?;

        let mut stats = EntityStats {
            total: candidates.len(),
            ..EntityStats::default()
        };

        if candidates.is_empty() {
            debug!("No {} records need embedding", kind.label());
            return Ok(stats);
        }

        info!("Found {} {} records to embed", candidates.len(), kind.label());

        for (index, candidate) in candidates.iter().enumerate() {
            phase = BackfillPhase::Processing { index };
            debug!("{} backfill phase: {:?}", kind, phase);

            match self.embed_record(kind, candidate).await {
                Ok(RecordOutcome::Embedded) => {
                    stats.success += 1;
                    debug!("Embedded {} record \"{}\"", kind, display_label(candidate));
                    sleep(self.delay).await;
                }
                Ok(RecordOutcome::Skipped) => {
                    stats.skipped += 1;
                    debug!(
                        "Skipping {} record \"{}\" (already has embedding)",
                        kind,
                        display_label(candidate)
                    );
                }
                Err(e) => {
                    stats.failed += 1;
                    error!(
                        "Failed to embed {} record {} (\"{}\"): {:#}",
                        kind,
                        candidate.id,
                        display_label(candidate),
                        e
                    );
                }
            }
        }

        phase = BackfillPhase::Done;
        debug!("{} backfill phase: {:?}", kind, phase);

        Ok(stats)
    }

    async fn embed_record(
        &self,
        kind: EntityKind,
        candidate: &KnowledgeRecord,
    ) -> Result<RecordOutcome> {
        // The scan may be stale: another writer can embed the record in between
        let current = self
            .store
            .get_record(kind, &candidate.id)
            .await?
            .ok_or_else(|| anyhow!("{} record {} no longer exists", kind, candidate.id))?;

        if current.is_embedded() {
            return Ok(RecordOutcome::Skipped);
        }

        let text = build_embed_text(&current);
        let embedder = Arc::clone(&self.embedder);
        let vector = tokio::task::spawn_blocking(move || embedder.embed_one(&text))
            .await
            .context("Embedding task panicked")??;

        persist(
            self.store.as_ref(),
            kind,
            &current.id,
            vector,
            self.embedder.model(),
            Utc::now(),
        )
        .await?;

        Ok(RecordOutcome::Embedded)
    }
}
