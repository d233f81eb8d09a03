//! Scrape cycles: sources run concurrently, records within a source run in
//! fetch order through normalize -> dedup -> persist.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use grievance_common::{DedupSettings, Grievance, GrievanceDraft, GrievanceError, RawRecord, Result};
use grievance_store::GrievanceStore;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use typed_builder::TypedBuilder;

use crate::dedup::{DedupVerdict, Deduplicator};
use crate::normalizer::normalize;
use crate::sources::SourceAdapter;
use crate::summary::{CycleSummary, SourceSummary};

/// Attempts per record when a concurrent writer bumps the version first.
const MAX_CONFLICT_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    Created(Grievance),
    Updated(Grievance),
    Duplicate { ticket_id: String },
}

impl IngestOutcome {
    pub fn ticket_id(&self) -> &str {
        match self {
            IngestOutcome::Created(g) | IngestOutcome::Updated(g) => &g.ticket_id,
            IngestOutcome::Duplicate { ticket_id } => ticket_id,
        }
    }
}

/// How one record ended, as far as the cycle's counters are concerned.
enum RecordResult {
    Counted,
    StopSource(GrievanceError),
}

#[derive(Clone, TypedBuilder)]
pub struct Orchestrator {
    store: Arc<dyn GrievanceStore>,
    #[builder(default)]
    dedup: DedupSettings,
    /// Sources scraped at the same time.
    #[builder(default = 4)]
    workers: usize,
    /// Page cap per source per cycle.
    #[builder(default = 10)]
    max_pages: usize,
    #[builder(default)]
    cancelled: Arc<AtomicBool>,
    /// Where each paginated source resumes on its next cycle.
    #[builder(default, setter(skip))]
    cursors: Arc<Mutex<HashMap<String, String>>>,
}

impl Orchestrator {
    pub fn store(&self) -> &Arc<dyn GrievanceStore> {
        &self.store
    }

    pub fn deduplicator(&self) -> Deduplicator {
        Deduplicator::new(self.store.clone(), self.dedup.clone())
    }

    /// Flag shared with whoever may stop a running cycle.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// Stop the current (or next) cycle; `run_cycle` clears the flag when it returns.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn resume_cursor(&self, source: &str) -> Option<String> {
        self.cursors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(source)
            .cloned()
    }

    fn save_cursor(&self, source: &str, cursor: Option<String>) {
        let mut cursors = self.cursors.lock().unwrap_or_else(|e| e.into_inner());
        match cursor {
            Some(cursor) => {
                cursors.insert(source.to_string(), cursor);
            }
            None => {
                cursors.remove(source);
            }
        }
    }

    /// Run every source once. Never fails: per-source errors land in the summary.
    ///
    /// A cancellation requested before or during the cycle stops this cycle
    /// only; the flag is cleared once it finishes.
    pub async fn run_cycle(&self, sources: &[Arc<dyn SourceAdapter>]) -> CycleSummary {
        info!(
            sources = sources.len(),
            workers = self.workers,
            "Starting scrape cycle"
        );

        // Pick up rows other writers appended since the last cycle.
        if let Err(e) = self.store.refresh().await {
            warn!(error = %e, kind = e.kind(), "Store refresh failed, using cached index");
        }

        let mut summaries: Vec<SourceSummary> = stream::iter(
            sources
                .iter()
                .cloned()
                .map(|source| self.run_source(source)),
        )
        .buffer_unordered(self.workers.max(1))
        .collect()
        .await;
        summaries.sort_by(|a, b| a.name.cmp(&b.name));

        let summary = CycleSummary { sources: summaries };
        info!("{summary}");
        if self.cancelled.swap(false, Ordering::Relaxed) {
            info!("Cycle cancelled, cleared for the next run");
        }
        summary
    }

    /// One source's cycle: pages in order, records in order, stopping at the
    /// page cap, on cancellation, or on the first source/store failure.
    /// Does not clear the cancel flag.
    pub async fn run_source(&self, source: Arc<dyn SourceAdapter>) -> SourceSummary {
        let name = source.name().to_string();
        let mut summary = SourceSummary::new(&name, source.kind());
        let dedup = self.deduplicator();

        let mut cursor = self.resume_cursor(&name);
        if let Some(c) = &cursor {
            info!(source = name.as_str(), cursor = c.as_str(), "Resuming source");
        }

        'pages: loop {
            if self.is_cancelled() {
                summary.cancelled = true;
                self.save_cursor(&name, cursor);
                break;
            }
            if summary.pages as usize >= self.max_pages {
                info!(
                    source = name.as_str(),
                    pages = summary.pages,
                    "Page cap reached, resuming next cycle"
                );
                self.save_cursor(&name, cursor);
                break;
            }

            let batch = match source.fetch(cursor.as_deref()).await {
                Ok(batch) => batch,
                Err(e) => {
                    if e.is_source_failure() {
                        warn!(source = name.as_str(), kind = e.kind(), error = %e, "Source fetch failed");
                    } else {
                        error!(source = name.as_str(), kind = e.kind(), error = %e, "Source fetch failed unexpectedly");
                    }
                    summary.error = Some(e.to_string());
                    self.save_cursor(&name, None);
                    break;
                }
            };
            summary.pages += 1;
            debug!(
                source = name.as_str(),
                page = summary.pages,
                records = batch.records.len(),
                "Fetched page"
            );

            for raw in batch.records {
                if self.is_cancelled() {
                    summary.cancelled = true;
                    self.save_cursor(&name, cursor);
                    break 'pages;
                }
                if let RecordResult::StopSource(e) =
                    self.process_record(&dedup, raw, &mut summary).await
                {
                    warn!(
                        source = name.as_str(),
                        kind = e.kind(),
                        error = %e,
                        "Stopping source for this cycle"
                    );
                    summary.error = Some(e.to_string());
                    self.save_cursor(&name, cursor);
                    break 'pages;
                }
            }

            match batch.next_cursor {
                Some(next) => cursor = Some(next),
                None => {
                    self.save_cursor(&name, None);
                    break;
                }
            }
        }

        info!(
            source = name.as_str(),
            pages = summary.pages,
            created = summary.created,
            updated = summary.updated,
            duplicates = summary.duplicates,
            rejected = summary.rejected,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Source cycle finished"
        );
        summary
    }

    async fn process_record(
        &self,
        dedup: &Deduplicator,
        raw: RawRecord,
        summary: &mut SourceSummary,
    ) -> RecordResult {
        let draft = match normalize(raw, Utc::now()) {
            Ok(draft) => draft,
            Err(e) => {
                debug!(source = summary.name.as_str(), error = %e, "Record rejected");
                summary.rejected += 1;
                return RecordResult::Counted;
            }
        };

        match self.ingest_with(dedup, draft).await {
            Ok(IngestOutcome::Created(_)) => summary.created += 1,
            Ok(IngestOutcome::Updated(_)) => summary.updated += 1,
            Ok(IngestOutcome::Duplicate { .. }) => summary.duplicates += 1,
            Err(e @ GrievanceError::PersistenceUnavailable { .. }) => {
                summary.failed += 1;
                return RecordResult::StopSource(e);
            }
            Err(e) => {
                warn!(
                    source = summary.name.as_str(),
                    kind = e.kind(),
                    error = %e,
                    "Failed to store record"
                );
                summary.failed += 1;
            }
        }
        RecordResult::Counted
    }

    /// Dedup and persist one normalized draft.
    pub async fn ingest(&self, draft: GrievanceDraft) -> Result<IngestOutcome> {
        self.ingest_with(&self.deduplicator(), draft).await
    }

    async fn ingest_with(
        &self,
        dedup: &Deduplicator,
        draft: GrievanceDraft,
    ) -> Result<IngestOutcome> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let (fingerprint, verdict) = dedup.resolve(&draft).await?;
            let result = match verdict {
                DedupVerdict::Create => self
                    .store
                    .insert(draft.clone(), fingerprint)
                    .await
                    .map(IngestOutcome::Created),
                DedupVerdict::Update {
                    ticket_id,
                    expected_version,
                    patch,
                    similarity,
                } => {
                    debug!(
                        ticket_id = ticket_id.as_str(),
                        similarity, "Merging into existing grievance"
                    );
                    self.store
                        .update(&ticket_id, expected_version, patch)
                        .await
                        .map(IngestOutcome::Updated)
                }
                DedupVerdict::Absorb { ticket_id } => Ok(IngestOutcome::Duplicate { ticket_id }),
            };

            match result {
                Err(e) if e.is_retryable() && attempt < MAX_CONFLICT_ATTEMPTS => {
                    debug!(attempt, error = %e, "Re-resolving after version conflict");
                }
                // Closed or rejected between the read and the write.
                Err(GrievanceError::TerminalRecord { ticket_id, .. }) => {
                    return Ok(IngestOutcome::Duplicate { ticket_id });
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{memory_store, portal_entry, StaticSource};

    #[tokio::test]
    async fn page_cap_saves_cursor_for_next_cycle() {
        let (store, _sheet) = memory_store();
        let source = Arc::new(StaticSource::paged(
            "CPGRAMS",
            vec![
                vec![portal_entry("CPGRAMS", "1", "Pothole near bus stand")],
                vec![portal_entry("CPGRAMS", "2", "Sewage overflow in lane 4")],
                vec![portal_entry("CPGRAMS", "3", "Broken footpath tiles")],
            ],
        ));
        let orchestrator = Orchestrator::builder()
            .store(store.clone())
            .max_pages(2)
            .build();

        let first = orchestrator.run_source(source.clone()).await;
        assert_eq!(first.pages, 2);
        assert_eq!(first.created, 2);
        assert_eq!(orchestrator.resume_cursor("CPGRAMS").as_deref(), Some("2"));

        let second = orchestrator.run_source(source).await;
        assert_eq!(second.pages, 1);
        assert_eq!(second.created, 1);
        assert_eq!(orchestrator.resume_cursor("CPGRAMS"), None);
    }

    #[tokio::test]
    async fn pre_cancelled_orchestrator_fetches_nothing() {
        let (store, _sheet) = memory_store();
        let source = Arc::new(StaticSource::single(
            "CPGRAMS",
            vec![portal_entry("CPGRAMS", "1", "Pothole near bus stand")],
        ));
        let orchestrator = Orchestrator::builder().store(store).build();
        orchestrator.cancel();

        let summary = orchestrator.run_source(source.clone()).await;
        assert!(summary.cancelled);
        assert_eq!(summary.pages, 0);
        assert_eq!(source.fetch_count(), 0);
    }
}
