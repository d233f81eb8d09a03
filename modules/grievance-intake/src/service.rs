//! The programmatic surface the CLI maps onto one command per operation.

use std::sync::Arc;

use chrono::Utc;
use grievance_common::{
    Config, Grievance, GrievanceError, GrievancePatch, GrievanceStats, GrievanceStatus,
    ListFilter, Page, PageRequest, RawRecord, Result, SubmissionForm,
};
use grievance_store::{GrievanceStore, SheetStore};
use tracing::info;

use crate::normalizer::normalize;
use crate::orchestrator::{IngestOutcome, Orchestrator};
use crate::sources::{build_sources, SourceAdapter};
use crate::stats::StatsAggregator;
use crate::summary::CycleSummary;

#[derive(Clone)]
pub struct GrievanceService {
    store: Arc<dyn GrievanceStore>,
    orchestrator: Orchestrator,
    sources: Vec<Arc<dyn SourceAdapter>>,
}

impl GrievanceService {
    pub fn new(orchestrator: Orchestrator, sources: Vec<Arc<dyn SourceAdapter>>) -> Self {
        Self {
            store: orchestrator.store().clone(),
            orchestrator,
            sources,
        }
    }

    /// Store, sources and orchestrator as configured by the environment.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store: Arc<dyn GrievanceStore> = Arc::new(SheetStore::from_config(config)?);
        let orchestrator = Orchestrator::builder()
            .store(store)
            .dedup(config.dedup.clone())
            .workers(config.scrape.workers)
            .max_pages(config.scrape.max_pages)
            .build();
        Ok(Self::new(orchestrator, build_sources(config)?))
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// File a citizen grievance. A repeat of the same submission within the
    /// double-submit window returns the ticket already on file.
    pub async fn submit(&self, form: SubmissionForm) -> Result<Grievance> {
        let draft = normalize(RawRecord::UserSubmission(form), Utc::now())?;
        match self.orchestrator.ingest(draft).await? {
            IngestOutcome::Created(g) | IngestOutcome::Updated(g) => Ok(g),
            IngestOutcome::Duplicate { ticket_id } => {
                info!(ticket_id = ticket_id.as_str(), "Repeat submission absorbed");
                self.get(&ticket_id).await
            }
        }
    }

    pub async fn list(&self, filter: &ListFilter, page: PageRequest) -> Result<Page<Grievance>> {
        self.store.list(filter, page).await
    }

    pub async fn get(&self, ticket_id: &str) -> Result<Grievance> {
        self.store
            .get_by_ticket(ticket_id)
            .await?
            .ok_or_else(|| GrievanceError::NotFound(ticket_id.to_string()))
    }

    /// Move a ticket along its lifecycle. Without `expected_version` the
    /// currently stored version is used.
    pub async fn update_status(
        &self,
        ticket_id: &str,
        status: GrievanceStatus,
        expected_version: Option<u64>,
    ) -> Result<Grievance> {
        let expected = match expected_version {
            Some(v) => v,
            None => self.get(ticket_id).await?.version,
        };
        let updated = self
            .store
            .update(ticket_id, expected, GrievancePatch::status(status, Utc::now()))
            .await?;
        info!(
            ticket_id,
            status = %updated.status,
            version = updated.version,
            "Status updated"
        );
        Ok(updated)
    }

    pub async fn stats(&self) -> Result<GrievanceStats> {
        StatsAggregator::new(self.store.clone()).stats().await
    }

    pub async fn scrape_all(&self) -> CycleSummary {
        self.orchestrator.run_cycle(&self.sources).await
    }

    /// Scrape a single source, matched by name case-insensitively.
    pub async fn scrape_one(&self, name: &str) -> Result<CycleSummary> {
        let source = self
            .sources
            .iter()
            .find(|s| s.name().eq_ignore_ascii_case(name.trim()))
            .cloned()
            .ok_or_else(|| GrievanceError::UnknownSource(name.to_string()))?;
        Ok(self.orchestrator.run_cycle(&[source]).await)
    }
}
