use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use grievance_common::{
    Config, Grievance, GrievanceDraft, GrievanceError, GrievancePatch, GrievanceStatus, GroupBy,
    ListFilter, Page, PageRequest, Result, SourceKind, StoreSettings,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::google::GoogleSheetsBackend;
use crate::index::SheetIndex;
use crate::limiter::StoreRateLimiter;
use crate::memory::MemorySheet;
use crate::retry::RetryPolicy;
use crate::row::{from_row, to_row, COL_TICKET, HEADER};
use crate::sheet::{SheetBackend, SheetError, FIRST_DATA_ROW};

/// Counts per group for each requested dimension.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    pub total: usize,
    pub groups: HashMap<GroupBy, BTreeMap<String, usize>>,
}

impl Aggregation {
    pub fn group(&self, by: GroupBy) -> BTreeMap<String, usize> {
        self.groups.get(&by).cloned().unwrap_or_default()
    }
}

/// Read/write access to canonical grievance records.
#[async_trait]
pub trait GrievanceStore: Send + Sync {
    /// Fresh read of one record.
    async fn get_by_ticket(&self, ticket_id: &str) -> Result<Option<Grievance>>;

    /// Newest record carrying this fingerprint.
    async fn get_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Grievance>>;

    /// Non-terminal records in a dedup bucket updated at or after `since`.
    async fn candidates(&self, bucket: &str, since: DateTime<Utc>) -> Result<Vec<Grievance>>;

    /// Persist a new record with a freshly assigned ticket id and version 1.
    async fn insert(&self, draft: GrievanceDraft, fingerprint: String) -> Result<Grievance>;

    /// Apply `patch` if the stored version still equals `expected_version`.
    async fn update(
        &self,
        ticket_id: &str,
        expected_version: u64,
        patch: GrievancePatch,
    ) -> Result<Grievance>;

    async fn list(&self, filter: &ListFilter, page: PageRequest) -> Result<Page<Grievance>>;

    /// Drop cached lookups and re-read the backing sheet.
    async fn refresh(&self) -> Result<()>;

    async fn aggregate(&self, dimensions: &[GroupBy]) -> Result<Aggregation>;
}

/// `CS`/`SC` prefix followed by 8 upper-case hex characters.
pub fn generate_ticket_id(source: SourceKind) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{}{}", source.ticket_prefix(), hex[..8].to_uppercase())
}

/// Grievance store over a spreadsheet tab.
///
/// Every backend request passes through the shared rate limiter and the retry
/// policy. Inserts and updates are serialized in-process by `sheet_lock`;
/// across processes the version column is the only guard.
pub struct SheetStore {
    backend: Arc<dyn SheetBackend>,
    limiter: StoreRateLimiter,
    retry: RetryPolicy,
    index: Mutex<Option<SheetIndex>>,
    header_checked: AtomicBool,
    sheet_lock: tokio::sync::Mutex<()>,
}

impl SheetStore {
    pub fn new(backend: Arc<dyn SheetBackend>, settings: &StoreSettings) -> Self {
        Self {
            backend,
            limiter: StoreRateLimiter::new(settings.requests_per_minute, settings.burst),
            retry: RetryPolicy::from(settings),
            index: Mutex::new(None),
            header_checked: AtomicBool::new(false),
            sheet_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Google Sheets when credentials are configured, otherwise an in-memory
    /// sheet that lives as long as the process.
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend: Arc<dyn SheetBackend> = match (
            config.sheets.spreadsheet_id.as_deref(),
            config.sheets.access_token.as_deref(),
        ) {
            (Some(id), Some(token)) => {
                info!(tab = %config.sheets.tab, "Using Google Sheets store");
                Arc::new(
                    GoogleSheetsBackend::new(id, config.sheets.tab.as_str(), token)
                        .map_err(|e| GrievanceError::Config(e.to_string()))?,
                )
            }
            _ => {
                warn!("Sheet credentials not configured, using in-memory store");
                Arc::new(MemorySheet::new())
            }
        };
        Ok(Self::new(backend, &config.store))
    }

    async fn call<T, F, Fut>(&self, operation: &str, op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, SheetError>>,
    {
        self.retry.run(&self.limiter, operation, op).await
    }

    fn with_index<R>(&self, f: impl FnOnce(&mut SheetIndex) -> R) -> R {
        let mut guard = self.index.lock().unwrap_or_else(|e| e.into_inner());
        f(guard.get_or_insert_with(SheetIndex::default))
    }

    fn is_loaded(&self) -> bool {
        self.index
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Re-read the whole sheet and rebuild the index. Caller holds `sheet_lock`.
    async fn reload(&self) -> Result<Vec<Grievance>> {
        let backend = self.backend.as_ref();
        if !self.header_checked.load(Ordering::Relaxed) {
            self.call("ensure_header", move |_| backend.ensure_header(&HEADER))
                .await?;
            self.header_checked.store(true, Ordering::Relaxed);
        }
        let rows = self.call("read_rows", move |_| backend.read_rows()).await?;
        let index = SheetIndex::from_rows(&rows);
        let records: Vec<Grievance> = index.records().cloned().collect();
        debug!(records = records.len(), "Reloaded sheet index");
        *self.index.lock().unwrap_or_else(|e| e.into_inner()) = Some(index);
        Ok(records)
    }

    /// Caller holds `sheet_lock`.
    async fn load_if_needed(&self) -> Result<()> {
        if !self.is_loaded() {
            self.reload().await?;
        }
        Ok(())
    }

    async fn ensure_loaded(&self) -> Result<()> {
        if self.is_loaded() {
            return Ok(());
        }
        let _guard = self.sheet_lock.lock().await;
        self.load_if_needed().await
    }

    /// Find a ticket's row and read it fresh. Falls back to a full reload when
    /// the ticket is unknown or its row no longer holds it (rows moved by
    /// hand). Caller holds `sheet_lock`.
    async fn locate(&self, ticket_id: &str) -> Result<Option<(usize, Grievance)>> {
        self.load_if_needed().await?;
        if let Some(row) = self.with_index(|i| i.row_of(ticket_id)) {
            let backend = self.backend.as_ref();
            let cells = self.call("read_row", move |_| backend.read_row(row)).await?;
            if let Some(cells) = cells {
                if cells.get(COL_TICKET).map(|c| c.trim()) == Some(ticket_id) {
                    let record = from_row(&cells).map_err(|reason| {
                        GrievanceError::PersistenceUnavailable {
                            attempts: 1,
                            message: format!("row {row} for {ticket_id} is malformed: {reason}"),
                        }
                    })?;
                    self.with_index(|i| i.upsert(row, record.clone()));
                    return Ok(Some((row, record)));
                }
            }
            debug!(ticket_id, row, "Indexed row moved, reloading");
        }

        self.reload().await?;
        Ok(self.with_index(|i| {
            i.row_of(ticket_id)
                .zip(i.get(ticket_id).cloned())
        }))
    }

    /// Append with a check for a previous attempt that landed before its
    /// response was lost, so a retried append never duplicates a row.
    async fn append(&self, record: &Grievance) -> Result<usize> {
        let backend = self.backend.as_ref();
        let limiter = &self.limiter;
        let values = to_row(record);
        let ticket = record.ticket_id.as_str();
        self.call("append_row", move |attempt| {
            let values = values.clone();
            async move {
                if attempt > 0 {
                    limiter.acquire().await;
                    let rows = backend.read_rows().await?;
                    let landed = rows
                        .iter()
                        .position(|r| r.get(COL_TICKET).map(|c| c.trim()) == Some(ticket));
                    if let Some(i) = landed {
                        return Ok(FIRST_DATA_ROW + i);
                    }
                }
                backend.append_row(values).await
            }
        })
        .await
    }
}

fn apply_patch(current: &Grievance, patch: GrievancePatch) -> Grievance {
    let mut next = current.clone();
    if let Some(description) = patch.description {
        next.description = description;
    }
    if let Some(location) = patch.location {
        next.location = Some(location);
    }
    if let Some(status) = patch.status {
        next.status = status;
    }
    next.updated_at = current.updated_at.max(patch.touched_at);
    next.version = current.version + 1;
    next
}

fn count_into(agg: &mut Aggregation, dimensions: &[GroupBy], g: &Grievance) {
    agg.total += 1;
    for &by in dimensions {
        *agg.groups
            .entry(by)
            .or_default()
            .entry(by.key_of(g))
            .or_insert(0) += 1;
    }
}

#[async_trait]
impl GrievanceStore for SheetStore {
    async fn get_by_ticket(&self, ticket_id: &str) -> Result<Option<Grievance>> {
        let _guard = self.sheet_lock.lock().await;
        Ok(self.locate(ticket_id).await?.map(|(_, g)| g))
    }

    async fn get_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Grievance>> {
        self.ensure_loaded().await?;
        Ok(self.with_index(|i| i.by_fingerprint(fingerprint).cloned()))
    }

    async fn candidates(&self, bucket: &str, since: DateTime<Utc>) -> Result<Vec<Grievance>> {
        self.ensure_loaded().await?;
        Ok(self.with_index(|i| i.candidates(bucket, since)))
    }

    async fn insert(&self, draft: GrievanceDraft, fingerprint: String) -> Result<Grievance> {
        if draft.description.trim().is_empty() {
            return Err(GrievanceError::Normalization(
                "description is required".to_string(),
            ));
        }

        let _guard = self.sheet_lock.lock().await;
        self.load_if_needed().await?;

        let ticket_id = loop {
            let candidate = generate_ticket_id(draft.source);
            if !self.with_index(|i| i.contains(&candidate)) {
                break candidate;
            }
        };

        let created_at = draft.reported_at.min(draft.observed_at);
        let record = Grievance {
            ticket_id,
            source: draft.source,
            source_ref: draft.source_ref,
            title: draft.title,
            description: draft.description,
            category: draft.category,
            location: draft.location,
            submitter: draft.submitter.filter(|s| !s.is_empty()),
            status: GrievanceStatus::New,
            fingerprint,
            created_at,
            updated_at: draft.observed_at,
            version: 1,
        };

        let row = self.append(&record).await?;
        self.with_index(|i| i.upsert(row, record.clone()));
        info!(
            ticket_id = %record.ticket_id,
            source = %record.source,
            row,
            "Created grievance"
        );
        Ok(record)
    }

    async fn update(
        &self,
        ticket_id: &str,
        expected_version: u64,
        patch: GrievancePatch,
    ) -> Result<Grievance> {
        let _guard = self.sheet_lock.lock().await;
        let (row, current) = self
            .locate(ticket_id)
            .await?
            .ok_or_else(|| GrievanceError::NotFound(ticket_id.to_string()))?;

        if current.version != expected_version {
            return Err(GrievanceError::VersionConflict {
                ticket_id: ticket_id.to_string(),
                expected: expected_version,
                actual: current.version,
            });
        }
        if current.status.is_terminal() {
            return Err(GrievanceError::TerminalRecord {
                ticket_id: ticket_id.to_string(),
                status: current.status,
            });
        }
        if let Some(next) = patch.status {
            current.check_transition(next)?;
        }

        let next = apply_patch(&current, patch);
        let backend = self.backend.as_ref();
        let values = to_row(&next);
        self.call("write_row", move |_| backend.write_row(row, values.clone()))
            .await?;
        self.with_index(|i| i.upsert(row, next.clone()));
        debug!(
            ticket_id,
            version = next.version,
            status = %next.status,
            "Updated grievance"
        );
        Ok(next)
    }

    async fn list(&self, filter: &ListFilter, page: PageRequest) -> Result<Page<Grievance>> {
        let page = PageRequest::new(page.offset, page.limit);
        let records = {
            let _guard = self.sheet_lock.lock().await;
            self.reload().await?
        };
        let matching: Vec<Grievance> = records.into_iter().filter(|g| filter.matches(g)).collect();
        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect();
        Ok(Page {
            items,
            total,
            offset: page.offset,
            limit: page.limit,
        })
    }

    async fn refresh(&self) -> Result<()> {
        let _guard = self.sheet_lock.lock().await;
        self.reload().await.map(|_| ())
    }

    async fn aggregate(&self, dimensions: &[GroupBy]) -> Result<Aggregation> {
        let records = {
            let _guard = self.sheet_lock.lock().await;
            self.reload().await?
        };
        let mut agg = Aggregation::default();
        for g in &records {
            count_into(&mut agg, dimensions, g);
        }
        Ok(agg)
    }
}
