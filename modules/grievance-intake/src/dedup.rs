//! Fingerprinting and the create/update/absorb decision for incoming drafts.

use std::sync::Arc;

use grievance_common::{
    bucket_key, content_hash, location_key, normalize_text, stable_hash, title_tokens,
    token_overlap, DedupSettings, Grievance, GrievanceDraft, GrievancePatch, Result, SourceKind,
};
use grievance_store::GrievanceStore;
use tracing::debug;

/// What to do with one normalized draft.
#[derive(Debug, Clone, PartialEq)]
pub enum DedupVerdict {
    /// No live match: insert a new ticket.
    Create,
    /// Merge into an existing ticket with an optimistic version check.
    Update {
        ticket_id: String,
        expected_version: u64,
        patch: GrievancePatch,
        similarity: f64,
    },
    /// Already recorded and nothing to write: a double-submit, or a record
    /// that has reached a terminal status.
    Absorb { ticket_id: String },
}

impl DedupVerdict {
    pub fn ticket_id(&self) -> Option<&str> {
        match self {
            DedupVerdict::Create => None,
            DedupVerdict::Update { ticket_id, .. } | DedupVerdict::Absorb { ticket_id } => {
                Some(ticket_id)
            }
        }
    }
}

/// Persisted dedup key for a draft.
///
/// - Scraped with `source_ref`: the source identity itself.
/// - Scraped without: category, location and title tokens.
/// - Citizen submissions: description content plus whoever submitted it.
pub fn fingerprint(draft: &GrievanceDraft) -> String {
    let source = draft.source.to_string();
    match draft.source {
        SourceKind::UserSubmission => {
            let submitter = draft
                .submitter
                .as_ref()
                .map(|s| {
                    [&s.email, &s.phone, &s.name]
                        .into_iter()
                        .map(|v| v.as_deref().map(normalize_text).unwrap_or_default())
                        .collect::<Vec<_>>()
                        .join("|")
                })
                .unwrap_or_default();
            stable_hash(&["user", &content_hash(&draft.description), &submitter])
        }
        _ if draft.has_source_ref() => stable_hash(&["ref", &source, draft.source_ref.trim()]),
        _ => {
            let tokens = title_tokens(&draft.title)
                .into_iter()
                .collect::<Vec<_>>()
                .join(" ");
            stable_hash(&[
                "near",
                &normalize_text(&draft.category),
                &location_key(draft.location.as_ref()),
                &tokens,
            ])
        }
    }
}

/// Pure decision over what the store returned for this draft.
///
/// `exact` is the newest record sharing the draft's fingerprint. `candidates`
/// are live records from the draft's `(category, location)` bucket, newest
/// first; they are only consulted for scraped drafts without a `source_ref`.
pub fn dedup_verdict(
    draft: &GrievanceDraft,
    exact: Option<&Grievance>,
    candidates: &[Grievance],
    settings: &DedupSettings,
) -> DedupVerdict {
    if draft.source == SourceKind::UserSubmission {
        return match exact {
            Some(existing)
                if existing.source == SourceKind::UserSubmission
                    && draft.observed_at - existing.created_at <= settings.submission_window =>
            {
                DedupVerdict::Absorb {
                    ticket_id: existing.ticket_id.clone(),
                }
            }
            _ => DedupVerdict::Create,
        };
    }

    let horizon_start = draft.observed_at - settings.horizon;
    if let Some(existing) = exact.filter(|e| e.updated_at >= horizon_start) {
        if existing.status.is_terminal() {
            return DedupVerdict::Absorb {
                ticket_id: existing.ticket_id.clone(),
            };
        }
        let patch = if draft.has_source_ref() {
            refresh_patch(existing, draft)
        } else {
            GrievancePatch::touch(draft.observed_at)
        };
        return DedupVerdict::Update {
            ticket_id: existing.ticket_id.clone(),
            expected_version: existing.version,
            patch,
            similarity: 1.0,
        };
    }

    if draft.has_source_ref() {
        return DedupVerdict::Create;
    }

    let tokens = title_tokens(&draft.title);
    let mut best: Option<(&Grievance, f64)> = None;
    for candidate in candidates {
        if candidate.status.is_terminal() || candidate.updated_at < horizon_start {
            continue;
        }
        let similarity = token_overlap(&tokens, &title_tokens(&candidate.title));
        if similarity >= settings.similarity_threshold
            && best.map_or(true, |(_, s)| similarity > s)
        {
            best = Some((candidate, similarity));
        }
    }

    match best {
        Some((existing, similarity)) => DedupVerdict::Update {
            ticket_id: existing.ticket_id.clone(),
            expected_version: existing.version,
            patch: GrievancePatch::touch(draft.observed_at),
            similarity,
        },
        None => DedupVerdict::Create,
    }
}

/// Exact re-scrape: take the latest description and fill a missing location.
fn refresh_patch(existing: &Grievance, draft: &GrievanceDraft) -> GrievancePatch {
    GrievancePatch {
        description: (existing.description != draft.description)
            .then(|| draft.description.clone()),
        location: if existing.location.is_none() {
            draft.location.clone()
        } else {
            None
        },
        status: None,
        touched_at: draft.observed_at,
    }
}

/// Store-backed dedup: looks up exact and bucket matches, then decides.
#[derive(Clone)]
pub struct Deduplicator {
    store: Arc<dyn GrievanceStore>,
    settings: DedupSettings,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn GrievanceStore>, settings: DedupSettings) -> Self {
        Self { store, settings }
    }

    /// Fingerprint the draft and decide what to do with it.
    pub async fn resolve(&self, draft: &GrievanceDraft) -> Result<(String, DedupVerdict)> {
        let fp = fingerprint(draft);
        let exact = self.store.get_by_fingerprint(&fp).await?;

        let candidates = if draft.source.is_scraped() && !draft.has_source_ref() {
            let bucket = bucket_key(&draft.category, draft.location.as_ref());
            self.store
                .candidates(&bucket, draft.observed_at - self.settings.horizon)
                .await?
        } else {
            Vec::new()
        };

        let verdict = dedup_verdict(draft, exact.as_ref(), &candidates, &self.settings);
        debug!(
            source = %draft.source,
            candidates = candidates.len(),
            verdict = ?verdict,
            "Dedup verdict"
        );
        Ok((fp, verdict))
    }
}
