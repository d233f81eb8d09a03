use std::sync::Arc;

use grievance_common::{GrievanceStats, GrievanceStatus, GroupBy, Result};
use grievance_store::GrievanceStore;

const DIMENSIONS: [GroupBy; 4] = [
    GroupBy::Status,
    GroupBy::Category,
    GroupBy::Source,
    GroupBy::Location,
];

/// Dashboard counts over the whole store.
#[derive(Clone)]
pub struct StatsAggregator {
    store: Arc<dyn GrievanceStore>,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn GrievanceStore>) -> Self {
        Self { store }
    }

    pub async fn stats(&self) -> Result<GrievanceStats> {
        let agg = self.store.aggregate(&DIMENSIONS).await?;
        let by_status = agg.group(GroupBy::Status);
        let count = |status: GrievanceStatus| by_status.get(&status.to_string()).copied().unwrap_or(0);

        let resolved = count(GrievanceStatus::Resolved) + count(GrievanceStatus::Closed);
        let rejected = count(GrievanceStatus::Rejected);

        Ok(GrievanceStats {
            total_grievances: agg.total,
            open_grievances: agg.total.saturating_sub(resolved + rejected),
            resolved_grievances: resolved,
            rejected_grievances: rejected,
            by_category: agg.group(GroupBy::Category),
            by_source: agg.group(GroupBy::Source),
            by_location: agg.group(GroupBy::Location),
            by_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::memory_store;
    use chrono::Utc;
    use grievance_common::{GrievanceDraft, GrievancePatch, Location, SourceKind};

    fn draft(title: &str, category: &str) -> GrievanceDraft {
        let now = Utc::now();
        GrievanceDraft {
            source: SourceKind::PortalScrape,
            source_ref: format!("portal/{title}"),
            title: title.to_string(),
            description: format!("{title} reported"),
            category: category.to_string(),
            location: Some(Location::place("Sector 17")),
            submitter: None,
            reported_at: now,
            observed_at: now,
        }
    }

    #[tokio::test]
    async fn empty_store_has_zero_counts() {
        let (store, _) = memory_store();
        let stats = StatsAggregator::new(store).stats().await.unwrap();
        assert_eq!(stats, GrievanceStats::default());
    }

    #[tokio::test]
    async fn open_excludes_resolved_closed_and_rejected() {
        let (store, _) = memory_store();
        let a = store.insert(draft("a", "roads"), "fa".into()).await.unwrap();
        let b = store.insert(draft("b", "roads"), "fb".into()).await.unwrap();
        store.insert(draft("c", "water"), "fc".into()).await.unwrap();

        store
            .update(&a.ticket_id, 1, GrievancePatch::status(GrievanceStatus::Rejected, Utc::now()))
            .await
            .unwrap();
        let mut version = 1;
        for next in [
            GrievanceStatus::Acknowledged,
            GrievanceStatus::InProgress,
            GrievanceStatus::Resolved,
        ] {
            let g = store
                .update(&b.ticket_id, version, GrievancePatch::status(next, Utc::now()))
                .await
                .unwrap();
            version = g.version;
        }

        let stats = StatsAggregator::new(store).stats().await.unwrap();
        assert_eq!(stats.total_grievances, 3);
        assert_eq!(stats.rejected_grievances, 1);
        assert_eq!(stats.resolved_grievances, 1);
        assert_eq!(stats.open_grievances, 1);
        assert_eq!(stats.by_category.get("roads"), Some(&2));
        assert_eq!(stats.by_source.get("portal_scrape"), Some(&3));
        assert_eq!(stats.by_location.get("Sector 17"), Some(&3));
        assert_eq!(stats.by_status.get("resolved"), Some(&1));
    }
}
