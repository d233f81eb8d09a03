use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use grievance_common::{PortalEntry, RawRecord, Result, SourceKind};
use serde::Deserialize;
use tracing::info;

use super::{format_changed, get_text, SourceAdapter, SourceBatch};

/// One page of a portal's JSON listing.
#[derive(Debug, Deserialize)]
struct PortalPage {
    #[serde(default)]
    items: Vec<PortalItem>,
    /// Absolute or page-relative URL of the next page.
    #[serde(default)]
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PortalItem {
    #[serde(default, alias = "complaint_id", alias = "complaintId")]
    id: Option<serde_json::Value>,
    #[serde(default, alias = "subject", alias = "heading")]
    title: Option<String>,
    #[serde(default, alias = "description", alias = "body")]
    details: Option<String>,
    #[serde(default, alias = "category")]
    department: Option<String>,
    #[serde(default, alias = "location", alias = "ward")]
    area: Option<String>,
    #[serde(default, alias = "date", alias = "created_at")]
    filed_at: Option<String>,
}

/// Paginated JSON grievance portal (`{"items": [...], "next": "..."}`).
/// The cursor is the URL of the page to fetch.
pub struct PortalScraper {
    client: reqwest::Client,
    name: String,
    url: String,
}

impl PortalScraper {
    pub fn new(client: reqwest::Client, name: String, url: String) -> Self {
        Self { client, name, url }
    }
}

fn parse_filed_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}

fn id_text(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Decode a page body. `page_url` resolves relative `next` links.
pub fn parse_portal_page(
    portal: &str,
    page_url: &str,
    body: &str,
) -> std::result::Result<SourceBatch, String> {
    let page: PortalPage = serde_json::from_str(body).map_err(|e| e.to_string())?;

    let next_cursor = match page.next.filter(|n| !n.trim().is_empty()) {
        Some(next) => {
            let base = url::Url::parse(page_url).map_err(|e| e.to_string())?;
            Some(base.join(&next).map_err(|e| e.to_string())?.to_string())
        }
        None => None,
    };

    let records = page
        .items
        .into_iter()
        .map(|item| {
            RawRecord::Portal(PortalEntry {
                portal: portal.to_string(),
                complaint_id: item.id.and_then(id_text),
                title: item.title,
                details: item.details.unwrap_or_default(),
                department: item.department,
                area: item.area,
                filed_at: item.filed_at.as_deref().and_then(parse_filed_at),
            })
        })
        .collect();

    Ok(SourceBatch {
        records,
        next_cursor,
    })
}

#[async_trait]
impl SourceAdapter for PortalScraper {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::PortalScrape
    }

    async fn fetch(&self, cursor: Option<&str>) -> Result<SourceBatch> {
        let page_url = cursor.unwrap_or(&self.url);
        let body = get_text(&self.client, &self.name, page_url).await?;
        let batch =
            parse_portal_page(&self.name, page_url, &body).map_err(|e| format_changed(&self.name, e))?;
        info!(
            source = %self.name,
            url = page_url,
            entries = batch.records.len(),
            has_next = batch.next_cursor.is_some(),
            "Fetched portal page"
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_maps_items_and_resolves_next_link() {
        let body = r#"{
            "items": [
                {"id": 4411, "subject": "Drain blocked", "description": "Storm drain blocked on 5th Cross",
                 "category": "Sanitation", "ward": "Ward 12", "date": "2024-06-01"},
                {"complaint_id": "PG-77", "details": "Water supply irregular"}
            ],
            "next": "?page=2"
        }"#;
        let batch = parse_portal_page("CPGRAMS", "https://portal.example/api/complaints", body).unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(
            batch.next_cursor.as_deref(),
            Some("https://portal.example/api/complaints?page=2")
        );
        let RawRecord::Portal(first) = &batch.records[0] else {
            panic!("expected portal record");
        };
        assert_eq!(first.complaint_id.as_deref(), Some("4411"));
        assert_eq!(first.title.as_deref(), Some("Drain blocked"));
        assert_eq!(first.department.as_deref(), Some("Sanitation"));
        assert_eq!(first.area.as_deref(), Some("Ward 12"));
        assert!(first.filed_at.is_some());
    }

    #[test]
    fn last_page_has_no_cursor() {
        let batch = parse_portal_page("P", "https://p.example", r#"{"items": [], "next": null}"#).unwrap();
        assert!(batch.records.is_empty());
        assert_eq!(batch.next_cursor, None);
    }

    #[test]
    fn html_body_is_a_format_change() {
        assert!(parse_portal_page("P", "https://p.example", "<html>maintenance</html>").is_err());
    }
}
