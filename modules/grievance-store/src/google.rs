use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::row::LAST_COLUMN;
use crate::sheet::{Row, SheetBackend, SheetError, FIRST_DATA_ROW};

const BASE_URL: &str = "https://sheets.googleapis.com/v4";

/// Matches the first row number in an A1 range such as `Grievances!A7:O7`.
static UPDATED_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"![A-Z]+(\d+)").expect("range pattern is valid")
});

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendResponse {
    updates: AppendUpdates,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppendUpdates {
    updated_range: String,
}

/// Google Sheets v4 `values` API over one tab. The access token is an opaque
/// bearer credential; acquiring and refreshing it happens elsewhere.
pub struct GoogleSheetsBackend {
    client: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    tab: String,
    access_token: String,
}

impl GoogleSheetsBackend {
    pub fn new(
        spreadsheet_id: impl Into<String>,
        tab: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, SheetError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SheetError::Permanent {
                status: 0,
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            tab: tab.into(),
            access_token: access_token.into(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// A1 range on this tab; the tab name is always quoted.
    fn range(&self, cells: &str) -> String {
        format!("'{}'!{}", self.tab.replace('\'', "''"), cells)
    }

    /// `{base}/spreadsheets/{id}/values/{range}{suffix}` with the range
    /// percent-encoded as one path segment.
    fn values_url(&self, range: &str, suffix: &str) -> Result<Url, SheetError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SheetError::Malformed(format!("bad base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| SheetError::Malformed("base url cannot hold a path".into()))?
            .extend(["spreadsheets", self.spreadsheet_id.as_str(), "values"])
            .push(&format!("{range}{suffix}"));
        Ok(url)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, SheetError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(SheetError::from_status(status.as_u16(), body))
    }

    async fn get_range(&self, range: &str) -> Result<Vec<Row>, SheetError> {
        let url = self.values_url(range, "")?;
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .query(&[("valueRenderOption", "UNFORMATTED_VALUE")])
            .send()
            .await?;
        let body: ValueRange = Self::check(resp).await?.json().await?;
        Ok(body.values.into_iter().map(cells_to_row).collect())
    }

    async fn put_range(&self, range: &str, values: Row) -> Result<(), SheetError> {
        let url = self.values_url(range, "")?;
        let resp = self
            .client
            .put(url)
            .bearer_auth(&self.access_token)
            .query(&[("valueInputOption", "RAW")])
            .json(&json!({
                "range": range,
                "majorDimension": "ROWS",
                "values": [values],
            }))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}

/// Sheets returns numbers and booleans unquoted under UNFORMATTED_VALUE.
fn cells_to_row(cells: Vec<serde_json::Value>) -> Row {
    cells
        .into_iter()
        .map(|cell| match cell {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        })
        .collect()
}

fn parse_updated_row(range: &str) -> Result<usize, SheetError> {
    UPDATED_ROW
        .captures(range)
        .and_then(|caps| caps[1].parse().ok())
        .ok_or_else(|| SheetError::Malformed(format!("unexpected updated range: {range}")))
}

#[async_trait]
impl SheetBackend for GoogleSheetsBackend {
    async fn ensure_header(&self, header: &[&str]) -> Result<(), SheetError> {
        let range = self.range(&format!("A1:{LAST_COLUMN}1"));
        let existing = self.get_range(&range).await?;
        if existing.first().is_some_and(|row| !row.is_empty()) {
            return Ok(());
        }
        info!(tab = %self.tab, "Writing header row to empty sheet");
        self.put_range(&range, header.iter().map(|h| h.to_string()).collect())
            .await
    }

    async fn read_rows(&self) -> Result<Vec<Row>, SheetError> {
        let range = self.range(&format!("A{FIRST_DATA_ROW}:{LAST_COLUMN}"));
        let rows = self.get_range(&range).await?;
        debug!(tab = %self.tab, rows = rows.len(), "Read sheet");
        Ok(rows)
    }

    async fn read_row(&self, row: usize) -> Result<Option<Row>, SheetError> {
        let range = self.range(&format!("A{row}:{LAST_COLUMN}{row}"));
        Ok(self.get_range(&range).await?.into_iter().next())
    }

    async fn append_row(&self, values: Row) -> Result<usize, SheetError> {
        let range = self.range(&format!("A:{LAST_COLUMN}"));
        let url = self.values_url(&range, ":append")?;
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .json(&json!({ "values": [values] }))
            .send()
            .await?;
        let body: AppendResponse = Self::check(resp).await?.json().await?;
        parse_updated_row(&body.updates.updated_range)
    }

    async fn write_row(&self, row: usize, values: Row) -> Result<(), SheetError> {
        if row < FIRST_DATA_ROW {
            return Err(SheetError::Permanent {
                status: 400,
                message: format!("row {row} is outside the data range"),
            });
        }
        let range = self.range(&format!("A{row}:{LAST_COLUMN}{row}"));
        self.put_range(&range, values).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updated_range_yields_row_number() {
        assert_eq!(parse_updated_row("Grievances!A7:O7").unwrap(), 7);
        assert_eq!(parse_updated_row("'My Tab'!A12:O12").unwrap(), 12);
        assert!(parse_updated_row("garbage").is_err());
    }

    #[test]
    fn values_url_encodes_range_as_one_segment() {
        let backend = GoogleSheetsBackend::new("sheet-id", "My Tab", "token").unwrap();
        let url = backend
            .values_url(&backend.range("A1:O1"), ":append")
            .unwrap();
        assert!(url
            .as_str()
            .starts_with("https://sheets.googleapis.com/v4/spreadsheets/sheet-id/values/"));
        assert!(url.as_str().contains("My%20Tab"));
        assert!(url.as_str().ends_with("!A1:O1:append"));
    }

    #[test]
    fn unformatted_numbers_become_strings() {
        let row = cells_to_row(vec![
            serde_json::json!("CS0001"),
            serde_json::json!(3),
            serde_json::Value::Null,
        ]);
        assert_eq!(row, vec!["CS0001".to_string(), "3".to_string(), String::new()]);
    }
}
