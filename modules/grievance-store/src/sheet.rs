use async_trait::async_trait;
use thiserror::Error;

/// One spreadsheet row as cell strings. Trailing empty cells may be missing.
pub type Row = Vec<String>;

/// Sheet row number of the first data row (row 1 holds the header).
pub const FIRST_DATA_ROW: usize = 2;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SheetError {
    /// Worth retrying: throttling, 5xx, dropped connections.
    #[error("transient backend failure{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Transient { status: Option<u16>, message: String },

    #[error("backend rejected request (status {status}): {message}")]
    Permanent { status: u16, message: String },

    #[error("malformed backend response: {0}")]
    Malformed(String),
}

impl SheetError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SheetError::Transient { .. })
    }

    /// Classify an HTTP status: 429 and 5xx are retryable.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        if status == 429 || status >= 500 {
            SheetError::Transient {
                status: Some(status),
                message: message.into(),
            }
        } else {
            SheetError::Permanent {
                status,
                message: message.into(),
            }
        }
    }
}

impl From<reqwest::Error> for SheetError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return SheetError::Malformed(err.to_string());
        }
        match err.status() {
            Some(status) => SheetError::from_status(status.as_u16(), err.to_string()),
            None => SheetError::Transient {
                status: None,
                message: err.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for SheetError {
    fn from(err: serde_json::Error) -> Self {
        SheetError::Malformed(err.to_string())
    }
}

/// Raw row access to one spreadsheet tab. No retries or rate limiting here;
/// `SheetStore` wraps every call with both.
///
/// Row numbers are the sheet's own 1-based numbers, so data starts at
/// [`FIRST_DATA_ROW`].
#[async_trait]
pub trait SheetBackend: Send + Sync {
    /// Write the header into row 1 if the tab is empty.
    async fn ensure_header(&self, header: &[&str]) -> Result<(), SheetError>;

    /// All data rows in sheet order. Index `i` is row `FIRST_DATA_ROW + i`.
    async fn read_rows(&self) -> Result<Vec<Row>, SheetError>;

    /// A single data row, or `None` past the end of the sheet.
    async fn read_row(&self, row: usize) -> Result<Option<Row>, SheetError>;

    /// Append a row in one request, returning the row number it landed on.
    async fn append_row(&self, values: Row) -> Result<usize, SheetError>;

    /// Overwrite a whole row in one request.
    async fn write_row(&self, row: usize, values: Row) -> Result<(), SheetError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(SheetError::from_status(429, "slow down").is_transient());
        assert!(SheetError::from_status(502, "bad gateway").is_transient());
        assert!(!SheetError::from_status(403, "forbidden").is_transient());
    }

    #[test]
    fn transient_display_includes_status_when_known() {
        let err = SheetError::from_status(503, "unavailable");
        assert_eq!(
            err.to_string(),
            "transient backend failure (status 503): unavailable"
        );
        let err = SheetError::Transient {
            status: None,
            message: "connection reset".into(),
        };
        assert_eq!(err.to_string(), "transient backend failure: connection reset");
    }
}
