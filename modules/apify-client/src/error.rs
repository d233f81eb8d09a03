use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApifyError>;

#[derive(Debug, Error)]
pub enum ApifyError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Run {run_id} ended with status {status}")]
    RunFailed { run_id: String, status: String },
}

impl ApifyError {
    /// Failures that may clear on a later attempt (network, throttling, 5xx).
    pub fn is_transient(&self) -> bool {
        match self {
            ApifyError::Network(_) => true,
            ApifyError::Api { status, .. } => *status == 429 || *status >= 500,
            ApifyError::Parse(_) | ApifyError::RunFailed { .. } => false,
        }
    }
}

impl From<reqwest::Error> for ApifyError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApifyError::Parse(err.to_string())
        } else {
            ApifyError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApifyError {
    fn from(err: serde_json::Error) -> Self {
        ApifyError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttling_and_server_errors_are_transient() {
        assert!(ApifyError::Api { status: 429, message: String::new() }.is_transient());
        assert!(ApifyError::Api { status: 503, message: String::new() }.is_transient());
        assert!(!ApifyError::Api { status: 401, message: String::new() }.is_transient());
        assert!(!ApifyError::Parse("bad".into()).is_transient());
    }
}
