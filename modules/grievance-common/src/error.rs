use thiserror::Error;

use crate::types::GrievanceStatus;

pub type Result<T> = std::result::Result<T, GrievanceError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GrievanceError {
    #[error("Source {adapter} unavailable: {message}")]
    SourceUnavailable { adapter: String, message: String },

    #[error("Source {adapter} changed format: {message}")]
    SourceFormatChanged { adapter: String, message: String },

    #[error("Normalization error: {0}")]
    Normalization(String),

    #[error("Version conflict on {ticket_id}: expected version {expected}, found {actual}")]
    VersionConflict {
        ticket_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Persistence unavailable after {attempts} attempt(s): {message}")]
    PersistenceUnavailable { attempts: u32, message: String },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: GrievanceStatus,
        to: GrievanceStatus,
    },

    #[error("Ticket {ticket_id} is already {status} and can no longer change")]
    TerminalRecord {
        ticket_id: String,
        status: GrievanceStatus,
    },

    #[error("Ticket not found: {0}")]
    NotFound(String),

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GrievanceError {
    /// Short, stable label for logs and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            GrievanceError::SourceUnavailable { .. } => "source_unavailable",
            GrievanceError::SourceFormatChanged { .. } => "source_format_changed",
            GrievanceError::Normalization(_) => "normalization",
            GrievanceError::VersionConflict { .. } => "version_conflict",
            GrievanceError::PersistenceUnavailable { .. } => "persistence_unavailable",
            GrievanceError::InvalidTransition { .. } => "invalid_transition",
            GrievanceError::TerminalRecord { .. } => "terminal_record",
            GrievanceError::NotFound(_) => "not_found",
            GrievanceError::UnknownSource(_) => "unknown_source",
            GrievanceError::Config(_) => "config",
        }
    }

    /// Errors a caller may clear by re-reading the record and reapplying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GrievanceError::VersionConflict { .. })
    }

    /// Adapter-level failures: fatal to one source's cycle, never to others.
    pub fn is_source_failure(&self) -> bool {
        matches!(
            self,
            GrievanceError::SourceUnavailable { .. } | GrievanceError::SourceFormatChanged { .. }
        )
    }
}
