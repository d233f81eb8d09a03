pub mod config;
pub mod error;
pub mod hashing;
pub mod raw;
pub mod types;

pub use config::{Config, DedupSettings, NamedEndpoint, ScrapeSettings, SheetsSettings, StoreSettings};
pub use error::{GrievanceError, Result};
pub use hashing::*;
pub use raw::*;
pub use types::*;
