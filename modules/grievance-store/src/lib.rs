pub mod google;
pub mod index;
pub mod limiter;
pub mod memory;
pub mod retry;
pub mod row;
pub mod sheet;
pub mod store;

pub use google::GoogleSheetsBackend;
pub use limiter::StoreRateLimiter;
pub use memory::MemorySheet;
pub use retry::RetryPolicy;
pub use sheet::{Row, SheetBackend, SheetError};
pub use store::{generate_ticket_id, Aggregation, GrievanceStore, SheetStore};
