pub mod lance;
pub mod record;

pub use lance::DocumentStore;
pub use record::{HistoryEntry, RecordStore, UserInfo};
