//! Memory tiers and their coordinator
//!
//! Three tiers back each user's memory: the short-term buffer, the durable
//! record store, and the semantic index. The coordinator owns ingestion
//! order, the summarization cadence, context assembly and cross-tier reset.

pub mod coordinator;
pub mod semantic;
pub mod short_term;
pub mod types;

pub use coordinator::{MemoryCoordinator, MemoryStats};
pub use semantic::{IndexBackend, SearchHit, SemanticIndex};
pub use short_term::ShortTermBuffer;
pub use types::{ChatMessage, Role, SemanticDocument, TurnMessage};
