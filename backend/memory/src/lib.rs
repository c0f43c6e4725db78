//! Memory for Hearth: vector collections, the procedural trigger index kept in
//! step with the plugin registry, and recall into a session's working memory.

pub mod procedural;
pub mod recall;
pub mod store;
pub mod types;

pub use procedural::ProcedureIndex;
pub use recall::{Document, MemoryCollections, MemoryRecall, RecallConfig, RecallConfigs};
pub use store::{InMemoryVectorStore, MemoryStore};
pub use types::{MemoryQuery, SearchResult, VectorEntry};
