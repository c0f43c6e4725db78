pub mod error;
pub mod session;
pub mod traits;
pub mod types;

pub use error::{HearthError, HearthResult};
pub use session::{OutboundSender, SessionStore, SharedSession, WorkingMemory};
pub use traits::{Embedder, FormSession, LlmProvider, LlmRequest, LlmResponse};
pub use types::{ChatTurn, FormState, MemoryKind, OutboundEvent, RecalledMemory, Speaker};
