//! Session-scoped chat state: turns, storage backends, the conversation
//! store and the feedback log.

pub mod backend;
pub mod feedback;
pub mod store;
pub mod turn;

pub use backend::{FileHistoryBackend, HistoryBackend, MemoryHistoryBackend, PayloadMap, StoreFuture};
pub use feedback::{FeedbackEntry, FeedbackLog};
pub use store::{ConversationStore, DisplayMessage, is_tool_directive};
pub use turn::{Role, Turn, TurnContent, TurnKind};
