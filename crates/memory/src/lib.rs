//! Conversation memory: an append-only short-term turn log and an
//! upsert-by-user long-term summary row (§3, §6). Scoped down from a
//! fuller memory subsystem to exactly the two operations the orchestrator's
//! contract names — see DESIGN.md's Open Question decision on this crate.

pub mod store;

pub use store::{ConversationTurn, JsonlMemoryStore, MemoryStore, TurnRole};
