//! `SessionStore` implementations for the agent execution core: an
//! in-memory store for tests and ephemeral hosts, and a JSONL-backed store
//! for durable, append-only step persistence.

pub mod in_memory;
pub mod jsonl;

pub use in_memory::InMemorySessionStore;
pub use jsonl::JsonlSessionStore;
