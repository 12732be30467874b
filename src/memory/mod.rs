//! Memory module for Concierge
//!
//! Provides the two-tier note store, prompt rendering, the bounded
//! conversation window, consolidation, and persistent storage.

mod consolidate;
mod note;
mod render;
mod state;
mod store;
mod window;

pub use consolidate::{
    ConsolidationOutcome, Consolidator, NoteMerger, CONSOLIDATION_PROMPT,
};
pub use note::{normalize_keywords, today_utc, MemoryNote, NoteCollection, MAX_KEYWORDS};
pub use render::{
    render_frontmatter, render_global_memories_md, render_session_memories_md,
    DEFAULT_GLOBAL_K, DEFAULT_SESSION_K, EMPTY_PLACEHOLDER,
};
pub use state::{InjectionState, PersistedState, Profile, SharedState, TravelState, TripHistory};
pub use store::StateStore;
pub use window::{trim_to_last_turns, ConversationEntry, ConversationWindow};
