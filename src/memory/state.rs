//! Per-traveller aggregate state and its persisted shape.

use super::note::{MemoryNote, NoteCollection};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Free-form traveller preferences (insertion-ordered)
pub type Profile = serde_json::Map<String, Value>;

/// State shared between the window, the tools and the orchestrator
pub type SharedState = Arc<RwLock<TravelState>>;

const DEFAULT_STATE_JSON: &str = include_str!("default_state.json");

/// Whether session memory must be surfaced in the next turn's instructions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InjectionState {
    /// Nothing to surface
    #[default]
    Idle,
    /// A trim discarded history; surface session notes once
    Pending,
}

impl InjectionState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripHistory {
    #[serde(default)]
    pub trips: Vec<Value>,
}

/// Everything the concierge knows about one traveller.
///
/// Only the profile, both memory tiers and the trip history are persisted;
/// `injection` always starts out `Idle`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TravelState {
    pub profile: Profile,
    pub global_memory: NoteCollection,
    pub session_memory: NoteCollection,
    pub trip_history: TripHistory,
    pub injection: InjectionState,
}

/// On-disk shape: exactly four top-level keys
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub profile: Profile,
    pub global_memory: NoteCollection,
    pub session_memory: NoteCollection,
    pub trip_history: TripHistory,
}

impl TravelState {
    /// Sample state handed to travellers seen for the first time
    pub fn seeded() -> Self {
        match serde_json::from_str::<Value>(DEFAULT_STATE_JSON) {
            Ok(value) => Self::from_value(&value),
            Err(e) => {
                debug!("Seed state unreadable ({}), starting empty", e);
                Self::default()
            }
        }
    }

    /// Rebuild state from loosely-shaped JSON.
    ///
    /// Missing or malformed sections fall back to empty collections.
    pub fn from_value(value: &Value) -> Self {
        let profile = value
            .get("profile")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let trips = value
            .get("trip_history")
            .and_then(|t| t.get("trips"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Self {
            profile,
            global_memory: NoteCollection::from_value_lenient(value.get("global_memory")),
            session_memory: NoteCollection::from_value_lenient(value.get("session_memory")),
            trip_history: TripHistory { trips },
            injection: InjectionState::Idle,
        }
    }

    pub fn to_persisted(&self) -> PersistedState {
        PersistedState {
            profile: self.profile.clone(),
            global_memory: self.global_memory.clone(),
            session_memory: self.session_memory.clone(),
            trip_history: self.trip_history.clone(),
        }
    }

    pub fn from_persisted(persisted: PersistedState) -> Self {
        Self {
            profile: persisted.profile,
            global_memory: persisted.global_memory,
            session_memory: persisted.session_memory,
            trip_history: persisted.trip_history,
            injection: InjectionState::Idle,
        }
    }

    /// Stage a note in session memory. Global memory is only written by
    /// consolidation.
    pub fn save_note<'a>(
        &mut self,
        text: &str,
        keywords: impl IntoIterator<Item = &'a str>,
    ) -> Option<&MemoryNote> {
        let note = MemoryNote::capture(text, keywords)?;
        self.session_memory.push(note);
        self.session_memory.notes.last()
    }

    /// Flag that the conversation window discarded history
    pub fn mark_trimmed(&mut self) {
        self.injection = InjectionState::Pending;
    }

    pub fn into_shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }
}
