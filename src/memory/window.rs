//! Bounded conversation window
//!
//! Keeps the entries of the most recent `max_turns` user turns. Cuts always
//! land on a user message, so tool calls and their results stay together.
//! Whenever an append discards history, the owning state is flagged so the
//! next turn re-surfaces session memory.

use super::state::SharedState;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// One entry of the conversation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEntry {
    /// Traveller message
    User { content: String },
    /// Final assistant reply
    Assistant { content: String },
    /// Capability invocation requested by the model
    ToolCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    /// Output of a capability invocation
    ToolResult { call_id: String, output: String },
}

impl ConversationEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Self::User { .. })
    }
}

/// Keep everything from the `max_turns`-th most recent user message onward.
///
/// With fewer than `max_turns` user messages nothing is cut.
pub fn trim_to_last_turns(items: &[ConversationEntry], max_turns: usize) -> &[ConversationEntry] {
    let mut count = 0;
    for (i, item) in items.iter().enumerate().rev() {
        if item.is_user() {
            count += 1;
            if count == max_turns {
                return &items[i..];
            }
        }
    }
    items
}

/// Turn-bounded history for one traveller's chat.
///
/// All operations are serialized by one lock so trimming always sees a
/// consistent buffer.
pub struct ConversationWindow {
    session_id: String,
    state: SharedState,
    max_turns: usize,
    items: Mutex<Vec<ConversationEntry>>,
}

impl ConversationWindow {
    pub fn new(session_id: impl Into<String>, state: SharedState, max_turns: usize) -> Self {
        Self {
            session_id: session_id.into(),
            state,
            max_turns: max_turns.max(1),
            items: Mutex::new(Vec::new()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Trimmed history, optionally limited to the last `limit` entries
    pub async fn read(&self, limit: Option<usize>) -> Vec<ConversationEntry> {
        let items = self.items.lock().await;
        let trimmed = trim_to_last_turns(&items, self.max_turns);
        let start = match limit {
            Some(limit) => trimmed.len().saturating_sub(limit),
            None => 0,
        };
        trimmed[start..].to_vec()
    }

    /// Append entries, trim, and flag the state if anything was discarded.
    ///
    /// Returns the number of entries dropped. The caller must not hold the
    /// state lock.
    pub async fn append(&self, entries: Vec<ConversationEntry>) -> usize {
        if entries.is_empty() {
            return 0;
        }

        let mut items = self.items.lock().await;
        items.extend(entries);
        let original_len = items.len();
        let kept = trim_to_last_turns(&items, self.max_turns).len();
        let dropped = original_len - kept;

        if dropped > 0 {
            self.state.write().await.mark_trimmed();
            items.drain(..dropped);
            info!(
                "Trimmed {} entries from window '{}' (keeping last {} user turns)",
                dropped, self.session_id, self.max_turns
            );
        }

        dropped
    }

    /// Remove and return the most recent entry
    pub async fn pop_last(&self) -> Option<ConversationEntry> {
        self.items.lock().await.pop()
    }

    pub async fn clear(&self) {
        self.items.lock().await.clear();
        debug!("Cleared window '{}'", self.session_id);
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}
