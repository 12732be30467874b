//! Interactive chat session for one traveller
//!
//! Owns the traveller's shared state, the conversation window and the agent,
//! dispatches REPL commands, and persists state after every change.

use crate::commands::{help_text, Command, MemoryTier, SlashCommand};
use crate::concierge_agent::ConciergeAgent;
use crate::memory::{
    render_frontmatter, ConsolidationOutcome, Consolidator, ConversationWindow, MemoryNote,
    NoteMerger, SharedState, StateStore,
};
use crate::Result;
use std::sync::Arc;
use tracing::{error, info};

/// What the REPL should do after handling a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Quit(String),
}

pub struct ChatSession {
    user_id: String,
    store: StateStore,
    state: SharedState,
    window: ConversationWindow,
    agent: ConciergeAgent,
    merger: Arc<dyn NoteMerger>,
}

impl ChatSession {
    pub fn new(
        user_id: impl Into<String>,
        store: StateStore,
        state: SharedState,
        window: ConversationWindow,
        agent: ConciergeAgent,
        merger: Arc<dyn NoteMerger>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            store,
            state,
            window,
            agent,
            merger,
        }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn window(&self) -> &ConversationWindow {
        &self.window
    }

    pub async fn handle(&self, command: Command) -> Reply {
        match command {
            Command::Chat(input) => Reply::Text(self.chat(&input).await),
            Command::Help => Reply::Text(help_text()),
            Command::Memory => Reply::Text(self.describe_memory().await),
            Command::Remember(text) => Reply::Text(self.remember(&text).await),
            Command::Forget { tier, index } => Reply::Text(self.forget(tier, index).await),
            Command::Consolidate => Reply::Text(self.consolidate().await),
            Command::Clear => {
                self.window.clear().await;
                Reply::Text("Conversation cleared. Memory is unchanged.".to_string())
            }
            Command::Undo => Reply::Text(self.undo().await),
            Command::Save => match self.save().await {
                Ok(()) => Reply::Text("Saved.".to_string()),
                Err(e) => Reply::Text(format!("Save failed: {}", e)),
            },
            Command::Quit => {
                self.persist().await;
                Reply::Quit("Goodbye!".to_string())
            }
            Command::Usage(cmd) => Reply::Text(format!("Usage: {}", cmd.description())),
            Command::Unknown(name) => Reply::Text(format!(
                "Unknown command /{}. Try {}.",
                name,
                SlashCommand::Help
            )),
        }
    }

    /// Run a turn and persist. Failures become an apology instead of an error.
    pub async fn chat(&self, input: &str) -> String {
        let reply = match self.agent.run_turn(&self.state, &self.window, input).await {
            Ok(text) => text,
            Err(e) => {
                error!("Turn failed for user {}: {}", self.user_id, e);
                format!("Sorry, I encountered an error: {}", e)
            }
        };
        self.persist().await;
        reply
    }

    pub async fn save(&self) -> Result<()> {
        let state = self.state.read().await;
        self.store.save(&self.user_id, &state).await
    }

    /// Save, logging instead of propagating failures
    async fn persist(&self) {
        if let Err(e) = self.save().await {
            error!("Failed to save state for user {}: {}", self.user_id, e);
        }
    }

    async fn consolidate(&self) -> String {
        let outcome = {
            let mut state = self.state.write().await;
            Consolidator::consolidate(&mut state, self.merger.as_ref()).await
        };
        self.persist().await;

        match outcome {
            ConsolidationOutcome::Skipped => "No session notes to consolidate.".to_string(),
            ConsolidationOutcome::Merged { before, after } => {
                format!("Consolidated {} notes into {} long-term notes.", before, after)
            }
            ConsolidationOutcome::FellBack { reason } => format!(
                "Merge failed ({}); session notes were appended to long-term memory as-is.",
                reason
            ),
        }
    }

    async fn remember(&self, text: &str) -> String {
        let note = MemoryNote::capture(text, std::iter::empty());
        let reply = match note {
            Some(note) => {
                self.state.write().await.global_memory.push(note);
                info!("Added long-term note for user {}", self.user_id);
                "Remembered.".to_string()
            }
            None => "Nothing to remember.".to_string(),
        };
        self.persist().await;
        reply
    }

    async fn forget(&self, tier: MemoryTier, index: usize) -> String {
        let removed = {
            let mut state = self.state.write().await;
            let notes = match tier {
                MemoryTier::Global => &mut state.global_memory,
                MemoryTier::Session => &mut state.session_memory,
            };
            index.checked_sub(1).and_then(|i| notes.remove(i))
        };

        match removed {
            Some(note) => {
                self.persist().await;
                format!("Forgot {} note: {}", tier, note.text)
            }
            None => format!("No {} note #{}.", tier, index),
        }
    }

    /// Drop entries until the most recent user message is gone
    async fn undo(&self) -> String {
        let mut removed = 0;
        while let Some(entry) = self.window.pop_last().await {
            removed += 1;
            if entry.is_user() {
                return format!("Removed the last exchange ({} entries).", removed);
            }
        }
        if removed == 0 {
            "Nothing to undo.".to_string()
        } else {
            format!("Removed {} entries.", removed)
        }
    }

    async fn describe_memory(&self) -> String {
        let state = self.state.read().await;
        let mut out = String::new();
        out.push_str(&render_frontmatter(&state.profile));

        out.push_str("\n\nGlobal notes:\n");
        push_numbered(&mut out, state.global_memory.as_slice());
        out.push_str("\nSession notes:\n");
        push_numbered(&mut out, state.session_memory.as_slice());
        out.push_str(&format!(
            "\nTrips on record: {}",
            state.trip_history.trips.len()
        ));
        out
    }
}

fn push_numbered(out: &mut String, notes: &[MemoryNote]) {
    if notes.is_empty() {
        out.push_str("  (none)\n");
        return;
    }
    for (i, note) in notes.iter().enumerate() {
        out.push_str(&format!(
            "  {}. [{}] {}",
            i + 1,
            note.last_update_date,
            note.text
        ));
        if !note.keywords.is_empty() {
            out.push_str(&format!(" ({})", note.keywords.join(", ")));
        }
        out.push('\n');
    }
}
