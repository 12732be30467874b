//! Memory consolidation: merge staged session notes into global memory.
//!
//! The merge itself is delegated to an LLM through [`NoteMerger`]:
//!   1. Serialize both tiers into the consolidation prompt
//!   2. Ask the merger for an updated global list (strict JSON array)
//!   3. Replace global notes with the parsed list, or fall back to the plain
//!      union `global + session` when the reply is unusable
//!   4. Clear session notes, on every path

use super::note::MemoryNote;
use super::state::TravelState;
use crate::Result;
use async_trait::async_trait;
use tracing::{info, warn};

/// Policy sent with every consolidation request
pub const CONSOLIDATION_PROMPT: &str = r#"You are consolidating travel memory notes into LONG-TERM (GLOBAL) memory.

You will receive two JSON arrays:
- GLOBAL_NOTES: existing long-term notes
- SESSION_NOTES: new notes captured during this run

GOAL
Produce an updated GLOBAL_NOTES list by merging in SESSION_NOTES.

RULES
1) Keep only durable information (preferences, stable constraints, memberships, long-lived habits).
2) Drop session-only / ephemeral notes. DO NOT add notes with phrases like "this time", "this trip", "for this booking".
3) De-duplicate: remove exact and near-duplicates, keep a single canonical version.
4) Conflict resolution: if two notes conflict, keep the one with the most recent last_update_date.
5) Keep each note short (1 sentence), specific, and durable.
6) Do NOT invent new facts.

OUTPUT FORMAT (STRICT)
Return ONLY a valid JSON array.
Each element MUST be an object with EXACTLY these keys:
{"text": string, "last_update_date": "YYYY-MM-DD", "keywords": [string]}

Do not include markdown, commentary, code fences, or extra keys."#;

/// Summarization capability used to merge the two tiers.
#[async_trait]
pub trait NoteMerger: Send + Sync {
    /// Send the consolidation prompt and return the raw reply text
    async fn merge_notes(&self, prompt: &str) -> Result<String>;
}

/// What a consolidation run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsolidationOutcome {
    /// No session notes to merge
    Skipped,
    /// Global memory replaced with the merged list
    Merged { before: usize, after: usize },
    /// Merger unusable; session notes appended to global memory as-is
    FellBack { reason: String },
}

/// Consolidation utilities
pub struct Consolidator;

impl Consolidator {
    /// Merge session notes into global memory.
    ///
    /// Never fails: merger errors and malformed replies fall back to the
    /// union of both tiers. Session memory is empty afterwards.
    pub async fn consolidate(
        state: &mut TravelState,
        merger: &dyn NoteMerger,
    ) -> ConsolidationOutcome {
        if state.session_memory.is_empty() {
            return ConsolidationOutcome::Skipped;
        }

        let global = state.global_memory.notes.clone();
        let session = state.session_memory.notes.clone();
        let prompt = Self::build_prompt(&global, &session);

        info!(
            "Consolidating {} session notes into {} global notes",
            session.len(),
            global.len()
        );

        let parsed = match merger.merge_notes(&prompt).await {
            Ok(reply) => Self::parse_notes(&reply),
            Err(e) => Err(e.to_string()),
        };

        let outcome = match parsed {
            Ok(notes) => {
                let outcome = ConsolidationOutcome::Merged {
                    before: global.len() + session.len(),
                    after: notes.len(),
                };
                state.global_memory.notes = notes;
                outcome
            }
            Err(reason) => {
                warn!("Consolidation failed: {}. Keeping union of notes.", reason);
                let mut union = global;
                union.extend(session);
                state.global_memory.notes = union;
                ConsolidationOutcome::FellBack { reason }
            }
        };

        state.session_memory.clear();
        info!("Consolidation complete: {:?}", outcome);
        outcome
    }

    pub fn build_prompt(global: &[MemoryNote], session: &[MemoryNote]) -> String {
        let global_json = serde_json::to_string(global).unwrap_or_else(|_| "[]".to_string());
        let session_json = serde_json::to_string(session).unwrap_or_else(|_| "[]".to_string());
        format!(
            "{}\n\nGLOBAL_NOTES (JSON):\n<GLOBAL_JSON>\n{}\n</GLOBAL_JSON>\n\nSESSION_NOTES (JSON):\n<SESSION_JSON>\n{}\n</SESSION_JSON>",
            CONSOLIDATION_PROMPT, global_json, session_json
        )
    }

    /// Parse the merger's reply as a JSON array of notes.
    pub fn parse_notes(reply: &str) -> std::result::Result<Vec<MemoryNote>, String> {
        let value: serde_json::Value = serde_json::from_str(reply.trim())
            .map_err(|e| format!("reply is not JSON: {}", e))?;
        if !value.is_array() {
            return Err("reply is not a JSON array".to_string());
        }
        serde_json::from_value(value).map_err(|e| format!("reply does not match note schema: {}", e))
    }
}
