//! Per-turn system instructions.
//!
//! Global memory is rendered every turn. Session memory only appears in the
//! turn right after the conversation window discarded history, and only once.

use crate::memory::{
    render_frontmatter, render_global_memories_md, render_session_memories_md, InjectionState,
    TravelState, DEFAULT_GLOBAL_K, DEFAULT_SESSION_K,
};
use chrono::{Datelike, NaiveDate};
use tracing::debug;

const BASE_INSTRUCTIONS_TEMPLATE: &str = r#"
You are a concise, reliable travel concierge.
Help users plan and book flights, hotels, and car/travel insurance.

Today's date is: {current_date}

Guidelines:
- Collect key trip details and confirm understanding.
- Ask only one focused clarifying question at a time.
- Provide a few strong options with brief tradeoffs, then recommend one.
- Respect stable user preferences and constraints; avoid assumptions.
- Before booking, restate all details and get explicit approval.
- Never invent prices, availability, or policies. Use tools or state uncertainty.
- Do not repeat sensitive PII; only request what is required.
- Track multi-step itineraries and unresolved decisions.
- When a date is provided without a year, assume the current year ({current_year}).
"#;

const MEMORY_POLICY: &str = r#"
<memory_policy>
You may receive two memory lists:
- GLOBAL memory = long-term defaults ("usually / in general").
- SESSION memory = trip-specific overrides ("this trip / this time").

How to use memory:
- Use memory only when it is relevant to the user's current decision (flight/hotel/insurance choices).
- Apply relevant memory automatically when setting tone, proposing options and making recommendations.
- Do not repeat memory verbatim to the user unless it's necessary to confirm a critical constraint.

Precedence and conflicts:
1) The user's latest message in this conversation overrides everything.
2) SESSION memory overrides GLOBAL memory for this trip when they conflict.
3) Within the same memory list, if two items conflict, prefer the most recent by date.
4) Treat GLOBAL memory as a default, not a hard constraint, unless the user explicitly states it as non-negotiable.

When to ask a clarifying question:
- Ask exactly one focused question only if a memory materially affects booking and the user's intent is ambiguous.

Where memory should influence decisions:
- Flights: seat preference, baggage habits, airline loyalty/status, layover tolerance.
- Hotels: neighborhood/location style, room preferences, brand loyalty IDs/status.
- Insurance: known coverage profile, whether the user wants add-ons.

Memory updates:
- Do NOT treat "this time" requests as changes to GLOBAL defaults.
- Only promote a preference into GLOBAL memory if the user indicates it's a lasting rule.
- If a new durable preference/constraint appears, store it via the memory tool.

Safety:
- Never store or echo sensitive PII (passport numbers, payment details, full DOB).
</memory_policy>
"#;

const SESSION_HEADER: &str = "SESSION memory (temporary; overrides GLOBAL when conflicting):\n";

/// Memory text computed for one turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMemory {
    pub frontmatter: String,
    pub global_md: String,
    /// Present only when a trim is being answered this turn
    pub session_md: Option<String>,
}

/// Assembles the system instructions for each turn
#[derive(Debug, Clone, Copy)]
pub struct InstructionBuilder {
    global_k: usize,
    session_k: usize,
}

impl Default for InstructionBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_GLOBAL_K, DEFAULT_SESSION_K)
    }
}

impl InstructionBuilder {
    pub fn new(global_k: usize, session_k: usize) -> Self {
        Self {
            global_k,
            session_k,
        }
    }

    /// Render memory for this turn and consume a pending injection.
    ///
    /// A pending injection with no session notes stays pending, so a later
    /// note is still surfaced once.
    pub fn render(&self, state: &mut TravelState) -> RenderedMemory {
        let session_md = if state.injection.is_pending() && !state.session_memory.is_empty() {
            state.injection = InjectionState::Idle;
            debug!(
                "Injecting {} session notes after trim",
                state.session_memory.len().min(self.session_k)
            );
            Some(render_session_memories_md(
                state.session_memory.as_slice(),
                self.session_k,
            ))
        } else {
            None
        };

        RenderedMemory {
            frontmatter: render_frontmatter(&state.profile),
            global_md: render_global_memories_md(state.global_memory.as_slice(), self.global_k),
            session_md,
        }
    }

    /// Full instructions for a turn taking place on `today`.
    pub fn build(&self, state: &mut TravelState, today: NaiveDate) -> String {
        let memory = self.render(state);
        Self::assemble(&memory, today)
    }

    pub fn assemble(memory: &RenderedMemory, today: NaiveDate) -> String {
        let base = BASE_INSTRUCTIONS_TEMPLATE
            .replace("{current_date}", &today.format("%B %d, %Y").to_string())
            .replace("{current_year}", &today.year().to_string());

        let mut out = base;
        out.push_str("\n\n<user_profile>\n");
        out.push_str(&memory.frontmatter);
        out.push_str("\n</user_profile>");
        out.push_str("\n\n<memories>\nGLOBAL memory:\n");
        out.push_str(&memory.global_md);
        if let Some(session_md) = &memory.session_md {
            out.push_str("\n\n");
            out.push_str(SESSION_HEADER);
            out.push_str(session_md);
        }
        out.push_str("\n</memories>");
        out.push_str("\n\n");
        out.push_str(MEMORY_POLICY);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryNote;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
    }

    #[test]
    fn test_base_substitution_and_layout() {
        let mut state = TravelState::seeded();
        let text = InstructionBuilder::default().build(&mut state, day());
        assert!(text.contains("Today's date is: January 15, 2026"));
        assert!(text.contains("assume the current year (2026)"));
        assert!(text.contains("<user_profile>\n---\nprofile:\n"));
        assert!(text.contains("<memories>\nGLOBAL memory:\n- "));
        assert!(!text.contains(SESSION_HEADER));
        // the policy text always names both tiers
        assert!(text.contains("- SESSION memory = trip-specific overrides"));
        assert!(text.trim_end().ends_with("</memory_policy>"));
    }

    #[test]
    fn test_session_block_injected_once() {
        let mut state = TravelState::default();
        state
            .session_memory
            .push(MemoryNote::dated("Window seat this trip", "2026-01-14", &["seat"]));
        state.mark_trimmed();

        let builder = InstructionBuilder::default();
        let first = builder.build(&mut state, day());
        assert!(first.contains(
            "GLOBAL memory:\n- (none)\n\nSESSION memory (temporary; overrides GLOBAL when conflicting):\n- Window seat this trip\n</memories>"
        ));
        assert_eq!(state.injection, InjectionState::Idle);

        let second = builder.build(&mut state, day());
        assert!(!second.contains(SESSION_HEADER));
        assert!(!second.contains("- Window seat this trip"));
    }

    #[test]
    fn test_pending_without_notes_stays_pending() {
        let mut state = TravelState::default();
        state.mark_trimmed();
        let builder = InstructionBuilder::default();

        let rendered = builder.render(&mut state);
        assert_eq!(rendered.session_md, None);
        assert_eq!(state.injection, InjectionState::Pending);

        state.save_note("Needs an early checkout", ["hotel"]);
        let rendered = builder.render(&mut state);
        assert_eq!(
            rendered.session_md.as_deref(),
            Some("- Needs an early checkout")
        );
        assert_eq!(state.injection, InjectionState::Idle);
    }

    #[test]
    fn test_idle_state_never_shows_session_notes() {
        let mut state = TravelState::default();
        state.save_note("Prefers trains", ["rail"]);
        let rendered = InstructionBuilder::default().render(&mut state);
        assert_eq!(rendered.session_md, None);
    }
}
