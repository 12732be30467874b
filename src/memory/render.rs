//! Prompt rendering for the profile and both memory tiers.
//!
//! Pure functions: no I/O, no state.

use super::note::MemoryNote;
use super::state::Profile;
use serde::Serialize;
use tracing::warn;

/// Placeholder rendered when a memory list is empty
pub const EMPTY_PLACEHOLDER: &str = "- (none)";

/// Global notes rendered per turn
pub const DEFAULT_GLOBAL_K: usize = 6;

/// Session notes rendered when re-injected
pub const DEFAULT_SESSION_K: usize = 8;

#[derive(Serialize)]
struct Frontmatter<'a> {
    profile: &'a Profile,
}

/// Render the profile as YAML front matter under a single `profile` key.
///
/// Key order follows the profile's insertion order.
pub fn render_frontmatter(profile: &Profile) -> String {
    let yaml = match serde_yaml::to_string(&Frontmatter { profile }) {
        Ok(y) => y,
        Err(e) => {
            warn!("Failed to render profile front matter: {}", e);
            String::new()
        }
    };
    format!("---\n{}\n---", yaml.trim())
}

/// Render the `k` most recent global notes, newest `last_update_date` first.
pub fn render_global_memories_md(notes: &[MemoryNote], k: usize) -> String {
    let mut sorted: Vec<&MemoryNote> = notes.iter().collect();
    // stable: equal dates keep their stored order
    sorted.sort_by(|a, b| b.last_update_date.cmp(&a.last_update_date));
    bullets(sorted.into_iter().take(k))
}

/// Render the last `k` session notes in append order.
pub fn render_session_memories_md(notes: &[MemoryNote], k: usize) -> String {
    let start = notes.len().saturating_sub(k);
    bullets(notes[start..].iter())
}

fn bullets<'a>(notes: impl Iterator<Item = &'a MemoryNote>) -> String {
    let lines: Vec<String> = notes.map(|n| format!("- {}", n.text)).collect();
    if lines.is_empty() {
        EMPTY_PLACEHOLDER.to_string()
    } else {
        lines.join("\n")
    }
}
