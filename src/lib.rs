//! Concierge - travel planning assistant
//!
//! A conversational agent that keeps durable knowledge about a traveller:
//! - Stages notes captured during a conversation in session memory
//! - Consolidates them into long-term global memory on demand
//! - Bounds the conversation window and re-surfaces session notes after trims

pub mod commands;
pub mod concierge_agent;
pub mod memory;
pub mod search;
pub mod session;

pub use concierge_agent::{ConciergeAgent, InstructionBuilder, ModelRuntime, ModelStep};
pub use memory::{ConversationWindow, MemoryNote, NoteCollection, StateStore, TravelState};
pub use session::ChatSession;

use serde::Deserialize;
use std::path::PathBuf;
use tracing::{info, warn};

/// Default number of user turns kept in the conversation window
pub const DEFAULT_MAX_TURNS: usize = 20;

const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_CONSOLIDATION_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

/// Configuration for Concierge
#[derive(Debug, Clone)]
pub struct ConciergeConfig {
    /// Directory holding `config.toml` and per-user state files
    pub data_dir: PathBuf,

    /// Identifier of the traveller whose state is loaded
    pub user_id: String,

    /// Number of user turns kept in the conversation window
    pub max_turns: usize,

    /// Global notes rendered into the instructions each turn
    pub global_memory_k: usize,

    /// Session notes rendered when a trim re-surfaces them
    pub session_memory_k: usize,

    /// Model used for conversational turns
    pub model: String,

    /// Model used to merge session notes into global memory
    pub consolidation_model: String,

    /// Chat Completions endpoint base URL
    pub base_url: String,

    /// Upper bound on tool-requesting model steps in one turn
    pub max_tool_rounds: usize,
}

/// Optional overrides read from `<data_dir>/config.toml`
#[derive(Debug, Default, Deserialize)]
struct ConfigToml {
    model: Option<String>,
    consolidation_model: Option<String>,
    base_url: Option<String>,
    max_turns: Option<usize>,
}

impl ConciergeConfig {
    pub fn new(data_dir: PathBuf, user_id: impl Into<String>) -> Self {
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self {
            data_dir,
            user_id: user_id.into(),
            max_turns: DEFAULT_MAX_TURNS,
            global_memory_k: memory::DEFAULT_GLOBAL_K,
            session_memory_k: memory::DEFAULT_SESSION_K,
            model: DEFAULT_MODEL.to_string(),
            consolidation_model: DEFAULT_CONSOLIDATION_MODEL.to_string(),
            base_url,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    /// Apply overrides from `config.toml` if the file exists.
    ///
    /// An unreadable or malformed file is logged and ignored.
    pub async fn load_overrides(mut self) -> Self {
        let path = self.config_file();
        if !path.exists() {
            return self;
        }

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return self;
            }
        };

        match toml::from_str::<ConfigToml>(&content) {
            Ok(file) => {
                if let Some(model) = file.model {
                    self.model = model;
                }
                if let Some(model) = file.consolidation_model {
                    self.consolidation_model = model;
                }
                if let Some(url) = file.base_url {
                    self.base_url = url;
                }
                if let Some(turns) = file.max_turns {
                    self.max_turns = turns.max(1);
                }
                info!(
                    "Config resolved: model='{}', consolidation_model='{}', max_turns={}",
                    self.model, self.consolidation_model, self.max_turns
                );
            }
            Err(e) => warn!("Ignoring malformed {}: {}", path.display(), e),
        }

        self
    }
}

/// Resolve the data directory: `CONCIERGE_HOME`, else `~/.concierge`.
pub fn default_data_dir() -> Result<PathBuf> {
    if let Ok(home) = std::env::var("CONCIERGE_HOME") {
        return Ok(PathBuf::from(home));
    }
    let home = dirs::home_dir()
        .ok_or_else(|| ConciergeError::Config("Could not find home directory".to_string()))?;
    Ok(home.join(".concierge"))
}

/// Result type for Concierge operations
pub type Result<T> = std::result::Result<T, ConciergeError>;

/// Errors that can occur in Concierge
#[derive(Debug, thiserror::Error)]
pub enum ConciergeError {
    #[error("Model error: {0}")]
    Model(String),

    #[error("Search provider error: {0}")]
    Search(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
