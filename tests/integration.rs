//! Integration tests for the Concierge

use async_trait::async_trait;
use concierge::commands::{parse_command, Command, MemoryTier};
use concierge::concierge_agent::{ToolCall, ToolSchema};
use concierge::memory::{
    ConversationEntry, InjectionState, MemoryNote, NoteMerger, SharedState, StateStore,
};
use concierge::search::UnconfiguredSearch;
use concierge::session::Reply;
use concierge::{
    ChatSession, ConciergeAgent, ConciergeConfig, ConciergeError, ConversationWindow,
    ModelRuntime, ModelStep, TravelState,
};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Plays back scripted steps, then answers "ok"; records every instruction text
struct ScriptedRuntime {
    steps: Mutex<Vec<ModelStep>>,
    instructions: Mutex<Vec<String>>,
}

impl ScriptedRuntime {
    fn new(mut steps: Vec<ModelStep>) -> Arc<Self> {
        steps.reverse();
        Arc::new(Self {
            steps: Mutex::new(steps),
            instructions: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<String> {
        self.instructions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelRuntime for ScriptedRuntime {
    async fn step(
        &self,
        instructions: &str,
        _tools: &[ToolSchema],
        _history: &[ConversationEntry],
    ) -> concierge::Result<ModelStep> {
        self.instructions
            .lock()
            .unwrap()
            .push(instructions.to_string());
        Ok(self
            .steps
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| ModelStep::Final("ok".to_string())))
    }
}

struct FailingRuntime;

#[async_trait]
impl ModelRuntime for FailingRuntime {
    async fn step(
        &self,
        _instructions: &str,
        _tools: &[ToolSchema],
        _history: &[ConversationEntry],
    ) -> concierge::Result<ModelStep> {
        Err(ConciergeError::Model("API error 500".to_string()))
    }
}

struct FixedMerger(Result<String, String>);

#[async_trait]
impl NoteMerger for FixedMerger {
    async fn merge_notes(&self, _prompt: &str) -> concierge::Result<String> {
        self.0.clone().map_err(ConciergeError::Model)
    }
}

const SESSION_HEADER: &str = "SESSION memory (temporary; overrides GLOBAL when conflicting):";

fn save_note_call(id: &str, text: &str) -> ModelStep {
    ModelStep::ToolCalls(vec![ToolCall {
        call_id: id.to_string(),
        name: "save_memory_note".to_string(),
        arguments: serde_json::json!({"text": text, "keywords": ["Seat"]}).to_string(),
    }])
}

fn config(dir: &TempDir, max_turns: usize) -> ConciergeConfig {
    ConciergeConfig::new(dir.path().to_path_buf(), "alice").with_max_turns(max_turns)
}

async fn session(
    dir: &TempDir,
    runtime: Arc<dyn ModelRuntime>,
    merger: FixedMerger,
    max_turns: usize,
) -> (ChatSession, SharedState) {
    let config = config(dir, max_turns);
    let store = StateStore::new(&config.data_dir).await.unwrap();
    let state = store.load_or_default("alice").await.unwrap().into_shared();
    let agent = ConciergeAgent::with_default_tools(
        runtime,
        state.clone(),
        Arc::new(UnconfiguredSearch),
        &config,
    );
    let window = ConversationWindow::new("alice", state.clone(), config.max_turns);
    let session = ChatSession::new("alice", store, state.clone(), window, agent, Arc::new(merger));
    (session, state)
}

/// Session notes reach the instructions only in the turn after a trim
#[tokio::test]
async fn test_trim_resurfaces_session_notes_once() {
    let dir = TempDir::new().unwrap();
    let runtime = ScriptedRuntime::new(vec![
        save_note_call("c1", "Wants a window seat this trip"),
        ModelStep::Final("Noted".to_string()),
    ]);
    let (session, state) = session(&dir, runtime.clone(), FixedMerger(Ok("[]".into())), 2).await;

    for input in ["I want a window seat", "Paris in May", "Any hotels?"] {
        session.chat(input).await;
    }

    // turn 1 took two steps, turns 2 and 3 one each
    let seen = runtime.seen();
    assert_eq!(seen.len(), 4);
    assert!(seen.iter().all(|i| !i.contains(SESSION_HEADER)));
    assert_eq!(state.read().await.injection, InjectionState::Pending);

    session.chat("Book the first one").await;
    let seen = runtime.seen();
    assert!(seen[4].contains(&format!("{}\n- Wants a window seat this trip", SESSION_HEADER)));
    // the injection was consumed, then turn 4's own append trimmed again
    assert_eq!(state.read().await.injection, InjectionState::Pending);

    let window = session.window().read(None).await;
    let users = window.iter().filter(|e| e.is_user()).count();
    assert_eq!(users, 2);
    assert_eq!(window[0], ConversationEntry::user("Any hotels?"));
}

/// Notes saved by the model persist with the state file
#[tokio::test]
async fn test_saved_notes_are_persisted() {
    let dir = TempDir::new().unwrap();
    let runtime = ScriptedRuntime::new(vec![
        save_note_call("c1", " Prefers aisle seats on long-haul flights "),
        ModelStep::Final("Got it".to_string()),
    ]);
    let (session, _state) = session(&dir, runtime, FixedMerger(Ok("[]".into())), 20).await;

    assert_eq!(session.chat("I always pick aisle seats").await, "Got it");

    let store = StateStore::new(dir.path()).await.unwrap();
    let reloaded = store.load("alice").await.unwrap().unwrap();
    assert_eq!(reloaded.global_memory.len(), 5);
    assert_eq!(reloaded.session_memory.len(), 1);
    let note = &reloaded.session_memory.notes[0];
    assert_eq!(note.text, "Prefers aisle seats on long-haul flights");
    assert_eq!(note.keywords, vec!["seat"]);
    assert_eq!(note.last_update_date.len(), 10);
    assert_eq!(reloaded.injection, InjectionState::Idle);
}

#[tokio::test]
async fn test_consolidate_command_replaces_global_and_persists() {
    let dir = TempDir::new().unwrap();
    let merged = r#"[{"text": "Prefers aisle seats", "last_update_date": "2026-01-10", "keywords": ["seat"]}]"#;
    let (session, state) = session(
        &dir,
        ScriptedRuntime::new(Vec::new()),
        FixedMerger(Ok(merged.to_string())),
        20,
    )
    .await;
    state
        .write()
        .await
        .save_note("Prefers aisle seats", ["seat"]);

    let reply = session.handle(Command::Consolidate).await;
    assert_eq!(
        reply,
        Reply::Text("Consolidated 6 notes into 1 long-term notes.".to_string())
    );

    let reloaded = StateStore::new(dir.path())
        .await
        .unwrap()
        .load("alice")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        reloaded.global_memory.notes,
        vec![MemoryNote::dated("Prefers aisle seats", "2026-01-10", &["seat"])]
    );
    assert!(reloaded.session_memory.is_empty());

    let again = session.handle(Command::Consolidate).await;
    assert_eq!(
        again,
        Reply::Text("No session notes to consolidate.".to_string())
    );
}

#[tokio::test]
async fn test_consolidation_failure_keeps_every_note() {
    let dir = TempDir::new().unwrap();
    let (session, state) = session(
        &dir,
        ScriptedRuntime::new(Vec::new()),
        FixedMerger(Ok("```json\n[]\n```".to_string())),
        20,
    )
    .await;
    state.write().await.save_note("Needs a late checkout", ["hotel"]);

    session.handle(Command::Consolidate).await;

    let state = state.read().await;
    assert_eq!(state.global_memory.len(), 6);
    assert_eq!(
        state.global_memory.notes.last().map(|n| n.text.as_str()),
        Some("Needs a late checkout")
    );
    assert!(state.session_memory.is_empty());
}

#[tokio::test]
async fn test_curation_commands() {
    let dir = TempDir::new().unwrap();
    let (session, state) = session(
        &dir,
        ScriptedRuntime::new(Vec::new()),
        FixedMerger(Ok("[]".into())),
        20,
    )
    .await;

    let remember = parse_command("/remember Avoids red-eye flights").unwrap();
    assert_eq!(session.handle(remember).await, Reply::Text("Remembered.".to_string()));
    {
        let state = state.read().await;
        assert_eq!(state.global_memory.len(), 6);
        let note = state.global_memory.notes.last().unwrap();
        assert_eq!(note.text, "Avoids red-eye flights");
        assert!(note.keywords.is_empty());
    }

    let forget = Command::Forget {
        tier: MemoryTier::Global,
        index: 6,
    };
    assert_eq!(
        session.handle(forget).await,
        Reply::Text("Forgot global note: Avoids red-eye flights".to_string())
    );
    let missing = Command::Forget {
        tier: MemoryTier::Session,
        index: 1,
    };
    assert_eq!(
        session.handle(missing).await,
        Reply::Text("No session note #1.".to_string())
    );

    let memory = match session.handle(Command::Memory).await {
        Reply::Text(text) => text,
        other => panic!("unexpected reply: {:?}", other),
    };
    assert!(memory.starts_with("---\nprofile:\n"));
    assert!(memory.contains("Session notes:\n  (none)"));

    assert_eq!(
        session.handle(Command::Quit).await,
        Reply::Quit("Goodbye!".to_string())
    );
}

#[tokio::test]
async fn test_undo_removes_last_exchange() {
    let dir = TempDir::new().unwrap();
    let (session, _state) = session(
        &dir,
        ScriptedRuntime::new(Vec::new()),
        FixedMerger(Ok("[]".into())),
        20,
    )
    .await;

    session.chat("first").await;
    session.chat("second").await;
    assert_eq!(session.window().len().await, 4);

    session.handle(Command::Undo).await;
    assert_eq!(
        session.window().read(None).await,
        vec![
            ConversationEntry::user("first"),
            ConversationEntry::assistant("ok")
        ]
    );

    session.handle(Command::Clear).await;
    assert_eq!(
        session.handle(Command::Undo).await,
        Reply::Text("Nothing to undo.".to_string())
    );
}

#[tokio::test]
async fn test_failed_turn_apologizes_and_keeps_window_clean() {
    let dir = TempDir::new().unwrap();
    let (session, _state) = session(&dir, Arc::new(FailingRuntime), FixedMerger(Ok("[]".into())), 20).await;

    let reply = session.chat("hello").await;
    assert_eq!(
        reply,
        "Sorry, I encountered an error: Model error: API error 500"
    );
    assert!(session.window().is_empty().await);
    assert!(dir.path().join("users").join("alice.json").exists());
}

#[tokio::test]
async fn test_store_lists_and_deletes_users() {
    let dir = TempDir::new().unwrap();
    let store = StateStore::new(dir.path()).await.unwrap();
    store.save("bob", &TravelState::default()).await.unwrap();
    store.load_or_default("alice").await.unwrap();

    assert_eq!(store.list_users().await.unwrap(), vec!["alice", "bob"]);
    assert!(store.delete("bob").await.unwrap());
    assert!(!store.delete("bob").await.unwrap());
    assert!(store.load("bob").await.unwrap().is_none());
    assert!(store.has_user("alice"));
}
