//! Concierge agent module
//!
//! Runs one conversational turn: builds the instructions, drives the model
//! through tool calls, and records the turn in the conversation window.

mod instructions;
mod llm;
mod runtime;
mod tools;

pub use instructions::{InstructionBuilder, RenderedMemory};
pub use llm::LlmClient;
pub use runtime::{ModelRuntime, ModelStep, ToolCall};
pub use tools::{
    error_output, LookupAirportCodeTool, SaveMemoryNoteTool, SearchFlightOffersTool,
    SearchHotelOffersTool, Tool, ToolRegistry, ToolSchema,
};

use crate::memory::{ConversationEntry, ConversationWindow, SharedState};
use crate::search::TravelSearch;
use crate::{ConciergeConfig, ConciergeError, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// The travel concierge: model runtime plus the tools it may call
pub struct ConciergeAgent {
    /// Model driving the conversation
    runtime: Arc<dyn ModelRuntime>,

    /// Capabilities exposed to the model
    tools: ToolRegistry,

    /// Per-turn instruction source
    builder: InstructionBuilder,

    /// Bound on tool-requesting steps per turn
    max_tool_rounds: usize,
}

impl ConciergeAgent {
    pub fn new(
        runtime: Arc<dyn ModelRuntime>,
        tools: ToolRegistry,
        builder: InstructionBuilder,
        max_tool_rounds: usize,
    ) -> Self {
        Self {
            runtime,
            tools,
            builder,
            max_tool_rounds: max_tool_rounds.max(1),
        }
    }

    /// Agent with the note-taking and travel search tools registered
    pub fn with_default_tools(
        runtime: Arc<dyn ModelRuntime>,
        state: SharedState,
        search: Arc<dyn TravelSearch>,
        config: &ConciergeConfig,
    ) -> Self {
        let mut tools = ToolRegistry::new();
        tools.register(SaveMemoryNoteTool::new(state));
        tools.register(SearchFlightOffersTool::new(search.clone()));
        tools.register(SearchHotelOffersTool::new(search.clone()));
        tools.register(LookupAirportCodeTool::new(search));

        Self::new(
            runtime,
            tools,
            InstructionBuilder::new(config.global_memory_k, config.session_memory_k),
            config.max_tool_rounds,
        )
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run one turn and return the model's final reply.
    ///
    /// Instructions are built once and reused for every step of the turn.
    /// The window only receives the turn if it completes; state is not
    /// persisted here. A failed turn re-arms a session injection it consumed.
    pub async fn run_turn(
        &self,
        state: &SharedState,
        window: &ConversationWindow,
        input: &str,
    ) -> Result<String> {
        let preview: String = input.chars().take(100).collect();
        info!("User input: {}", preview);

        let (instructions, injected) = {
            let mut state = state.write().await;
            let was_pending = state.injection.is_pending();
            let text = self
                .builder
                .build(&mut state, chrono::Local::now().date_naive());
            (text, was_pending && !state.injection.is_pending())
        };

        let result = self.drive(&instructions, window, input).await;
        if result.is_err() && injected {
            // the model never answered with the session notes in view
            state.write().await.mark_trimmed();
            debug!("Turn failed; session notes stay pending");
        }
        result
    }

    async fn drive(
        &self,
        instructions: &str,
        window: &ConversationWindow,
        input: &str,
    ) -> Result<String> {
        let schemas = self.tools.schemas();

        let mut history = window.read(None).await;
        let base_len = history.len();
        history.push(ConversationEntry::user(input));

        for round in 0..=self.max_tool_rounds {
            match self.runtime.step(instructions, &schemas, &history).await? {
                ModelStep::Final(text) => {
                    history.push(ConversationEntry::assistant(text.clone()));
                    let new_entries = history.split_off(base_len);
                    window.append(new_entries).await;
                    info!(
                        "Response: {} chars after {} tool rounds",
                        text.len(),
                        round
                    );
                    return Ok(text);
                }
                ModelStep::ToolCalls(calls) if round < self.max_tool_rounds => {
                    for call in &calls {
                        history.push(ConversationEntry::ToolCall {
                            call_id: call.call_id.clone(),
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        });
                    }
                    for call in calls {
                        let started = Instant::now();
                        let output = self.tools.dispatch(&call.name, &call.arguments).await;
                        debug!("Tool {} finished in {:?}", call.name, started.elapsed());
                        history.push(ConversationEntry::ToolResult {
                            call_id: call.call_id,
                            output: output.to_string(),
                        });
                    }
                }
                ModelStep::ToolCalls(_) => break,
            }
        }

        Err(ConciergeError::Model(format!(
            "model kept requesting tools after {} rounds",
            self.max_tool_rounds
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InjectionState, TravelState};
    use crate::search::UnconfiguredSearch;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays canned steps and records the instructions it was given
    struct ScriptedRuntime {
        steps: Mutex<Vec<ModelStep>>,
        seen: Mutex<Vec<(String, usize)>>,
    }

    impl ScriptedRuntime {
        fn new(mut steps: Vec<ModelStep>) -> Self {
            steps.reverse();
            Self {
                steps: Mutex::new(steps),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ModelRuntime for ScriptedRuntime {
        async fn step(
            &self,
            instructions: &str,
            _tools: &[ToolSchema],
            history: &[ConversationEntry],
        ) -> Result<ModelStep> {
            self.seen
                .lock()
                .unwrap()
                .push((instructions.to_string(), history.len()));
            self.steps
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| ConciergeError::Model("script exhausted".to_string()))
        }
    }

    fn agent(runtime: Arc<ScriptedRuntime>, state: SharedState, rounds: usize) -> ConciergeAgent {
        let mut config = ConciergeConfig::new("/tmp".into(), "t");
        config.max_tool_rounds = rounds;
        ConciergeAgent::with_default_tools(runtime, state, Arc::new(UnconfiguredSearch), &config)
    }

    fn save_call(id: &str, text: &str) -> ToolCall {
        ToolCall {
            call_id: id.to_string(),
            name: "save_memory_note".to_string(),
            arguments: format!(r#"{{"text": "{}", "keywords": ["seat"]}}"#, text),
        }
    }

    #[tokio::test]
    async fn test_tool_round_then_final() {
        let state = TravelState::default().into_shared();
        let window = ConversationWindow::new("t", state.clone(), 5);
        let runtime = Arc::new(ScriptedRuntime::new(vec![
            ModelStep::ToolCalls(vec![save_call("c1", "Prefers aisle seats")]),
            ModelStep::Final("Noted!".to_string()),
        ]));
        let agent = agent(runtime.clone(), state.clone(), 4);

        let reply = agent.run_turn(&state, &window, "I like aisle seats").await.unwrap();
        assert_eq!(reply, "Noted!");
        assert_eq!(state.read().await.session_memory.len(), 1);

        let items = window.read(None).await;
        assert_eq!(items.len(), 4);
        assert_eq!(items[0], ConversationEntry::user("I like aisle seats"));
        assert!(matches!(&items[1], ConversationEntry::ToolCall { name, .. } if name == "save_memory_note"));
        assert!(
            matches!(&items[2], ConversationEntry::ToolResult { output, .. } if output == r#"{"ok":true}"#)
        );
        assert_eq!(items[3], ConversationEntry::assistant("Noted!"));

        // one instruction text for both steps of the turn
        let seen = runtime.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, seen[1].0);
        assert_eq!((seen[0].1, seen[1].1), (1, 3));
    }

    #[tokio::test]
    async fn test_runaway_tool_loop_is_an_error() {
        let state = TravelState::default().into_shared();
        let window = ConversationWindow::new("t", state.clone(), 5);
        let runtime = Arc::new(ScriptedRuntime::new(vec![
            ModelStep::ToolCalls(vec![save_call("c1", "a")]),
            ModelStep::ToolCalls(vec![save_call("c2", "b")]),
            ModelStep::ToolCalls(vec![save_call("c3", "c")]),
        ]));
        let agent = agent(runtime, state.clone(), 2);

        let err = agent.run_turn(&state, &window, "hi").await.unwrap_err();
        assert!(matches!(err, ConciergeError::Model(_)));
        assert!(window.is_empty().await);
        // tools that did run keep their effects
        assert_eq!(state.read().await.session_memory.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_turn_keeps_session_injection_pending() {
        let mut seeded = TravelState::default();
        seeded.save_note("Window seat this trip", ["seat"]);
        seeded.mark_trimmed();
        let state = seeded.into_shared();
        let window = ConversationWindow::new("t", state.clone(), 5);

        let failing = agent(Arc::new(ScriptedRuntime::new(Vec::new())), state.clone(), 2);
        assert!(failing.run_turn(&state, &window, "hi").await.is_err());
        assert_eq!(state.read().await.injection, InjectionState::Pending);

        let runtime = Arc::new(ScriptedRuntime::new(vec![ModelStep::Final("ok".to_string())]));
        let agent = agent(runtime.clone(), state.clone(), 2);
        agent.run_turn(&state, &window, "hi").await.unwrap();
        assert!(runtime.seen.lock().unwrap()[0].0.contains("- Window seat this trip"));
        assert_eq!(state.read().await.injection, InjectionState::Idle);
    }

    #[tokio::test]
    async fn test_model_error_leaves_window_untouched() {
        let state = TravelState::default().into_shared();
        let window = ConversationWindow::new("t", state.clone(), 5);
        let agent = agent(Arc::new(ScriptedRuntime::new(Vec::new())), state.clone(), 2);
        assert!(agent.run_turn(&state, &window, "hi").await.is_err());
        assert!(window.is_empty().await);
    }
}
