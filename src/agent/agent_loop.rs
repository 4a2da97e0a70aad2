//! Pass driver: alternates the reasoner and the gate until the conversation
//! completes, suspends on an approval, or hands a host action upward.

use std::sync::Arc;

use tracing::debug;

use crate::llm::{ChatClient, ToolCall};
use crate::tools::{ToolCatalog, ToolSpec};

use super::gate::{ActionGate, ApprovalRequest, Decision, GateOutcome};
use super::reasoner::{Reasoner, ReasonerOutcome};
use super::state::Conversation;
use super::AgentError;

/// How one pass over the conversation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Terminal assistant message; search bookkeeping has been cleared.
    Completed { message: String },

    /// A proposal awaits an external decision. The caller persists the
    /// conversation and comes back through [`AgentLoop::resume_turn`].
    Suspended { request: ApprovalRequest },

    /// The proposal targets a host-provided action; the caller's own surface
    /// executes it. The proposal stays in the history untouched.
    HostAction { call: ToolCall },
}

pub struct AgentLoop {
    reasoner: Reasoner,
    gate: ActionGate,
    catalog: Arc<ToolCatalog>,
    max_iterations: usize,
}

impl AgentLoop {
    pub fn new(
        llm: Arc<dyn ChatClient>,
        model: String,
        catalog: Arc<ToolCatalog>,
        max_iterations: usize,
    ) -> Self {
        Self {
            reasoner: Reasoner::new(llm, model),
            gate: ActionGate,
            catalog,
            max_iterations,
        }
    }

    /// Drive the cycle from the current state until it settles.
    pub async fn run_turn(
        &self,
        conversation: &mut Conversation,
        host_actions: &[ToolSpec],
    ) -> Result<TurnOutcome, AgentError> {
        for iteration in 0..self.max_iterations {
            debug!(iteration = iteration + 1, "Reasoner turn");
            match self
                .reasoner
                .step(conversation, &self.catalog, host_actions)
                .await?
            {
                ReasonerOutcome::Final { content } => {
                    // Terminal answer: the bookkeeping is discarded wholesale.
                    conversation.clear_search_history();
                    return Ok(TurnOutcome::Completed { message: content });
                }
                ReasonerOutcome::HostAction { call } => {
                    return Ok(TurnOutcome::HostAction { call });
                }
                ReasonerOutcome::Proposal { .. } => {
                    if let Some(request) = self.gate.suspension_request(conversation) {
                        return Ok(TurnOutcome::Suspended { request });
                    }
                    // Stale tail: the gate's entry guard hands control
                    // straight back to the reasoner.
                }
            }
        }
        Err(AgentError::MaxIterations(self.max_iterations))
    }

    /// Parse a raw decision string and fold the gate's verdict into the
    /// conversation. Once this returns `Ok`, an approved tool has already
    /// executed and its result turn sits in the history, so callers that
    /// checkpoint can do so before continuing the cycle.
    ///
    /// An unrecognized decision fails without touching the conversation; the
    /// suspension stays live for the next attempt. With no pending call the
    /// gate reports [`GateOutcome::NoPending`] and leaves the conversation
    /// as it found it.
    pub async fn apply_decision(
        &self,
        conversation: &mut Conversation,
        decision: &str,
    ) -> Result<GateOutcome, AgentError> {
        let verdict = Decision::parse(decision)
            .ok_or_else(|| AgentError::UnrecognizedDecision(decision.to_string()))?;
        Ok(self.gate.resume(conversation, verdict, &self.catalog).await)
    }

    /// Resume a suspended pass with a raw decision string and keep driving
    /// the cycle from wherever the gate leaves it.
    pub async fn resume_turn(
        &self,
        conversation: &mut Conversation,
        decision: &str,
        host_actions: &[ToolSpec],
    ) -> Result<TurnOutcome, AgentError> {
        match self.apply_decision(conversation, decision).await? {
            GateOutcome::Reported | GateOutcome::NoPending => {}
        }
        self.run_turn(conversation, host_actions).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatMessage, ChatResponse, FunctionCall, LlmError, Role};
    use crate::tools::{Tool, WeatherTool};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedClient {
        responses: Mutex<Vec<ChatResponse>>,
    }

    impl ScriptedClient {
        fn new(mut responses: Vec<ChatResponse>) -> Arc<Self> {
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
            })
        }
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn chat_completion(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _tools: Option<&[Value]>,
        ) -> Result<ChatResponse, LlmError> {
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| LlmError::MalformedResponse("script exhausted".to_string()))
        }
    }

    fn proposal(id: &str, name: &str, args: Value) -> ChatResponse {
        ChatResponse {
            content: None,
            tool_calls: Some(vec![ToolCall {
                id: id.to_string(),
                kind: "function".to_string(),
                function: FunctionCall {
                    name: name.to_string(),
                    arguments: args.to_string(),
                },
            }]),
        }
    }

    fn answer(content: &str) -> ChatResponse {
        ChatResponse {
            content: Some(content.to_string()),
            tool_calls: None,
        }
    }

    struct CountingSearchTool {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Tool for CountingSearchTool {
        fn name(&self) -> &str {
            "tavily-search"
        }

        fn description(&self) -> &str {
            "web search"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"query": {"type": "string"}}})
        }

        async fn invoke(&self, _args: Value) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("search results".to_string())
        }
    }

    fn loop_with(client: Arc<dyn ChatClient>, catalog: ToolCatalog) -> AgentLoop {
        AgentLoop::new(client, "test-model".to_string(), Arc::new(catalog), 50)
    }

    #[tokio::test]
    async fn weather_question_flows_through_approval_to_a_final_answer() {
        let client = ScriptedClient::new(vec![
            proposal("call_w1", "get_weather", json!({"location": "北京"})),
            answer("今天北京天气晴朗。"),
        ]);
        let agent = loop_with(client, ToolCatalog::new(vec![Arc::new(WeatherTool)], None));
        let mut convo = Conversation::new();
        convo.push(ChatMessage::user("今天北京的天气怎么样？"));

        let outcome = agent.run_turn(&mut convo, &[]).await.expect("first pass");
        let request = match outcome {
            TurnOutcome::Suspended { request } => request,
            other => panic!("expected suspension, got {:?}", other),
        };
        assert_eq!(request.kind, ApprovalRequest::KIND);
        assert_eq!(request.tool_name, "get_weather");
        assert_eq!(request.tool_args["location"], "北京");
        assert_eq!(request.tool_id, "call_w1");

        let outcome = agent
            .resume_turn(&mut convo, "approve", &[])
            .await
            .expect("resume");
        assert_eq!(
            outcome,
            TurnOutcome::Completed {
                message: "今天北京天气晴朗。".to_string()
            }
        );

        // The tool result turn carries the weather JSON for the right place.
        let result_turn = convo
            .messages
            .iter()
            .find(|m| m.role == Role::Tool && m.tool_call_id.as_deref() == Some("call_w1"))
            .expect("tool result turn");
        let report: Value =
            serde_json::from_str(result_turn.content.as_deref().unwrap()).expect("weather JSON");
        assert_eq!(report["location"], "北京");

        assert!(convo.search_history.is_empty());
    }

    #[tokio::test]
    async fn rejected_search_is_never_invoked_and_clears_only_at_the_end() {
        let client = ScriptedClient::new(vec![
            proposal("call_s1", "tavily-search", json!({"query": "X"})),
            answer("I could not search, but here is what I know."),
        ]);
        let search_tool = Arc::new(CountingSearchTool {
            calls: AtomicUsize::new(0),
        });
        let agent = loop_with(
            client,
            ToolCatalog::new(vec![search_tool.clone()], None),
        );
        let mut convo = Conversation::new();
        convo.push(ChatMessage::user("find X for me"));

        let outcome = agent.run_turn(&mut convo, &[]).await.expect("first pass");
        assert!(matches!(outcome, TurnOutcome::Suspended { .. }));
        assert_eq!(convo.search_history.len(), 1);
        assert_eq!(convo.search_history[0].query, "X");

        let outcome = agent
            .resume_turn(&mut convo, "reject", &[])
            .await
            .expect("resume");
        assert!(matches!(outcome, TurnOutcome::Completed { .. }));

        // The tool never ran; the rejection turn is in the history; the
        // record survived as pending right up to the terminal bulk clear.
        assert_eq!(search_tool.calls.load(Ordering::SeqCst), 0);
        assert!(convo
            .messages
            .iter()
            .any(|m| m.role == Role::Tool
                && m.tool_call_id.as_deref() == Some("call_s1")
                && m.content.as_deref() == Some("Tool call was declined by the user.")));
        assert!(convo.search_history.is_empty());
    }

    #[tokio::test]
    async fn unrecognized_decision_fails_and_leaves_the_suspension_live() {
        let client = ScriptedClient::new(vec![
            proposal("call_w1", "get_weather", json!({"location": "Oslo"})),
            answer("Weather delivered."),
        ]);
        let agent = loop_with(client, ToolCatalog::new(vec![Arc::new(WeatherTool)], None));
        let mut convo = Conversation::new();
        convo.push(ChatMessage::user("weather please"));

        agent.run_turn(&mut convo, &[]).await.expect("first pass");
        let snapshot = convo.messages.clone();

        let err = agent
            .resume_turn(&mut convo, "maybe later", &[])
            .await
            .expect_err("unrecognized decision");
        assert!(matches!(err, AgentError::UnrecognizedDecision(_)));
        assert_eq!(convo.messages, snapshot);
        assert!(convo.pending_call().is_some());

        // A valid decision afterwards still works.
        let outcome = agent
            .resume_turn(&mut convo, "approved", &[])
            .await
            .expect("valid resume");
        assert!(matches!(outcome, TurnOutcome::Completed { .. }));
    }

    #[tokio::test]
    async fn host_action_proposals_return_upward_without_suspending() {
        let client = ScriptedClient::new(vec![proposal(
            "call_h1",
            "say_hello",
            json!({"name": "Ada"}),
        )]);
        let agent = loop_with(client, ToolCatalog::new(vec![Arc::new(WeatherTool)], None));
        let host_actions = vec![ToolSpec {
            name: "say_hello".to_string(),
            description: "Host-side greeting".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        }];
        let mut convo = Conversation::new();
        convo.push(ChatMessage::user("greet Ada"));

        let outcome = agent
            .run_turn(&mut convo, &host_actions)
            .await
            .expect("pass");
        match outcome {
            TurnOutcome::HostAction { call } => {
                assert_eq!(call.function.name, "say_hello");
                assert_eq!(call.id, "call_h1");
            }
            other => panic!("expected host action, got {:?}", other),
        }
        // Proposal intact for the host surface.
        assert_eq!(convo.pending_call().map(|c| c.id.as_str()), Some("call_h1"));
    }

    #[tokio::test]
    async fn unknown_tool_approval_reports_and_the_pass_continues_to_a_final() {
        let client = ScriptedClient::new(vec![
            proposal("call_g1", "ghost_tool", json!({})),
            answer("That capability is not available."),
        ]);
        let agent = loop_with(client, ToolCatalog::new(Vec::new(), None));
        let mut convo = Conversation::new();
        convo.push(ChatMessage::user("use the ghost tool"));

        agent.run_turn(&mut convo, &[]).await.expect("first pass");
        let outcome = agent
            .resume_turn(&mut convo, "approve", &[])
            .await
            .expect("resume");
        assert!(matches!(outcome, TurnOutcome::Completed { .. }));

        assert!(convo
            .messages
            .iter()
            .any(|m| m.role == Role::Tool
                && m.content.as_deref() == Some("Unknown tool: ghost_tool")));
    }
}
