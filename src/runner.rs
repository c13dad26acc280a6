//! # Runner (orientation)
//!
//! The `Runner` drives one user turn through the state machine
//! `Idle → Guarding → Acting → Idle`:
//!
//! 1. **Guarding**: the active agent's input guardrails run concurrently on
//!    a snapshot of the context. A tripwire ends the turn as
//!    [`TurnOutcome::Refused`] before any agent, tool or handoff runs.
//! 2. **Acting**: the active agent's instructions are rendered against the
//!    context and the model is called. Tool calls go through the Tower stack
//!    in `service.rs` and their results (or structured failures) are fed
//!    back; a handoff runs the edge's hook, switches the active agent and
//!    generation continues with the new agent in the same turn. The loop
//!    ends on a final reply or when `max_turns` model calls have been made.
//!
//! Context mutations made during Acting are kept when the turn later fails,
//! unless [`RunConfig::transactional_context`] is set, in which case the
//! context and the active agent are restored to their pre-Acting values.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower::ServiceExt;
use tracing::{debug, error, info, warn};

use crate::agent::AgentDefinition;
use crate::config::EngineConfig;
use crate::context::{AgentContext, ContextHandle};
use crate::error::{AgentsError, Result};
use crate::guardrail::GuardrailPipeline;
use crate::handoff::HandoffRouter;
use crate::items::{
    new_item_id, GuardrailItem, HandoffItem, Message, MessageItem, Role, RunItem, ToolCall,
    ToolCallItem, ToolOutputItem,
};
use crate::model::{ModelAction, ModelProvider, ModelRequest};
use crate::registry::{AgentId, AgentRegistry};
use crate::service::{build_tool_stack, ToolRequest, ToolResponse};
use crate::sessions::{Session, TurnState};
use crate::tool::ToolFailure;
use crate::usage::UsageStats;

fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…", &s[..cut]),
        None => s.to_string(),
    }
}

fn format_messages_for_log(instructions: &str, messages: &[Message]) -> String {
    let mut lines = vec![format!("   SYSTEM   | {}", truncate_for_log(instructions, 160))];
    for (idx, m) in messages.iter().enumerate() {
        let line = match m.role {
            Role::User => format!("{:02} USER     | {}", idx, truncate_for_log(&m.content, 160)),
            Role::System => format!("{:02} SYSTEM   | {}", idx, truncate_for_log(&m.content, 160)),
            Role::Assistant => match &m.tool_calls {
                Some(calls) => {
                    let calls: Vec<String> = calls
                        .iter()
                        .map(|tc| format!("id={}, name={}", tc.id, tc.name))
                        .collect();
                    format!("{:02} ASSIST   | tool_calls=[{}]", idx, calls.join(", "))
                }
                None => format!("{:02} ASSIST   | {}", idx, truncate_for_log(&m.content, 160)),
            },
            Role::Tool => format!(
                "{:02} TOOL     | tool_call_id={} payload={}",
                idx,
                m.tool_call_id.as_deref().unwrap_or("<missing tool_call_id>"),
                truncate_for_log(&m.content, 120)
            ),
        };
        lines.push(line);
    }
    lines.join("\n")
}

/// Settings for running turns.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Maximum model invocations in one turn
    pub max_turns: usize,
    pub model_timeout: Duration,
    pub tool_timeout: Duration,
    pub guardrail_timeout: Duration,
    /// Roll back context and active agent when a turn fails after Acting began
    pub transactional_context: bool,
    pub default_model: String,
    pub temperature: Option<f32>,
    /// User-facing text for failed turns
    pub apology: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for RunConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_turns: config.max_turns,
            model_timeout: config.model_timeout(),
            tool_timeout: config.tool_timeout(),
            guardrail_timeout: config.guardrail_timeout(),
            transactional_context: config.transactional_context,
            default_model: config.default_model.clone(),
            temperature: config.temperature,
            apology: config.apology.clone(),
        }
    }
}

impl RunConfig {
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_guardrail_timeout(mut self, timeout: Duration) -> Self {
        self.guardrail_timeout = timeout;
        self
    }

    pub fn with_transactional_context(mut self, enabled: bool) -> Self {
        self.transactional_context = enabled;
        self
    }
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnOutcome {
    Responded,
    Refused,
    Failed,
}

/// Everything that came out of one user turn.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub outcome: TurnOutcome,
    /// Text shown to the user
    pub response: String,
    /// Agent active when the turn ended
    pub agent: String,
    pub items: Vec<RunItem>,
    pub usage: UsageStats,
    /// Internal diagnostic for refused and failed turns; never shown to users
    pub error: Option<String>,
}

impl TurnResult {
    pub fn is_responded(&self) -> bool {
        self.outcome == TurnOutcome::Responded
    }

    pub fn handoffs(&self) -> impl Iterator<Item = &HandoffItem> {
        self.items.iter().filter_map(|item| match item {
            RunItem::Handoff(h) => Some(h),
            _ => None,
        })
    }

    pub fn tool_outputs(&self) -> impl Iterator<Item = &ToolOutputItem> {
        self.items.iter().filter_map(|item| match item {
            RunItem::ToolOutput(o) => Some(o),
            _ => None,
        })
    }
}

/// User-facing refusal for a tripped guardrail.
pub fn refusal_message(reasoning: &str) -> String {
    let reasoning = reasoning.trim();
    if reasoning.is_empty() {
        "I'm sorry, I can't help with that request.".to_string()
    } else {
        format!("I'm sorry, I can't help with that request. {}", reasoning)
    }
}

struct TurnLog<C> {
    items: Vec<RunItem>,
    usage: UsageStats,
    /// Context and active agent at the start of Acting, for transactional turns
    checkpoint: Option<(C, AgentId)>,
}

/// Executes turns against a registry with one model provider.
pub struct Runner<C> {
    registry: Arc<AgentRegistry<C>>,
    provider: Arc<dyn ModelProvider>,
    config: RunConfig,
}

impl<C> Clone for Runner<C> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            provider: Arc::clone(&self.provider),
            config: self.config.clone(),
        }
    }
}

impl<C: AgentContext> Runner<C> {
    pub fn new(
        registry: Arc<AgentRegistry<C>>,
        provider: Arc<dyn ModelProvider>,
        config: RunConfig,
    ) -> Self {
        Self {
            registry,
            provider,
            config,
        }
    }

    pub fn registry(&self) -> &AgentRegistry<C> {
        &self.registry
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Opens a session on the registry's default agent.
    pub fn new_session(&self, id: impl Into<String>, context: C) -> Session<C> {
        Session::new(id, &self.registry, context)
    }

    /// Runs one user turn. Never returns an error: failures become
    /// [`TurnOutcome::Failed`] with the configured apology.
    pub async fn run_turn(&self, session: &mut Session<C>, input: impl Into<String>) -> TurnResult {
        let input = input.into();
        let mut log = TurnLog {
            items: Vec::new(),
            usage: UsageStats::new(),
            checkpoint: None,
        };
        info!(
            session = %session.id(),
            agent = %self.registry.name_of(session.active_agent()),
            "Starting turn"
        );

        let result = if session.is_ended() {
            Err(AgentsError::Cancelled)
        } else {
            let cancel = session.cancel_token();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(AgentsError::Cancelled),
                r = self.drive(session, &input, &mut log) => r,
            }
        };
        session.state = TurnState::Idle;

        let (outcome, response, error) = match result {
            Ok(reply) => (TurnOutcome::Responded, reply, None),
            Err(AgentsError::GuardrailTripwire {
                guardrail,
                reasoning,
            }) => {
                warn!(session = %session.id(), guardrail = %guardrail, reasoning = %reasoning, "Turn refused");
                let diagnostic = format!("{guardrail}: {reasoning}");
                (TurnOutcome::Refused, refusal_message(&reasoning), Some(diagnostic))
            }
            Err(err) => {
                error!(
                    session = %session.id(),
                    agent = %self.registry.name_of(session.active_agent()),
                    error = %err,
                    "Turn failed"
                );
                if let Some((snapshot, agent)) = log.checkpoint.take() {
                    if !session.context().is_closed() {
                        session.context().restore(snapshot);
                        session.active = agent;
                        debug!(session = %session.id(), "Rolled back context for failed turn");
                    }
                }
                (TurnOutcome::Failed, self.config.apology.clone(), Some(err.to_string()))
            }
        };

        TurnResult {
            outcome,
            response,
            agent: self.registry.name_of(session.active_agent()).to_string(),
            items: log.items,
            usage: log.usage,
            error,
        }
    }

    async fn drive(
        &self,
        session: &mut Session<C>,
        input: &str,
        log: &mut TurnLog<C>,
    ) -> Result<String> {
        session.state = TurnState::Guarding;
        self.guard(session, input, log).await?;

        session.state = TurnState::Acting;
        if self.config.transactional_context {
            log.checkpoint = Some((session.context().snapshot(), session.active_agent()));
        }

        let mut messages = session.history().to_vec();
        messages.push(Message::user(input));
        log.items.push(RunItem::Message(MessageItem {
            id: new_item_id(),
            agent: self.registry.name_of(session.active_agent()).to_string(),
            role: Role::User,
            content: input.to_string(),
            created_at: Utc::now(),
        }));

        for iteration in 0..self.config.max_turns {
            let active = session.active_agent();
            let agent = self.registry.agent(active);
            let instructions = session.context().read(|ctx| agent.render_instructions(ctx));

            let request = ModelRequest {
                model: agent
                    .model
                    .clone()
                    .unwrap_or_else(|| self.config.default_model.clone()),
                instructions,
                messages: messages.clone(),
                tools: agent.tool_specs(),
                handoffs: self.registry.handoff_specs(active),
                output_schema: None,
                temperature: agent.temperature.or(self.config.temperature),
                max_tokens: agent.max_tokens,
            };
            debug!(iteration, agent = %agent.name, "Calling model");
            debug!(
                target: "runner::messages",
                "\n=== Sending to provider (model: {}) ===\n{}\n=== end ===",
                request.model,
                format_messages_for_log(&request.instructions, &request.messages)
            );

            let deadline = self.config.model_timeout;
            let response = tokio::time::timeout(deadline, self.provider.complete(request))
                .await
                .map_err(|_| AgentsError::timeout("model call", deadline))??;
            log.usage.record(&agent.name, response.usage);

            match response.action {
                ModelAction::Reply(text) => {
                    messages.push(Message::assistant(text.clone()));
                    log.items.push(RunItem::Message(MessageItem {
                        id: new_item_id(),
                        agent: agent.name.clone(),
                        role: Role::Assistant,
                        content: text.clone(),
                        created_at: Utc::now(),
                    }));
                    session.history = messages;
                    info!(session = %session.id(), agent = %agent.name, "Turn responded");
                    return Ok(text);
                }
                ModelAction::Handoff(call) => {
                    let edge = HandoffRouter::resolve(&self.registry, active, &call.tool_name)?;
                    let arguments = match &call.reason {
                        Some(reason) => serde_json::json!({ "reason": reason }),
                        None => serde_json::json!({}),
                    };
                    messages.push(Message::assistant_with_tool_calls(
                        "",
                        vec![ToolCall::with_id(call.id.clone(), call.tool_name.clone(), arguments)],
                    ));

                    let target = HandoffRouter::execute(edge, session.context())?;
                    let to_name = self.registry.name_of(target).to_string();
                    info!(from = %agent.name, to = %to_name, hook = edge.has_hook(), "Handoff");

                    messages.push(Message::tool(
                        serde_json::json!({ "assistant": to_name }).to_string(),
                        call.id.clone(),
                    ));
                    debug!(
                        target: "runner::messages",
                        "\n↳ Appended handoff TOOL reply (tool_call_id={})\n{}\n---",
                        call.id,
                        format_messages_for_log("", &messages)
                    );
                    log.items.push(RunItem::Handoff(HandoffItem {
                        id: new_item_id(),
                        from_agent: agent.name.clone(),
                        to_agent: to_name,
                        reason: call.reason,
                        hook_ran: edge.has_hook(),
                        created_at: Utc::now(),
                    }));
                    session.active = target;
                }
                ModelAction::ToolCalls(calls) => {
                    messages.push(Message::assistant_with_tool_calls("", calls.clone()));
                    for call in calls {
                        log.items.push(RunItem::ToolCall(ToolCallItem {
                            id: new_item_id(),
                            agent: agent.name.clone(),
                            tool_name: call.name.clone(),
                            arguments: call.arguments.clone(),
                            created_at: Utc::now(),
                        }));

                        let response = self.invoke_tool(agent, session.context(), &call).await;
                        if let Err(failure) = &response.output {
                            warn!(agent = %agent.name, tool = %call.name, failure = %failure, "Tool failed");
                        }
                        let payload = response.model_payload();
                        messages.push(Message::tool(payload.to_string(), call.id.clone()));
                        log.items.push(RunItem::ToolOutput(ToolOutputItem {
                            id: new_item_id(),
                            tool_call_id: call.id,
                            output: payload,
                            error: response.output.err().map(|f| f.to_string()),
                            created_at: Utc::now(),
                        }));
                    }
                    debug!(
                        target: "runner::messages",
                        "\n↳ Appended TOOL replies\n{}\n---",
                        format_messages_for_log("", &messages)
                    );
                }
            }
        }

        Err(AgentsError::IterationCapExceeded {
            max_turns: self.config.max_turns,
        })
    }

    async fn guard(&self, session: &Session<C>, input: &str, log: &mut TurnLog<C>) -> Result<()> {
        let agent = self.registry.agent(session.active_agent());
        if agent.input_guardrails.is_empty() {
            return Ok(());
        }

        let snapshot = session.context().snapshot();
        let outcomes = GuardrailPipeline::run(
            &agent.input_guardrails,
            &snapshot,
            input,
            self.config.guardrail_timeout,
        )
        .await;

        for outcome in &outcomes {
            if let Ok(result) = &outcome.result {
                log.items.push(RunItem::Guardrail(GuardrailItem {
                    id: new_item_id(),
                    agent: agent.name.clone(),
                    guardrail: outcome.guardrail.clone(),
                    tripwire_triggered: result.tripwire_triggered,
                    reasoning: result.reasoning.clone(),
                    created_at: Utc::now(),
                }));
            }
        }

        GuardrailPipeline::decide(outcomes).map(|_| ())
    }

    async fn invoke_tool(
        &self,
        agent: &AgentDefinition<C>,
        context: &ContextHandle<C>,
        call: &ToolCall,
    ) -> ToolResponse {
        let Some(tool) = agent.tool(&call.name) else {
            return ToolResponse::failure(call.id.clone(), ToolFailure::UnknownTool(call.name.clone()));
        };
        if let Some(error) = &call.argument_error {
            let failure = ToolFailure::InvalidArguments(format!("arguments are not valid JSON: {error}"));
            return ToolResponse::failure(call.id.clone(), failure);
        }
        let request = ToolRequest {
            context: context.clone(),
            agent: agent.name.clone(),
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
        };
        match build_tool_stack(Arc::clone(tool), self.config.tool_timeout)
            .oneshot(request)
            .await
        {
            Ok(response) => response,
            Err(e) => ToolResponse::failure(call.id.clone(), ToolFailure::Execution(e.to_string())),
        }
    }
}
