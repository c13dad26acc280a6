//! Model abstraction for LLM interactions
//!
//! The engine treats inference as a black box behind [`ModelProvider`]: one
//! request in, at most one effect out. A response is a final reply, a batch
//! of tool calls, or a handoff request. Handoffs are advertised to the model
//! as ordinary function tools; the provider tells them apart by name.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolType,
        CreateChatCompletionRequestArgs, FunctionCall, FunctionObjectArgs, ResponseFormat,
        ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AgentsError, Result};
use crate::items::{new_call_id, Message, Role, ToolCall};
use crate::tool::ToolSpec;
use crate::usage::Usage;

/// JSON schema the model must answer with (structured output mode).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSchema {
    pub name: String,
    pub schema: Value,
}

impl OutputSchema {
    pub fn of<T: JsonSchema>(name: impl Into<String>) -> Self {
        let root = schemars::schema_for!(T);
        let schema = serde_json::to_value(&root.schema)
            .unwrap_or_else(|_| serde_json::json!({ "type": "object" }));
        Self {
            name: name.into(),
            schema,
        }
    }
}

/// Everything one model invocation needs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModelRequest {
    pub model: String,
    /// Rendered system instructions
    pub instructions: String,
    /// Conversation so far, without the system message
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    /// Handoff tools; a call to one of these is reported as [`ModelAction::Handoff`]
    pub handoffs: Vec<ToolSpec>,
    pub output_schema: Option<OutputSchema>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ModelRequest {
    pub fn new(model: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            instructions: instructions.into(),
            ..Default::default()
        }
    }
}

/// A request to transfer control, as emitted by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffCall {
    pub id: String,
    pub tool_name: String,
    pub reason: Option<String>,
}

/// The single effect of one model invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModelAction {
    Reply(String),
    ToolCalls(Vec<ToolCall>),
    Handoff(HandoffCall),
}

impl ModelAction {
    /// Classifies raw tool calls. The first call naming a handoff tool wins
    /// and any sibling calls are dropped.
    pub fn from_calls(calls: Vec<ToolCall>, handoffs: &[ToolSpec]) -> Self {
        let handoff = calls
            .iter()
            .find(|call| handoffs.iter().any(|h| h.name == call.name));
        match handoff {
            Some(call) => ModelAction::Handoff(HandoffCall {
                id: call.id.clone(),
                tool_name: call.name.clone(),
                reason: call
                    .arguments
                    .get("reason")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }),
            None => ModelAction::ToolCalls(calls),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub id: String,
    pub action: ModelAction,
    pub usage: Usage,
}

/// Trait for model providers
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Run one inference call
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse>;

    /// Provider name, for logs
    fn name(&self) -> &str;
}

/// OpenAI chat-completions provider using async-openai
pub struct OpenAIProvider {
    client: Client<OpenAIConfig>,
}

impl Default for OpenAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAIProvider {
    /// Create a provider reading `OPENAI_API_KEY` from the environment
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Create with a custom client
    pub fn with_client(client: Client<OpenAIConfig>) -> Self {
        Self { client }
    }

    fn convert_message(msg: &Message) -> Result<ChatCompletionRequestMessage> {
        let converted = match msg.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(msg.content.clone())
                .build()?
                .into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(msg.content.clone())
                .build()?
                .into(),
            Role::Assistant => {
                let mut builder = ChatCompletionRequestAssistantMessageArgs::default();
                if !msg.content.is_empty() {
                    builder.content(msg.content.clone());
                }
                if let Some(tool_calls) = &msg.tool_calls {
                    let calls: Vec<_> = tool_calls
                        .iter()
                        .map(|tc| ChatCompletionMessageToolCall {
                            id: tc.id.clone(),
                            r#type: ChatCompletionToolType::Function,
                            function: FunctionCall {
                                name: tc.name.clone(),
                                arguments: tc.arguments.to_string(),
                            },
                        })
                        .collect();
                    builder.tool_calls(calls);
                }
                builder.build()?.into()
            }
            Role::Tool => ChatCompletionRequestToolMessageArgs::default()
                .content(msg.content.clone())
                .tool_call_id(msg.tool_call_id.clone().unwrap_or_default())
                .build()?
                .into(),
        };
        Ok(converted)
    }

    fn convert_tool(spec: &ToolSpec) -> Result<ChatCompletionTool> {
        Ok(ChatCompletionToolArgs::default()
            .r#type(ChatCompletionToolType::Function)
            .function(
                FunctionObjectArgs::default()
                    .name(spec.name.clone())
                    .description(spec.description.clone())
                    .parameters(spec.parameters.clone())
                    .build()?,
            )
            .build()?)
    }
}

#[async_trait]
impl ModelProvider for OpenAIProvider {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(Self::convert_message(&Message::system(
            request.instructions.clone(),
        ))?);
        for msg in &request.messages {
            messages.push(Self::convert_message(msg)?);
        }

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(request.model.clone()).messages(messages);

        let tools = request
            .tools
            .iter()
            .chain(request.handoffs.iter())
            .map(Self::convert_tool)
            .collect::<Result<Vec<_>>>()?;
        if !tools.is_empty() {
            args.tools(tools);
        }
        if let Some(schema) = &request.output_schema {
            args.response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: None,
                    name: schema.name.clone(),
                    schema: Some(schema.schema.clone()),
                    strict: None,
                },
            });
        }
        if let Some(temp) = request.temperature {
            args.temperature(temp);
        }
        if let Some(max) = request.max_tokens {
            args.max_completion_tokens(max);
        }

        let response = self.client.chat().create(args.build()?).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentsError::ModelBehavior {
                message: "no choices in response".to_string(),
            })?;

        let calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall::from_raw(tc.id, tc.function.name, &tc.function.arguments))
            .collect();

        let action = if !calls.is_empty() {
            ModelAction::from_calls(calls, &request.handoffs)
        } else {
            match choice.message.content {
                Some(text) => ModelAction::Reply(text),
                None => {
                    return Err(AgentsError::ModelBehavior {
                        message: "response has neither content nor tool calls".to_string(),
                    })
                }
            }
        };

        let usage = response
            .usage
            .map(|u| Usage::new(u.prompt_tokens as usize, u.completion_tokens as usize))
            .unwrap_or_default();

        Ok(ModelResponse {
            id: response.id,
            action,
            usage,
        })
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// One queued step of a [`ScriptedProvider`].
#[derive(Debug, Clone)]
pub enum Scripted {
    Respond(ModelAction),
    /// Fail the call with a [`AgentsError::ModelCall`]
    Fail(String),
    /// Sleep, then fail; pair with a short timeout to simulate a hung call
    Stall(Duration),
}

/// Deterministic provider for tests and demos.
///
/// Requests whose instructions contain a registered needle get that rule's
/// action; everything else pops the queue in order. Every request is recorded.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    rules: Mutex<Vec<(String, ModelAction)>>,
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(self, step: Scripted) -> Self {
        lock(&self.script).push_back(step);
        self
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Scripted::Respond(ModelAction::Reply(text.into())))
    }

    pub fn tool_call(self, name: impl Into<String>, arguments: Value) -> Self {
        self.push(Scripted::Respond(ModelAction::ToolCalls(vec![ToolCall::new(
            name, arguments,
        )])))
    }

    pub fn handoff(self, tool_name: impl Into<String>) -> Self {
        self.push(Scripted::Respond(ModelAction::Handoff(HandoffCall {
            id: new_call_id(),
            tool_name: tool_name.into(),
            reason: None,
        })))
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push(Scripted::Fail(message.into()))
    }

    pub fn stall(self, duration: Duration) -> Self {
        self.push(Scripted::Stall(duration))
    }

    /// Answer every request whose instructions contain `needle` with `action`.
    pub fn when_instructions_contain(self, needle: impl Into<String>, action: ModelAction) -> Self {
        lock(&self.rules).push((needle.into(), action));
        self
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse> {
        let ruled = lock(&self.rules)
            .iter()
            .find(|(needle, _)| request.instructions.contains(needle.as_str()))
            .map(|(_, action)| Scripted::Respond(action.clone()));
        lock(&self.requests).push(request);

        let step = match ruled {
            Some(step) => Some(step),
            None => lock(&self.script).pop_front(),
        };

        match step {
            Some(Scripted::Respond(action)) => Ok(ModelResponse {
                id: crate::items::new_item_id(),
                action,
                usage: Usage::new(10, 5),
            }),
            Some(Scripted::Fail(message)) => Err(AgentsError::ModelCall { message }),
            Some(Scripted::Stall(duration)) => {
                tokio::time::sleep(duration).await;
                Err(AgentsError::ModelCall {
                    message: "scripted stall elapsed".to_string(),
                })
            }
            None => Err(AgentsError::ModelCall {
                message: "script exhausted".to_string(),
            }),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
