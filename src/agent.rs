//! # Agent definitions
//!
//! An [`AgentDefinition`] is the static description of one specialized agent:
//! a unique name, a handoff description other agents see when they may
//! transfer to it, an instruction template, tools, input guardrails and model
//! settings. Definitions are immutable once registered; who may hand off to
//! whom is declared separately on the registry builder.

use std::fmt;
use std::sync::Arc;

use crate::context::AgentContext;
use crate::guardrail::InputGuardrail;
use crate::tool::{Tool, ToolSpec};

type Template<C> = Arc<dyn Fn(&C) -> String + Send + Sync>;

/// Instruction template for an agent.
///
/// Dynamic templates are pure functions of `&C`: they can read session facts
/// but have no way to change them.
pub enum Instructions<C> {
    Static(String),
    Dynamic(Template<C>),
}

impl<C> Clone for Instructions<C> {
    fn clone(&self) -> Self {
        match self {
            Instructions::Static(text) => Instructions::Static(text.clone()),
            Instructions::Dynamic(f) => Instructions::Dynamic(Arc::clone(f)),
        }
    }
}

impl<C: AgentContext> Instructions<C> {
    pub fn dynamic(f: impl Fn(&C) -> String + Send + Sync + 'static) -> Self {
        Instructions::Dynamic(Arc::new(f))
    }

    pub fn render(&self, context: &C) -> String {
        match self {
            Instructions::Static(text) => text.clone(),
            Instructions::Dynamic(f) => f(context),
        }
    }
}

impl<C> From<&str> for Instructions<C> {
    fn from(text: &str) -> Self {
        Instructions::Static(text.to_string())
    }
}

impl<C> From<String> for Instructions<C> {
    fn from(text: String) -> Self {
        Instructions::Static(text)
    }
}

/// Static configuration of one agent.
pub struct AgentDefinition<C> {
    pub name: String,

    /// Shown to agents that can hand off to this one
    pub handoff_description: String,

    pub instructions: Instructions<C>,

    pub tools: Vec<Arc<dyn Tool<C>>>,

    /// Run against the latest user message whenever this agent is active
    pub input_guardrails: Vec<Arc<dyn InputGuardrail<C>>>,

    /// Falls back to the engine's default model when `None`
    pub model: Option<String>,

    pub temperature: Option<f32>,

    pub max_tokens: Option<u32>,
}

impl<C> Clone for AgentDefinition<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            handoff_description: self.handoff_description.clone(),
            instructions: self.instructions.clone(),
            tools: self.tools.clone(),
            input_guardrails: self.input_guardrails.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

impl<C: AgentContext> AgentDefinition<C> {
    pub fn new(name: impl Into<String>, instructions: impl Into<Instructions<C>>) -> Self {
        Self {
            name: name.into(),
            handoff_description: String::new(),
            instructions: instructions.into(),
            tools: Vec::new(),
            input_guardrails: Vec::new(),
            model: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_handoff_description(mut self, description: impl Into<String>) -> Self {
        self.handoff_description = description.into();
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool<C>>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_tools(mut self, tools: Vec<Arc<dyn Tool<C>>>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn with_input_guardrail(mut self, guardrail: Arc<dyn InputGuardrail<C>>) -> Self {
        self.input_guardrails.push(guardrail);
        self
    }

    pub fn with_input_guardrails(mut self, guardrails: Vec<Arc<dyn InputGuardrail<C>>>) -> Self {
        self.input_guardrails.extend(guardrails);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Looks up one of this agent's tools by name.
    pub fn tool(&self, name: &str) -> Option<&Arc<dyn Tool<C>>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn render_instructions(&self, context: &C) -> String {
        self.instructions.render(context)
    }
}

impl<C: AgentContext> fmt::Debug for AgentDefinition<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tools: Vec<&str> = self.tools.iter().map(|t| t.name()).collect();
        let guardrails: Vec<&str> = self.input_guardrails.iter().map(|g| g.name()).collect();
        f.debug_struct("AgentDefinition")
            .field("name", &self.name)
            .field("handoff_description", &self.handoff_description)
            .field("tools", &tools)
            .field("input_guardrails", &guardrails)
            .field("model", &self.model)
            .finish()
    }
}
