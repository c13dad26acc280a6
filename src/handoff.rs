//! # Agent Handoff System
//!
//! A handoff transfers conversational control from one agent to another
//! along a directed edge declared in the registry. The model sees each
//! outgoing edge of the active agent as a function tool
//! (`transfer_to_<target>` by default) whose description is the target's
//! handoff description.
//!
//! An edge may carry a transition hook. The hook is the only place besides a
//! tool where session context gets written: it runs exactly once per handoff,
//! under the context write lock, before the target's instructions are
//! rendered.
//!
//! ```rust
//! use switchboard::{AgentDefinition, Handoff, RegistryBuilder};
//!
//! #[derive(Clone, Default)]
//! struct Ctx {
//!     ticket: Option<u32>,
//! }
//!
//! let registry = RegistryBuilder::<Ctx>::new()
//!     .agent(AgentDefinition::new("Triage", "Route the caller."))
//!     .agent(
//!         AgentDefinition::new("Billing", "Resolve bills.")
//!             .with_handoff_description("Handles billing questions."),
//!     )
//!     .handoff(
//!         "Triage",
//!         Handoff::to("Billing").on_handoff(|ctx: &mut Ctx| {
//!             ctx.ticket.get_or_insert(42);
//!         }),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let triage = registry.id_of("Triage").unwrap();
//! assert_eq!(registry.handoff_specs(triage)[0].name, "transfer_to_billing");
//! ```

use std::fmt;
use std::sync::Arc;

use crate::context::{AgentContext, ContextHandle};
use crate::error::{AgentsError, Result};
use crate::registry::{AgentId, AgentRegistry};
use crate::tool::ToolSpec;

/// Side effect run when a handoff edge is taken.
pub type HandoffHook<C> = Arc<dyn Fn(&mut C) + Send + Sync>;

/// Declaration of an outgoing edge, as given to the registry builder.
pub struct Handoff<C> {
    pub target: String,
    pub tool_name: Option<String>,
    pub description: Option<String>,
    pub on_handoff: Option<HandoffHook<C>>,
}

impl<C: AgentContext> Handoff<C> {
    pub fn to(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            tool_name: None,
            description: None,
            on_handoff: None,
        }
    }

    /// Overrides the `transfer_to_<target>` tool name.
    pub fn with_tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name = Some(name.into());
        self
    }

    /// Overrides the target's handoff description for this edge.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn on_handoff(mut self, hook: impl Fn(&mut C) + Send + Sync + 'static) -> Self {
        self.on_handoff = Some(Arc::new(hook));
        self
    }
}

/// A validated edge of the handoff graph.
pub struct HandoffEdge<C> {
    pub from: AgentId,
    pub to: AgentId,
    pub tool_name: String,
    pub description: String,
    pub hook: Option<HandoffHook<C>>,
}

impl<C> HandoffEdge<C> {
    /// How the model sees this edge.
    pub fn tool_spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.tool_name.clone(),
            description: self.description.clone(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "reason": {"type": "string", "description": "Reason for handoff"}
                }
            }),
        }
    }

    pub fn has_hook(&self) -> bool {
        self.hook.is_some()
    }
}

impl<C> fmt::Debug for HandoffEdge<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandoffEdge")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("tool_name", &self.tool_name)
            .field("has_hook", &self.has_hook())
            .finish()
    }
}

/// Lowercases and joins words with underscores: `"Escalation Agent"` →
/// `"escalation_agent"`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

pub fn default_tool_name(agent_name: &str) -> String {
    format!("transfer_to_{}", snake_case(agent_name))
}

/// Validates and executes transfers of control.
pub struct HandoffRouter;

impl HandoffRouter {
    /// Finds the edge the model asked for by tool name.
    pub fn resolve<'r, C: AgentContext>(
        registry: &'r AgentRegistry<C>,
        from: AgentId,
        tool_name: &str,
    ) -> Result<&'r HandoffEdge<C>> {
        registry
            .edge_by_tool(from, tool_name)
            .ok_or_else(|| AgentsError::UnreachableHandoff {
                from: registry.name_of(from).to_string(),
                to: tool_name.to_string(),
            })
    }

    /// Finds the edge between two agents.
    pub fn route<'r, C: AgentContext>(
        registry: &'r AgentRegistry<C>,
        from: AgentId,
        to: AgentId,
    ) -> Result<&'r HandoffEdge<C>> {
        registry
            .edge(from, to)
            .ok_or_else(|| AgentsError::UnreachableHandoff {
                from: registry.name_of(from).to_string(),
                to: registry.name_of(to).to_string(),
            })
    }

    /// Runs the edge's hook, if any, and returns the new active agent.
    ///
    /// Fails with [`AgentsError::Cancelled`] if the context was closed; the
    /// hook then does not run.
    pub fn execute<C: AgentContext>(
        edge: &HandoffEdge<C>,
        context: &ContextHandle<C>,
    ) -> Result<AgentId> {
        if let Some(hook) = &edge.hook {
            context.update(|ctx| hook(ctx))?;
        } else if context.is_closed() {
            return Err(AgentsError::Cancelled);
        }
        Ok(edge.to)
    }

    /// `route` followed by `execute`.
    pub fn transfer<C: AgentContext>(
        registry: &AgentRegistry<C>,
        from: AgentId,
        to: AgentId,
        context: &ContextHandle<C>,
    ) -> Result<AgentId> {
        let edge = Self::route(registry, from, to)?;
        Self::execute(edge, context)
    }
}
