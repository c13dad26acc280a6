//! Capability registry: the closed set of agents and the directed handoff
//! graph between them.
//!
//! The registry is assembled with [`RegistryBuilder`] and validated once in
//! [`RegistryBuilder::build`]; after that agents are addressed by [`AgentId`]
//! and lookups cannot fail for ids the registry handed out.

use std::collections::{HashMap, HashSet};

use crate::agent::AgentDefinition;
use crate::context::AgentContext;
use crate::error::ConfigError;
use crate::handoff::{default_tool_name, Handoff, HandoffEdge};
use crate::tool::ToolSpec;

/// Index of an agent inside its registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(usize);

impl AgentId {
    pub fn index(self) -> usize {
        self.0
    }
}

pub struct RegistryBuilder<C> {
    agents: Vec<AgentDefinition<C>>,
    handoffs: Vec<(String, Handoff<C>)>,
    default_agent: Option<String>,
}

impl<C: AgentContext> Default for RegistryBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: AgentContext> RegistryBuilder<C> {
    pub fn new() -> Self {
        Self {
            agents: Vec::new(),
            handoffs: Vec::new(),
            default_agent: None,
        }
    }

    pub fn agent(mut self, agent: AgentDefinition<C>) -> Self {
        self.agents.push(agent);
        self
    }

    /// Declares a directed edge `from -> handoff.target`.
    pub fn handoff(mut self, from: impl Into<String>, handoff: Handoff<C>) -> Self {
        self.handoffs.push((from.into(), handoff));
        self
    }

    /// Agent new sessions start with. Defaults to the first registered agent.
    pub fn default_agent(mut self, name: impl Into<String>) -> Self {
        self.default_agent = Some(name.into());
        self
    }

    pub fn build(self) -> Result<AgentRegistry<C>, ConfigError> {
        if self.agents.is_empty() {
            return Err(ConfigError::EmptyRegistry);
        }

        let mut index = HashMap::with_capacity(self.agents.len());
        for (i, agent) in self.agents.iter().enumerate() {
            if index.insert(agent.name.clone(), AgentId(i)).is_some() {
                return Err(ConfigError::DuplicateAgent(agent.name.clone()));
            }
        }

        let lookup = |referenced_by: String, name: &str| {
            index
                .get(name)
                .copied()
                .ok_or_else(|| ConfigError::UnknownAgent {
                    referenced_by,
                    name: name.to_string(),
                })
        };

        let default_agent = match &self.default_agent {
            Some(name) => lookup("default agent".to_string(), name)?,
            None => AgentId(0),
        };

        let mut edges: Vec<HandoffEdge<C>> = Vec::with_capacity(self.handoffs.len());
        for (from_name, handoff) in self.handoffs {
            let from = lookup("handoff source".to_string(), &from_name)?;
            let to = lookup(format!("handoff from '{from_name}'"), &handoff.target)?;
            if edges.iter().any(|e| e.from == from && e.to == to) {
                return Err(ConfigError::DuplicateHandoff {
                    from: from_name,
                    to: handoff.target,
                });
            }
            let target = &self.agents[to.0];
            edges.push(HandoffEdge {
                from,
                to,
                tool_name: handoff
                    .tool_name
                    .unwrap_or_else(|| default_tool_name(&target.name)),
                description: handoff
                    .description
                    .unwrap_or_else(|| target.handoff_description.clone()),
                hook: handoff.on_handoff,
            });
        }

        for (i, agent) in self.agents.iter().enumerate() {
            let mut seen = HashSet::new();
            let names = agent.tools.iter().map(|t| t.name().to_string()).chain(
                edges
                    .iter()
                    .filter(|e| e.from == AgentId(i))
                    .map(|e| e.tool_name.clone()),
            );
            for name in names {
                if !seen.insert(name.clone()) {
                    return Err(ConfigError::ToolNameCollision {
                        agent: agent.name.clone(),
                        tool: name,
                    });
                }
            }
        }

        Ok(AgentRegistry {
            agents: self.agents,
            index,
            edges,
            default_agent,
        })
    }
}

/// Validated, immutable set of agents and handoff edges.
pub struct AgentRegistry<C> {
    agents: Vec<AgentDefinition<C>>,
    index: HashMap<String, AgentId>,
    edges: Vec<HandoffEdge<C>>,
    default_agent: AgentId,
}

impl<C: AgentContext> AgentRegistry<C> {
    /// # Panics
    /// If `id` was issued by a different registry.
    pub fn agent(&self, id: AgentId) -> &AgentDefinition<C> {
        &self.agents[id.0]
    }

    pub fn name_of(&self, id: AgentId) -> &str {
        &self.agent(id).name
    }

    pub fn id_of(&self, name: &str) -> Option<AgentId> {
        self.index.get(name).copied()
    }

    pub fn default_agent(&self) -> AgentId {
        self.default_agent
    }

    pub fn agents(&self) -> impl Iterator<Item = (AgentId, &AgentDefinition<C>)> {
        self.agents.iter().enumerate().map(|(i, a)| (AgentId(i), a))
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn edges_from(&self, from: AgentId) -> impl Iterator<Item = &HandoffEdge<C>> {
        self.edges.iter().filter(move |e| e.from == from)
    }

    pub fn edge(&self, from: AgentId, to: AgentId) -> Option<&HandoffEdge<C>> {
        self.edges.iter().find(|e| e.from == from && e.to == to)
    }

    pub fn edge_by_tool(&self, from: AgentId, tool_name: &str) -> Option<&HandoffEdge<C>> {
        self.edges_from(from).find(|e| e.tool_name == tool_name)
    }

    /// Handoff tools advertised to the model while `id` is active.
    pub fn handoff_specs(&self, id: AgentId) -> Vec<ToolSpec> {
        self.edges_from(id).map(HandoffEdge::tool_spec).collect()
    }
}

impl<C: AgentContext> std::fmt::Debug for AgentRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.agents)
            .field("edges", &self.edges)
            .field("default_agent", &self.default_agent)
            .finish()
    }
}
