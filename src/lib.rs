//! # Switchboard
//!
//! A multi-agent conversation routing engine. Several specialized agents
//! share one conversation; exactly one of them is active at a time and
//! control moves between them by handoffs along a declared graph.
//!
//! ## Core Concepts
//!
//! - **Registry**: validated set of agents plus the directed handoff edges between them
//! - **Guardrails**: input checks that run concurrently before any agent acts; a trip refuses the turn
//! - **Tools**: typed functions an agent may call, each behind a Tower timeout layer
//! - **Handoffs**: edges exposed to the model as `transfer_to_<agent>` tools, optionally with a context hook
//! - **Sessions**: per-conversation context, history and active agent, driven by a [`Runner`]
//!
//! ## Getting Started
//!
//! Set your OpenAI API key in the `OPENAI_API_KEY` environment variable.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use switchboard::telco::{build_registry, TelcoContext};
//! use switchboard::{EngineConfig, InMemoryPassages, OpenAIProvider, RunConfig, Runner, SessionManager};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let config = EngineConfig::default();
//! let provider = Arc::new(OpenAIProvider::new());
//! let passages = Arc::new(InMemoryPassages::new(["Early termination incurs a fee."]));
//!
//! let registry = build_registry(provider.clone(), passages, &config)?;
//! let runner = Runner::new(Arc::new(registry), provider, RunConfig::from(&config));
//! let manager: SessionManager<TelcoContext> = SessionManager::new(runner);
//!
//! let reply = manager.handle("session-1", "I have a problem with my bill").await;
//! println!("[{}] {}", reply.agent, reply.response);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod context;
pub mod error;
pub mod guardrail;
pub mod handoff;
pub mod items;
pub mod model;
pub mod registry;
pub mod retrieval;
pub mod runner;
pub mod service;
pub mod sessions;
pub mod telco;
pub mod tool;
pub mod usage;

// Public re-exports for convenience
pub use agent::{AgentDefinition, Instructions};
pub use config::{ConfigBuilder, EngineConfig};
pub use context::{AgentContext, ContextHandle};
pub use error::{AgentsError, ConfigError, Result};
pub use guardrail::{
    GuardrailPipeline, GuardrailResult, InputGuardrail, KeywordGuardrail, MaxLengthGuardrail,
    ModelGuardrail, Verdict,
};
pub use handoff::{Handoff, HandoffEdge, HandoffRouter};
pub use items::{Message, Role, RunItem, ToolCall};
pub use model::{
    ModelAction, ModelProvider, ModelRequest, ModelResponse, OpenAIProvider, ScriptedProvider,
};
pub use registry::{AgentId, AgentRegistry, RegistryBuilder};
pub use retrieval::{InMemoryPassages, Passage, SearchError, SimilaritySearch};
pub use runner::{RunConfig, Runner, TurnOutcome, TurnResult};
pub use sessions::{Session, SessionManager, TurnReply, TurnState};
pub use tool::{typed_tool, FunctionTool, Tool, ToolFailure, ToolOutcome};
pub use usage::{Usage, UsageStats};

// Re-export Tower traits that users need
pub use tower::{Layer, Service, ServiceExt};
