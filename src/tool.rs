//! Tool system for agents
//!
//! A tool is a named function with a JSON argument schema and an async
//! execution function `(context, args) -> result | failure`. Tools may read
//! and write the session context through the [`ContextHandle`] they receive.
//!
//! A failing tool never unwinds the turn: it returns a [`ToolFailure`], which
//! the runner serializes back to the acting agent so the model can decide to
//! ask the user again, escalate, or apologize. The engine never retries a tool
//! on its own.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::context::{AgentContext, ContextHandle};

/// Result of a single tool execution.
pub type ToolOutcome = std::result::Result<Value, ToolFailure>;

/// Structured failure reported back to the invoking agent.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ToolFailure {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Execution(String),
}

impl ToolFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            ToolFailure::InvalidArguments(_) => "invalid_arguments",
            ToolFailure::UnknownTool(_) => "unknown_tool",
            ToolFailure::Timeout(_) => "timeout",
            ToolFailure::Unavailable(_) => "unavailable",
            ToolFailure::Execution(_) => "execution",
        }
    }

    /// The JSON payload the model receives in place of a tool result.
    pub fn to_model_payload(&self) -> Value {
        serde_json::json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        })
    }
}

/// What the model is told about a callable function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Trait for all tools that agents can invoke
#[async_trait]
pub trait Tool<C: AgentContext>: Send + Sync {
    /// Get the name of the tool
    fn name(&self) -> &str;

    /// Get the description of the tool
    fn description(&self) -> &str;

    /// Get the JSON schema for the tool's parameters
    fn parameters_schema(&self) -> Value;

    /// Execute the tool against the session context
    async fn call(&self, context: ContextHandle<C>, arguments: Value) -> ToolOutcome;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

type Handler<C> =
    Arc<dyn Fn(ContextHandle<C>, Value) -> BoxFuture<'static, ToolOutcome> + Send + Sync>;

/// A closure-backed tool
pub struct FunctionTool<C> {
    name: String,
    description: String,
    parameters_schema: Value,
    handler: Handler<C>,
}

impl<C> Clone for FunctionTool<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters_schema: self.parameters_schema.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<C> std::fmt::Debug for FunctionTool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters_schema", &self.parameters_schema)
            .finish()
    }
}

impl<C: AgentContext> FunctionTool<C> {
    /// Create a tool from a synchronous JSON-in/JSON-out function
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: Value,
        function: F,
    ) -> Self
    where
        F: Fn(&ContextHandle<C>, Value) -> ToolOutcome + Send + Sync + 'static,
    {
        let handler: Handler<C> = Arc::new(move |ctx: ContextHandle<C>, args: Value| {
            let out = function(&ctx, args);
            Box::pin(futures::future::ready(out)) as BoxFuture<'static, ToolOutcome>
        });
        Self {
            name: name.into(),
            description: description.into(),
            parameters_schema,
            handler,
        }
    }

    /// Create a tool from an async function
    pub fn from_async<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters_schema: Value,
        function: F,
    ) -> Self
    where
        F: Fn(ContextHandle<C>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolOutcome> + Send + 'static,
    {
        let handler: Handler<C> = Arc::new(move |ctx: ContextHandle<C>, args: Value| {
            Box::pin(function(ctx, args)) as BoxFuture<'static, ToolOutcome>
        });
        Self {
            name: name.into(),
            description: description.into(),
            parameters_schema,
            handler,
        }
    }
}

#[async_trait]
impl<C: AgentContext> Tool<C> for FunctionTool<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters_schema.clone()
    }

    async fn call(&self, context: ContextHandle<C>, arguments: Value) -> ToolOutcome {
        (self.handler)(context, arguments).await
    }
}

/// Create a tool from a typed async handler.
///
/// - `A` is the argument struct (`Deserialize + JsonSchema`); its schema is
///   what the model sees, and arguments that do not decode become
///   [`ToolFailure::InvalidArguments`].
/// - `R` is the output type (`Serialize`).
pub fn typed_tool<C, A, R, F, Fut>(
    name: impl Into<String>,
    description: impl Into<String>,
    handler: F,
) -> FunctionTool<C>
where
    C: AgentContext,
    A: DeserializeOwned + JsonSchema + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(ContextHandle<C>, A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<R, ToolFailure>> + Send + 'static,
{
    let schema = schemars::schema_for!(A);
    let parameters = serde_json::to_value(&schema.schema)
        .unwrap_or_else(|_| serde_json::json!({ "type": "object" }));
    let handler = Arc::new(handler);
    FunctionTool::from_async(name, description, parameters, move |ctx, raw: Value| {
        let handler = Arc::clone(&handler);
        async move {
            let args: A = serde_json::from_value(raw)
                .map_err(|e| ToolFailure::InvalidArguments(e.to_string()))?;
            let out = (handler.as_ref())(ctx, args).await?;
            serde_json::to_value(out).map_err(|e| ToolFailure::Execution(e.to_string()))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Notes {
        last_city: Option<String>,
    }

    #[derive(Debug, Deserialize, JsonSchema)]
    struct WeatherArgs {
        city: String,
    }

    #[test]
    fn test_tool_failure_payload() {
        let failure = ToolFailure::Timeout(250);
        assert_eq!(failure.kind(), "timeout");
        assert_eq!(
            failure.to_model_payload(),
            serde_json::json!({"error": {"kind": "timeout", "message": "timed out after 250 ms"}})
        );
    }

    #[tokio::test]
    async fn test_function_tool_execution() {
        let tool = FunctionTool::<Notes>::new(
            "reverse",
            "Reverses a string",
            serde_json::json!({"type": "object"}),
            |_ctx, args| {
                let input = args.get("input").and_then(Value::as_str).unwrap_or("");
                Ok(Value::String(input.chars().rev().collect()))
            },
        );
        let ctx = ContextHandle::new(Notes::default());

        let out = tool
            .call(ctx, serde_json::json!({"input": "hello"}))
            .await
            .unwrap();
        assert_eq!(out, Value::String("olleh".to_string()));
        assert_eq!(tool.spec().name, "reverse");
    }

    #[tokio::test]
    async fn test_typed_tool_schema_and_context_write() {
        let tool = typed_tool(
            "weather",
            "Weather for a city",
            |ctx: ContextHandle<Notes>, args: WeatherArgs| async move {
                ctx.update(|n| n.last_city = Some(args.city.clone()))
                    .map_err(|e| ToolFailure::Execution(e.to_string()))?;
                Ok::<_, ToolFailure>(serde_json::json!({"city": args.city, "temp": 22}))
            },
        );

        let schema = tool.parameters_schema();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"]["city"].is_object());

        let ctx = ContextHandle::new(Notes::default());
        let out = tool
            .call(ctx.clone(), serde_json::json!({"city": "Singapore"}))
            .await
            .unwrap();
        assert_eq!(out["temp"], 22);
        assert_eq!(ctx.snapshot().last_city, Some("Singapore".to_string()));
    }

    #[tokio::test]
    async fn test_typed_tool_rejects_bad_arguments() {
        let tool = typed_tool(
            "weather",
            "Weather for a city",
            |_ctx: ContextHandle<Notes>, args: WeatherArgs| async move {
                Ok::<_, ToolFailure>(args.city)
            },
        );

        let err = tool
            .call(
                ContextHandle::new(Notes::default()),
                serde_json::json!({"town": 1}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolFailure::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_failure_is_a_value() {
        let tool = FunctionTool::<Notes>::new(
            "failing_tool",
            "A tool that fails",
            serde_json::json!({}),
            |_, _| Err(ToolFailure::Unavailable("database offline".to_string())),
        );

        let err = tool
            .call(ContextHandle::new(Notes::default()), Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "service unavailable: database offline");
    }
}
