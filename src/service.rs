//! Tower-based tool execution primitives and layers.
//!
//! Every tool call goes through a small service stack:
//! `TimeoutLayer` → [`BaseToolService`] → [`Tool::call`]. Failures of any kind
//! come back as `Ok(ToolResponse)` carrying a [`ToolFailure`], so the runner
//! can hand them to the model instead of aborting the turn.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use serde_json::Value;
use tokio::time::timeout;
use tower::{util::BoxService, BoxError, Layer, Service};

use crate::context::{AgentContext, ContextHandle};
use crate::tool::{Tool, ToolFailure, ToolOutcome};

/// Request passed into the tool service stack.
pub struct ToolRequest<C> {
    pub context: ContextHandle<C>,
    pub agent: String,
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

impl<C> Clone for ToolRequest<C> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            agent: self.agent.clone(),
            tool_call_id: self.tool_call_id.clone(),
            tool_name: self.tool_name.clone(),
            arguments: self.arguments.clone(),
        }
    }
}

/// Response from the tool service stack.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResponse {
    pub tool_call_id: String,
    pub output: ToolOutcome,
}

impl ToolResponse {
    pub fn success(tool_call_id: impl Into<String>, output: Value) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            output: Ok(output),
        }
    }

    pub fn failure(tool_call_id: impl Into<String>, failure: ToolFailure) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            output: Err(failure),
        }
    }

    /// The JSON value fed back to the model for this call.
    pub fn model_payload(&self) -> Value {
        match &self.output {
            Ok(value) => value.clone(),
            Err(failure) => failure.to_model_payload(),
        }
    }
}

type ServiceFuture = Pin<Box<dyn Future<Output = Result<ToolResponse, BoxError>> + Send>>;

/// Base tool executor adapting `dyn Tool<C>` to a Tower Service.
pub struct BaseToolService<C> {
    tool: Arc<dyn Tool<C>>,
}

impl<C> Clone for BaseToolService<C> {
    fn clone(&self) -> Self {
        Self {
            tool: Arc::clone(&self.tool),
        }
    }
}

impl<C: AgentContext> BaseToolService<C> {
    pub fn new(tool: Arc<dyn Tool<C>>) -> Self {
        Self { tool }
    }
}

impl<C: AgentContext> Service<ToolRequest<C>> for BaseToolService<C> {
    type Response = ToolResponse;
    type Error = BoxError;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ToolRequest<C>) -> Self::Future {
        let tool = Arc::clone(&self.tool);
        Box::pin(async move {
            let output = tool.call(req.context, req.arguments).await;
            Ok(ToolResponse {
                tool_call_id: req.tool_call_id,
                output,
            })
        })
    }
}

/// Deadline layer; an elapsed deadline becomes [`ToolFailure::Timeout`].
#[derive(Clone, Copy, Debug)]
pub struct TimeoutLayer {
    duration: Duration,
}

impl TimeoutLayer {
    pub fn from_duration(duration: Duration) -> Self {
        Self { duration }
    }
}

#[derive(Clone, Debug)]
pub struct TimeoutService<S> {
    inner: S,
    duration: Duration,
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService {
            inner,
            duration: self.duration,
        }
    }
}

impl<S, C> Service<ToolRequest<C>> for TimeoutService<S>
where
    S: Service<ToolRequest<C>, Response = ToolResponse, Error = BoxError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    C: AgentContext,
{
    type Response = ToolResponse;
    type Error = BoxError;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: ToolRequest<C>) -> Self::Future {
        let mut inner = self.inner.clone();
        let d = self.duration;
        let call_id = req.tool_call_id.clone();
        Box::pin(async move {
            match timeout(d, inner.call(req)).await {
                Ok(res) => res,
                Err(_elapsed) => Ok(ToolResponse::failure(
                    call_id,
                    ToolFailure::Timeout(d.as_millis() as u64),
                )),
            }
        })
    }
}

/// Boxed service type used by the runner.
pub type ToolBoxService<C> = BoxService<ToolRequest<C>, ToolResponse, BoxError>;

/// Builds the service stack for one tool.
pub fn build_tool_stack<C: AgentContext>(
    tool: Arc<dyn Tool<C>>,
    deadline: Duration,
) -> ToolBoxService<C> {
    let base = BaseToolService::new(tool);
    BoxService::new(TimeoutLayer::from_duration(deadline).layer(base))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::FunctionTool;
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    fn request(ctx: &ContextHandle<u32>, arguments: Value) -> ToolRequest<u32> {
        ToolRequest {
            context: ctx.clone(),
            agent: "Triage Agent".into(),
            tool_call_id: "call_1".into(),
            tool_name: "t".into(),
            arguments,
        }
    }

    #[tokio::test]
    async fn test_base_service_success_and_failure() {
        let ctx = ContextHandle::new(0u32);
        let ok: Arc<dyn Tool<u32>> = Arc::new(FunctionTool::new(
            "echo",
            "echo",
            Value::Null,
            |_, args| Ok(args),
        ));
        let resp = BaseToolService::new(ok)
            .oneshot(request(&ctx, serde_json::json!({"x": 1})))
            .await
            .unwrap();
        assert_eq!(resp, ToolResponse::success("call_1", serde_json::json!({"x": 1})));

        let bad: Arc<dyn Tool<u32>> = Arc::new(FunctionTool::new(
            "bad",
            "bad",
            Value::Null,
            |_, _| Err(ToolFailure::Execution("nope".into())),
        ));
        let resp = BaseToolService::new(bad)
            .oneshot(request(&ctx, Value::Null))
            .await
            .unwrap();
        assert_eq!(
            resp.model_payload(),
            serde_json::json!({"error": {"kind": "execution", "message": "nope"}})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_layer_maps_to_tool_failure() {
        let slow: Arc<dyn Tool<u32>> = Arc::new(FunctionTool::from_async(
            "slow",
            "sleeps",
            Value::Null,
            |_, _| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Value::Null)
            },
        ));
        let ctx = ContextHandle::new(0u32);

        let resp = build_tool_stack(slow, Duration::from_millis(50))
            .oneshot(request(&ctx, Value::Null))
            .await
            .unwrap();
        assert_eq!(resp.output, Err(ToolFailure::Timeout(50)));
        assert_eq!(resp.tool_call_id, "call_1");
    }

    #[tokio::test]
    async fn test_tool_sees_session_context() {
        let ctx = ContextHandle::new(0u32);
        let bump: Arc<dyn Tool<u32>> = Arc::new(FunctionTool::<u32>::new(
            "bump",
            "increments",
            Value::Null,
            |ctx, _| {
                ctx.update(|n| *n += 1)
                    .map_err(|e| ToolFailure::Execution(e.to_string()))?;
                Ok(Value::Null)
            },
        ));

        build_tool_stack(bump, Duration::from_secs(1))
            .oneshot(request(&ctx, Value::Null))
            .await
            .unwrap();
        assert_eq!(ctx.snapshot(), 1);
    }
}
