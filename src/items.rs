//! Items representing messages, tool calls and the per-turn run log
//!
//! `Message` is what the model sees; `RunItem` is what the engine records
//! about a turn (and what operators read back when a turn goes wrong).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Role in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A message in the conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::plain(Role::Assistant, content)
        }
    }

    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::plain(Role::Tool, content)
        }
    }
}

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    /// Parse error for argument text that was not valid JSON; `arguments`
    /// is null in that case.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument_error: Option<String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self::with_id(new_call_id(), name, arguments)
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            argument_error: None,
        }
    }

    /// Builds a call from the raw argument text a model produced. Blank
    /// text means no arguments.
    pub fn from_raw(id: impl Into<String>, name: impl Into<String>, raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::with_id(id, name, Value::Object(Default::default()));
        }
        match serde_json::from_str(raw) {
            Ok(arguments) => Self::with_id(id, name, arguments),
            Err(e) => Self {
                argument_error: Some(e.to_string()),
                ..Self::with_id(id, name, Value::Null)
            },
        }
    }
}

/// One step of a turn, in the order it happened
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunItem {
    Guardrail(GuardrailItem),
    Message(MessageItem),
    ToolCall(ToolCallItem),
    ToolOutput(ToolOutputItem),
    Handoff(HandoffItem),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailItem {
    pub id: String,
    pub agent: String,
    pub guardrail: String,
    pub tripwire_triggered: bool,
    pub reasoning: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageItem {
    pub id: String,
    pub agent: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallItem {
    pub id: String,
    pub agent: String,
    pub tool_name: String,
    pub arguments: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutputItem {
    pub id: String,
    pub tool_call_id: String,
    pub output: Value,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffItem {
    pub id: String,
    pub from_agent: String,
    pub to_agent: String,
    pub reason: Option<String>,
    pub hook_ran: bool,
    pub created_at: DateTime<Utc>,
}

pub(crate) fn new_item_id() -> String {
    Uuid::new_v4().to_string()
}

/// Fresh `call_`-prefixed id for a tool or handoff call.
pub(crate) fn new_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_message_creation() {
        let user_msg = Message::user("Hello");
        assert_eq!(user_msg.role, Role::User);
        assert_eq!(user_msg.content, "Hello");
        assert!(user_msg.tool_call_id.is_none());

        let tool_msg = Message::tool("Result", "call_123");
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.tool_call_id, Some("call_123".to_string()));

        let call = ToolCall::new("lookup", serde_json::json!({"q": "sim"}));
        let assistant = Message::assistant_with_tool_calls("", vec![call.clone()]);
        assert_eq!(assistant.tool_calls, Some(vec![call]));
    }

    #[test]
    fn test_tool_call_ids_are_unique() {
        let a = ToolCall::new("t", Value::Null);
        let b = ToolCall::new("t", Value::Null);
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("call_"));

        let id = new_call_id();
        assert!(id.starts_with("call_"));
        assert_eq!(id.len(), "call_".len() + 32);
        assert_ne!(id, new_call_id());
    }

    #[test]
    fn test_from_raw_keeps_parse_error() {
        let ok = ToolCall::from_raw("call_1", "lookup", r#"{"q": "sim"}"#);
        assert_eq!(ok.arguments, serde_json::json!({"q": "sim"}));
        assert_eq!(ok.argument_error, None);

        let blank = ToolCall::from_raw("call_2", "lookup", "");
        assert_eq!(blank.arguments, serde_json::json!({}));
        assert_eq!(blank.argument_error, None);

        let broken = ToolCall::from_raw("call_3", "lookup", r#"{"q": "sim""#);
        assert_eq!(broken.id, "call_3");
        assert_eq!(broken.arguments, Value::Null);
        assert!(broken.argument_error.unwrap().contains("EOF"));
    }

    #[test]
    fn test_run_item_tagging() {
        let item = RunItem::Handoff(HandoffItem {
            id: "h1".to_string(),
            from_agent: "Triage Agent".to_string(),
            to_agent: "Escalation Agent".to_string(),
            reason: None,
            hook_ran: false,
            created_at: Utc::now(),
        });

        let serialized = serde_json::to_string(&item).unwrap();
        assert!(serialized.contains("\"type\":\"Handoff\""));
        assert!(serialized.contains("\"from_agent\":\"Triage Agent\""));
    }

    #[test]
    fn test_role_serialization() {
        let serialized = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(serialized, "\"assistant\"");

        let deserialized: Role = serde_json::from_str("\"tool\"").unwrap();
        assert_eq!(deserialized, Role::Tool);
    }
}
