//! Tools used by the telco agents.
//!
//! The recommendation and classification tools are keyword rules; the usage
//! lookup returns a fixed record. Only the contract lookup talks to an
//! external collaborator (the passage index).

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::context::ContextHandle;
use crate::retrieval::{SearchError, SimilaritySearch};
use crate::tool::{typed_tool, Tool, ToolFailure};

use super::context::TelcoContext;

pub const PRODUCT_RECOMMENDATION_TOOL: &str = "product_recom_tool";
pub const BILL_DISPUTE_CLASSIFICATION_TOOL: &str = "bill_dispute_classification_tool";
pub const USAGE_HISTORY_FETCH_TOOL: &str = "usage_history_fetch_tool";
pub const CONTRACT_RETRIEVAL_TOOL: &str = "rag_contract_tool";

pub const ESCALATION_NOTICE: &str = "I'm sorry, I will escalate this issue to a human expert.";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CustomerQuestion {
    /// The customer's question, in their words
    pub question: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UsageHistoryArgs {
    pub account_number: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ContractQuery {
    pub account_number: String,
    pub question: String,
}

/// Dispute categories the billing agent acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisputeCategory {
    #[serde(rename = "Usage Dispute")]
    UsageDispute,
    #[serde(rename = "Explain Contract")]
    ExplainContract,
}

impl DisputeCategory {
    pub fn label(self) -> &'static str {
        match self {
            DisputeCategory::UsageDispute => "Usage Dispute",
            DisputeCategory::ExplainContract => "Explain Contract",
        }
    }
}

pub fn recommend_product(question: &str) -> &'static str {
    let q = question.to_lowercase();
    if q.contains("mobile") || q.contains("phone") {
        "Singtel offers mobile phone plans."
    } else if q.contains("data roaming") {
        "Singtel offers data roaming plans."
    } else if q.contains("sim") {
        "Singtel offers SIM cards and eSIM."
    } else {
        ESCALATION_NOTICE
    }
}

pub fn classify_dispute(question: &str) -> Option<DisputeCategory> {
    let q = question.to_lowercase();
    if q.contains("usage") || q.contains("overcharge") {
        Some(DisputeCategory::UsageDispute)
    } else if q.contains("explain") || q.contains("understand") {
        Some(DisputeCategory::ExplainContract)
    } else {
        None
    }
}

pub fn product_recommendation_tool() -> Arc<dyn Tool<TelcoContext>> {
    Arc::new(typed_tool(
        PRODUCT_RECOMMENDATION_TOOL,
        "Recommend products.",
        |_ctx: ContextHandle<TelcoContext>, args: CustomerQuestion| async move {
            Ok::<_, ToolFailure>(recommend_product(&args.question))
        },
    ))
}

pub fn bill_dispute_classification_tool() -> Arc<dyn Tool<TelcoContext>> {
    Arc::new(typed_tool(
        BILL_DISPUTE_CLASSIFICATION_TOOL,
        "Classify bill dispute.",
        |_ctx: ContextHandle<TelcoContext>, args: CustomerQuestion| async move {
            let label = classify_dispute(&args.question)
                .map(DisputeCategory::label)
                .unwrap_or(ESCALATION_NOTICE);
            Ok::<_, ToolFailure>(label)
        },
    ))
}

/// Returns the usage record and remembers the account number if the
/// session did not have one yet.
pub fn usage_history_fetch_tool() -> Arc<dyn Tool<TelcoContext>> {
    Arc::new(typed_tool(
        USAGE_HISTORY_FETCH_TOOL,
        "Fetch usage history",
        |ctx: ContextHandle<TelcoContext>, args: UsageHistoryArgs| async move {
            let account = args.account_number.trim().to_string();
            if account.is_empty() {
                return Err(ToolFailure::InvalidArguments(
                    "account_number must not be empty".to_string(),
                ));
            }
            ctx.update(|c| {
                c.account_number.get_or_insert(account);
            })
            .map_err(|e| ToolFailure::Execution(e.to_string()))?;
            Ok::<_, ToolFailure>("Usage history. Data usage: 10G; Talking: 200 mins.")
        },
    ))
}

/// Contract lookup against the passage index; returns the passage texts.
pub fn contract_retrieval_tool(
    search: Arc<dyn SimilaritySearch>,
    k: usize,
) -> Arc<dyn Tool<TelcoContext>> {
    Arc::new(typed_tool(
        CONTRACT_RETRIEVAL_TOOL,
        "Retrieve contract terms",
        move |_ctx: ContextHandle<TelcoContext>, args: ContractQuery| {
            let search = Arc::clone(&search);
            async move {
                let passages = search
                    .search(&args.question, k)
                    .await
                    .map_err(|e| match e {
                        SearchError::Unavailable(msg) => ToolFailure::Unavailable(msg),
                        SearchError::Query(msg) => ToolFailure::Execution(msg),
                    })?;
                Ok::<_, ToolFailure>(passages.into_iter().map(|p| p.text).collect::<Vec<_>>())
            }
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::InMemoryPassages;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ctx() -> ContextHandle<TelcoContext> {
        ContextHandle::new(TelcoContext::default())
    }

    #[test]
    fn test_product_rules() {
        assert_eq!(recommend_product("Any new PHONE deals?"), "Singtel offers mobile phone plans.");
        assert_eq!(recommend_product("data roaming in Japan"), "Singtel offers data roaming plans.");
        assert_eq!(recommend_product("I want an eSIM"), "Singtel offers SIM cards and eSIM.");
        assert_eq!(recommend_product("fibre broadband"), ESCALATION_NOTICE);
    }

    #[test]
    fn test_dispute_rules() {
        assert_eq!(
            classify_dispute("I was overcharged for usage"),
            Some(DisputeCategory::UsageDispute)
        );
        assert_eq!(
            classify_dispute("Please explain this fee"),
            Some(DisputeCategory::ExplainContract)
        );
        assert_eq!(classify_dispute("hello"), None);
    }

    #[tokio::test]
    async fn test_classification_tool_output() {
        let out = bill_dispute_classification_tool()
            .call(ctx(), json!({"question": "why the overcharge?"}))
            .await
            .unwrap();
        assert_eq!(out, json!("Usage Dispute"));
    }

    #[tokio::test]
    async fn test_usage_tool_records_account_once() {
        let ctx = ctx();
        let tool = usage_history_fetch_tool();

        tool.call(ctx.clone(), json!({"account_number": "11112222"}))
            .await
            .unwrap();
        tool.call(ctx.clone(), json!({"account_number": "99998888"}))
            .await
            .unwrap();

        assert_eq!(ctx.snapshot().account_number.as_deref(), Some("11112222"));
    }

    #[tokio::test]
    async fn test_usage_tool_rejects_missing_account() {
        let err = usage_history_fetch_tool()
            .call(ctx(), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolFailure::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_contract_tool_returns_passages() {
        let index = Arc::new(InMemoryPassages::new([
            "Early termination incurs a fee.",
            "Roaming is billed per MB.",
        ]));
        let out = contract_retrieval_tool(index, 3)
            .call(
                ctx(),
                json!({"account_number": "1", "question": "termination fee"}),
            )
            .await
            .unwrap();
        assert_eq!(out, json!(["Early termination incurs a fee."]));
    }
}
