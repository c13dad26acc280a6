//! The four telco agents and the handoff graph between them.
//!
//! ```text
//! Triage ──▶ Product Recommendation ──▶ Triage
//!   │  └───▶ Bill Dispute Resolve ───▶ Triage   (hook: assign account number)
//!   └──────▶ Escalation
//! ```

use std::sync::Arc;

use rand::Rng;

use crate::agent::{AgentDefinition, Instructions};
use crate::config::EngineConfig;
use crate::error::ConfigError;
use crate::handoff::{default_tool_name, Handoff};
use crate::model::ModelProvider;
use crate::registry::{AgentRegistry, RegistryBuilder};
use crate::retrieval::SimilaritySearch;

use super::context::TelcoContext;
use super::guardrails::{jailbreak_guardrail, relevance_guardrail};
use super::tools::{
    bill_dispute_classification_tool, contract_retrieval_tool, product_recommendation_tool,
    usage_history_fetch_tool, BILL_DISPUTE_CLASSIFICATION_TOOL, CONTRACT_RETRIEVAL_TOOL,
    PRODUCT_RECOMMENDATION_TOOL, USAGE_HISTORY_FETCH_TOOL,
};

pub const TRIAGE_AGENT: &str = "Triage Agent";
pub const PRODUCT_AGENT: &str = "Product Recommendation Agent";
pub const BILLING_AGENT: &str = "Bill Dispute Resolve Agent";
pub const ESCALATION_AGENT: &str = "Escalation Agent";

const HANDOFF_PROMPT_PREFIX: &str = "\
# System context
You are one of several cooperating agents. Each agent owns a narrow task and \
can transfer the conversation to another agent by calling a function named \
transfer_to_<agent_name>. Transfers happen in the background; do not mention \
them to the customer.";

/// Assigns a fresh synthetic 8-digit account number on every transfer into
/// billing, replacing any number already on the context.
pub fn on_bill_dispute_handoff(ctx: &mut TelcoContext) {
    let number: u32 = rand::thread_rng().gen_range(10_000_000..=99_999_999);
    ctx.account_number = Some(number.to_string());
}

fn triage_instructions() -> String {
    format!(
        "{HANDOFF_PROMPT_PREFIX}\n\
         You are a helpful triage agent. Use your tools to delegate questions to the right agent. \
         If you need more information to decide, ask the customer.\n\
         - Questions about products and services we offer: call {product}.\n\
         - Questions about understanding a bill or disputing one: call {billing}.\n\
         - Other valid service questions not covered above: call {escalation}.",
        product = default_tool_name(PRODUCT_AGENT),
        billing = default_tool_name(BILLING_AGENT),
        escalation = default_tool_name(ESCALATION_AGENT),
    )
}

fn product_instructions(_ctx: &TelcoContext) -> String {
    format!(
        "{HANDOFF_PROMPT_PREFIX}\n\
         You are a product recommendation agent. You were most likely transferred here by the triage agent.\n\
         Routine:\n\
         1. Use {PRODUCT_RECOMMENDATION_TOOL} to make a recommendation, and answer with its output unchanged.\n\
         If the customer asks something outside this routine, transfer back with {triage}.",
        triage = default_tool_name(TRIAGE_AGENT),
    )
}

/// Billing instructions embed the current account number (or `[unknown]`).
pub fn billing_instructions(ctx: &TelcoContext) -> String {
    format!(
        "{HANDOFF_PROMPT_PREFIX}\n\
         You are a bill dispute resolve agent. You were most likely transferred here by the triage agent.\n\
         Routine:\n\
         1. The customer's account number is {account}. If it is not available, ask the customer for it. \
         If it is, ask the customer to confirm it is the account they mean; confirm only once per conversation.\n\
         2. Use {BILL_DISPUTE_CLASSIFICATION_TOOL} to classify the dispute. Ask for more detail if you cannot classify it.\n\
         3. If the category is Usage Dispute, call {USAGE_HISTORY_FETCH_TOOL} and answer concisely from its output. \
         If the category is Explain Contract and the question is unclear, ask the customer more; once it is clear, \
         call {CONTRACT_RETRIEVAL_TOOL} and answer from the returned passages, starting with \
         'Based on the retrieved information, '.\n\
         If the customer asks something outside this routine, transfer back with {triage}.",
        account = ctx.account_number_or_unknown(),
        triage = default_tool_name(TRIAGE_AGENT),
    )
}

const ESCALATION_INSTRUCTIONS: &str = "\
You handle complex or sensitive customer issues that need special attention. \
Address the customer's concerns with extra care and detail.";

/// Builds the telco registry.
///
/// `guardrail_provider` backs the relevance and jailbreak checks; `search`
/// backs the contract lookup tool.
pub fn build_registry(
    guardrail_provider: Arc<dyn ModelProvider>,
    search: Arc<dyn SimilaritySearch>,
    config: &EngineConfig,
) -> Result<AgentRegistry<TelcoContext>, ConfigError> {
    let relevance = relevance_guardrail(Arc::clone(&guardrail_provider), &config.guardrail_model);
    let jailbreak = jailbreak_guardrail(guardrail_provider, &config.guardrail_model);
    let guardrails = vec![relevance, jailbreak];

    let triage = AgentDefinition::new(TRIAGE_AGENT, triage_instructions())
        .with_handoff_description(
            "A triage agent that can delegate a customer's request to the appropriate agent.",
        )
        .with_model(config.default_model.clone())
        .with_input_guardrails(guardrails.clone());

    let product = AgentDefinition::new(PRODUCT_AGENT, Instructions::dynamic(product_instructions))
        .with_handoff_description("A helpful agent that can recommend products to the customer.")
        .with_model(config.default_model.clone())
        .with_tool(product_recommendation_tool())
        .with_input_guardrails(guardrails.clone());

    let billing = AgentDefinition::new(BILLING_AGENT, Instructions::dynamic(billing_instructions))
        .with_handoff_description(
            "A helpful agent that can classify a bill dispute and then take action to resolve it.",
        )
        .with_model(config.default_model.clone())
        .with_tools(vec![
            bill_dispute_classification_tool(),
            usage_history_fetch_tool(),
            contract_retrieval_tool(search, config.retrieval_k),
        ])
        .with_input_guardrails(guardrails);

    let escalation = AgentDefinition::new(ESCALATION_AGENT, ESCALATION_INSTRUCTIONS)
        .with_handoff_description("Handles complex or sensitive customer issues.");

    RegistryBuilder::new()
        .agent(triage)
        .agent(product)
        .agent(billing)
        .agent(escalation)
        .default_agent(TRIAGE_AGENT)
        .handoff(TRIAGE_AGENT, Handoff::to(PRODUCT_AGENT))
        .handoff(
            TRIAGE_AGENT,
            Handoff::to(BILLING_AGENT).on_handoff(on_bill_dispute_handoff),
        )
        .handoff(TRIAGE_AGENT, Handoff::to(ESCALATION_AGENT))
        .handoff(PRODUCT_AGENT, Handoff::to(TRIAGE_AGENT))
        .handoff(BILLING_AGENT, Handoff::to(TRIAGE_AGENT))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScriptedProvider;
    use crate::retrieval::InMemoryPassages;
    use pretty_assertions::assert_eq;

    fn registry() -> AgentRegistry<TelcoContext> {
        build_registry(
            Arc::new(ScriptedProvider::new()),
            Arc::new(InMemoryPassages::default()),
            &EngineConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_graph_shape() {
        let registry = registry();
        let id = |name| registry.id_of(name).unwrap();

        assert_eq!(registry.default_agent(), id(TRIAGE_AGENT));
        assert_eq!(registry.edges_from(id(TRIAGE_AGENT)).count(), 3);
        assert!(registry.edge(id(PRODUCT_AGENT), id(TRIAGE_AGENT)).is_some());
        assert!(registry.edge(id(BILLING_AGENT), id(TRIAGE_AGENT)).is_some());
        assert!(registry.edge(id(ESCALATION_AGENT), id(TRIAGE_AGENT)).is_none());
        assert!(registry.edge(id(PRODUCT_AGENT), id(BILLING_AGENT)).is_none());

        let billing_edge = registry.edge(id(TRIAGE_AGENT), id(BILLING_AGENT)).unwrap();
        assert!(billing_edge.has_hook());
        assert_eq!(billing_edge.tool_name, "transfer_to_bill_dispute_resolve_agent");
    }

    #[test]
    fn test_guardrails_everywhere_but_escalation() {
        let registry = registry();
        for (_, agent) in registry.agents() {
            let expected = if agent.name == ESCALATION_AGENT { 0 } else { 2 };
            assert_eq!(agent.input_guardrails.len(), expected, "{}", agent.name);
        }
    }

    #[test]
    fn test_hook_replaces_existing_account_number() {
        let mut ctx = TelcoContext {
            account_number: Some("1".to_string()),
            ..TelcoContext::default()
        };
        on_bill_dispute_handoff(&mut ctx);

        let assigned = ctx.account_number.unwrap();
        assert_eq!(assigned.len(), 8);
        assert!(assigned.chars().all(|c| c.is_ascii_digit()));
        assert_ne!(assigned, "1");
    }

    #[test]
    fn test_billing_instructions_embed_account() {
        let unknown = billing_instructions(&TelcoContext::default());
        assert!(unknown.contains("account number is [unknown]"));

        let known = billing_instructions(&TelcoContext {
            customer_name: None,
            account_number: Some("12345678".to_string()),
        });
        assert!(known.contains("account number is 12345678"));
    }
}
