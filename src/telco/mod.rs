//! Telco customer-service pack: context, tools, guardrails and agents wired
//! into a ready-to-run registry.

pub mod agents;
pub mod context;
pub mod guardrails;
pub mod tools;

pub use agents::{
    build_registry, on_bill_dispute_handoff, BILLING_AGENT, ESCALATION_AGENT, PRODUCT_AGENT,
    TRIAGE_AGENT,
};
pub use context::{TelcoContext, UNKNOWN};
pub use guardrails::{JailbreakOutput, RelevanceOutput, JAILBREAK_GUARDRAIL, RELEVANCE_GUARDRAIL};
