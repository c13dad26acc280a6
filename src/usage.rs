//! Token usage accounting for model calls made during a turn.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::{Add, AddAssign};

/// Token usage for a single model call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
    /// Number of model requests folded into this value.
    pub request_count: usize,
}

impl Usage {
    pub fn new(prompt_tokens: usize, completion_tokens: usize) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            request_count: 1,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl Add for Usage {
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self += other;
        self
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.request_count += other.request_count;
    }
}

/// Usage for one turn, broken down by the agent that spent it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageStats {
    pub total: Usage,
    pub by_agent: HashMap<String, Usage>,
}

impl UsageStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, agent: &str, usage: Usage) {
        self.total += usage.clone();
        *self.by_agent.entry(agent.to_string()).or_default() += usage;
    }
}
