//! Configuration for the routing engine
//!
//! [`EngineConfig`] holds the knobs shared by every session: models, sampling,
//! the per-turn iteration cap, deadlines for external calls, and whether a
//! failed turn rolls back its context mutations. It can be built in code,
//! read from `SWITCHBOARD_*` environment variables, or loaded from TOML.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Default apology shown to the user when a turn fails.
pub const DEFAULT_APOLOGY: &str =
    "Sorry, something went wrong on our side. Please try again in a moment.";

/// Engine-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Model used by agents that do not name one
    pub default_model: String,

    /// Model used by model-backed guardrails
    pub guardrail_model: String,

    /// Default temperature for generation
    pub temperature: Option<f32>,

    /// Maximum model invocations per turn
    pub max_turns: usize,

    pub model_timeout_secs: u64,

    pub tool_timeout_secs: u64,

    pub guardrail_timeout_secs: u64,

    /// Restore the context snapshot when a turn fails
    pub transactional_context: bool,

    /// Text returned to the user for failed turns
    pub apology: String,

    /// Number of passages the contract lookup tool retrieves
    pub retrieval_k: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_model: "gpt-4.1".to_string(),
            guardrail_model: "gpt-4.1-mini".to_string(),
            temperature: None,
            max_turns: 10,
            model_timeout_secs: 30,
            tool_timeout_secs: 10,
            guardrail_timeout_secs: 15,
            transactional_context: false,
            apology: DEFAULT_APOLOGY.to_string(),
            retrieval_k: 3,
        }
    }
}

impl EngineConfig {
    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn guardrail_timeout(&self) -> Duration {
        Duration::from_secs(self.guardrail_timeout_secs)
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_turns == 0 {
            return Err(invalid("max_turns", "must be greater than zero"));
        }
        if self.default_model.trim().is_empty() {
            return Err(invalid("default_model", "must not be empty"));
        }
        if self.guardrail_model.trim().is_empty() {
            return Err(invalid("guardrail_model", "must not be empty"));
        }
        for (key, secs) in [
            ("model_timeout_secs", self.model_timeout_secs),
            ("tool_timeout_secs", self.tool_timeout_secs),
            ("guardrail_timeout_secs", self.guardrail_timeout_secs),
        ] {
            if secs == 0 {
                return Err(invalid(key, "must be greater than zero"));
            }
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(invalid("temperature", "must be between 0.0 and 2.0"));
            }
        }
        if self.retrieval_k == 0 {
            return Err(invalid("retrieval_k", "must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidSetting {
        key: key.to_string(),
        message: message.to_string(),
    }
}

fn whole_secs(key: &str, timeout: Duration) -> Result<u64, ConfigError> {
    if timeout.is_zero() || timeout.subsec_nanos() != 0 {
        return Err(invalid(key, "must be a positive whole number of seconds"));
    }
    Ok(timeout.as_secs())
}

/// Configuration builder
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: EngineConfig,
    error: Option<ConfigError>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.default_model = model.into();
        self
    }

    pub fn guardrail_model(mut self, model: impl Into<String>) -> Self {
        self.config.guardrail_model = model.into();
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.config.temperature = Some(temp);
        self
    }

    pub fn max_turns(mut self, max_turns: usize) -> Self {
        self.config.max_turns = max_turns;
        self
    }

    /// Timeouts are kept in whole seconds; anything finer is rejected by
    /// [`build`](Self::build).
    pub fn model_timeout(mut self, timeout: Duration) -> Self {
        match whole_secs("model_timeout", timeout) {
            Ok(secs) => self.config.model_timeout_secs = secs,
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        match whole_secs("tool_timeout", timeout) {
            Ok(secs) => self.config.tool_timeout_secs = secs,
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    pub fn guardrail_timeout(mut self, timeout: Duration) -> Self {
        match whole_secs("guardrail_timeout", timeout) {
            Ok(secs) => self.config.guardrail_timeout_secs = secs,
            Err(e) => {
                self.error.get_or_insert(e);
            }
        }
        self
    }

    pub fn transactional_context(mut self, enabled: bool) -> Self {
        self.config.transactional_context = enabled;
        self
    }

    pub fn apology(mut self, text: impl Into<String>) -> Self {
        self.config.apology = text.into();
        self
    }

    pub fn retrieval_k(mut self, k: usize) -> Self {
        self.config.retrieval_k = k;
        self
    }

    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Load configuration from `SWITCHBOARD_*` environment variables.
pub fn from_env() -> Result<EngineConfig, ConfigError> {
    from_lookup(|key| std::env::var(key).ok())
}

fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<EngineConfig, ConfigError> {
    let mut config = EngineConfig::default();

    if let Some(model) = lookup("SWITCHBOARD_MODEL") {
        config.default_model = model;
    }
    if let Some(model) = lookup("SWITCHBOARD_GUARDRAIL_MODEL") {
        config.guardrail_model = model;
    }
    if let Some(raw) = lookup("SWITCHBOARD_TEMPERATURE") {
        config.temperature = Some(parse("SWITCHBOARD_TEMPERATURE", &raw)?);
    }
    if let Some(raw) = lookup("SWITCHBOARD_MAX_TURNS") {
        config.max_turns = parse("SWITCHBOARD_MAX_TURNS", &raw)?;
    }
    if let Some(raw) = lookup("SWITCHBOARD_TIMEOUT_SECS") {
        config.model_timeout_secs = parse("SWITCHBOARD_TIMEOUT_SECS", &raw)?;
    }
    if let Some(raw) = lookup("SWITCHBOARD_TOOL_TIMEOUT_SECS") {
        config.tool_timeout_secs = parse("SWITCHBOARD_TOOL_TIMEOUT_SECS", &raw)?;
    }
    if let Some(raw) = lookup("SWITCHBOARD_GUARDRAIL_TIMEOUT_SECS") {
        config.guardrail_timeout_secs = parse("SWITCHBOARD_GUARDRAIL_TIMEOUT_SECS", &raw)?;
    }
    if let Some(raw) = lookup("SWITCHBOARD_TRANSACTIONAL") {
        config.transactional_context = raw.eq_ignore_ascii_case("true") || raw == "1";
    }

    config.validate()?;
    Ok(config)
}

fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidSetting {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Load configuration from a TOML file. Missing keys take their defaults.
pub fn from_file(path: impl AsRef<Path>) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let file_error = |message: String| ConfigError::File {
        path: path.display().to_string(),
        message,
    };
    let contents = std::fs::read_to_string(path).map_err(|e| file_error(e.to_string()))?;
    let config: EngineConfig = toml::from_str(&contents).map_err(|e| file_error(e.to_string()))?;
    config.validate()?;
    Ok(config)
}
