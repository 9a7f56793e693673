use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};

const MAX_SESSION_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Timing and policy knobs for conversation flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Seconds the user has to answer a naming prompt.
    pub name_response_timeout_secs: u64,
    /// Seconds before a suggested name is accepted on the user's behalf.
    pub suggestion_timeout_secs: u64,
    /// Whether the suggestion timer is armed at all.
    pub auto_proceed_suggestions: bool,
    /// Fixed lifetime of a session context.
    pub session_ttl_secs: u64,
    /// Capacity hint for transition observers.
    pub event_buffer: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            name_response_timeout_secs: 10,
            suggestion_timeout_secs: 5,
            auto_proceed_suggestions: true,
            session_ttl_secs: 30 * 60,
            event_buffer: 64,
        }
    }
}

fn parse_bool_env(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

fn parse_secs_env(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|e| FlowError::Config(format!("{} must be a whole number of seconds: {}", key, e)))
}

impl FlowConfig {
    /// Defaults, then the TOML file at `path` if it exists, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_toml_str(&std::fs::read_to_string(path)?)?,
            _ => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str::<FlowConfig>(content)?)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var("FLOW_NAME_TIMEOUT_SECS") {
            self.name_response_timeout_secs = parse_secs_env("FLOW_NAME_TIMEOUT_SECS", &value)?;
        }
        if let Ok(value) = std::env::var("FLOW_SUGGESTION_TIMEOUT_SECS") {
            self.suggestion_timeout_secs =
                parse_secs_env("FLOW_SUGGESTION_TIMEOUT_SECS", &value)?;
        }
        if let Ok(value) = std::env::var("FLOW_AUTO_PROCEED") {
            self.auto_proceed_suggestions = parse_bool_env(&value);
        }
        if let Ok(value) = std::env::var("FLOW_SESSION_TTL_SECS") {
            self.session_ttl_secs = parse_secs_env("FLOW_SESSION_TTL_SECS", &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_ttl_secs == 0 {
            return Err(FlowError::Config(
                "session_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.session_ttl_secs > MAX_SESSION_TTL_SECS {
            return Err(FlowError::Config(format!(
                "session_ttl_secs must be at most {} seconds",
                MAX_SESSION_TTL_SECS
            )));
        }
        if self.event_buffer == 0 {
            return Err(FlowError::Config(
                "event_buffer must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn name_response_timeout(&self) -> Duration {
        Duration::from_secs(self.name_response_timeout_secs)
    }

    pub fn suggestion_timeout(&self) -> Duration {
        Duration::from_secs(self.suggestion_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}
