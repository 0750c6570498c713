//! Run requests and orchestrator settings.
//!
//! Both are plain serde types. Callers usually build [`RunConfig`] from a
//! JSON request; the headless runner loads both from RON files.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{Difficulty, Race};

/// Error type for configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File not found.
    #[error("Config file not found: {0}")]
    FileNotFound(String),
    /// Failed to read file.
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse RON.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    /// Failed to parse JSON.
    #[error("Failed to parse JSON config: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// What the run is for. Only affects bookkeeping, never the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RunMode {
    /// Agents are learning.
    #[default]
    Training,
    /// Agents are being evaluated.
    Performing,
}

/// Settings for one participant slot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSettings {
    /// Requested race.
    #[serde(default)]
    pub race: Race,
    /// Agent endpoint; absent means the engine AI plays this slot.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Bearer token for the endpoint.
    #[serde(default)]
    pub token: Option<String>,
    /// Engine AI strength when the slot has no agent.
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
}

impl AgentSettings {
    /// Slot played by a remote agent.
    #[must_use]
    pub fn agent(race: Race, endpoint: impl Into<String>) -> Self {
        Self {
            race,
            endpoint: Some(endpoint.into()),
            ..Default::default()
        }
    }

    /// Slot played by the engine AI.
    #[must_use]
    pub fn computer(race: Race) -> Self {
        Self {
            race,
            ..Default::default()
        }
    }

    /// Attach a bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Immutable snapshot of a run request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    /// Map or scenario to load.
    pub environment_id: String,
    /// Run mode.
    #[serde(default, alias = "modeId")]
    pub mode: RunMode,
    /// Participants in slot order.
    #[serde(default)]
    pub agents: Vec<AgentSettings>,
}

impl RunConfig {
    /// Create a config for `environment_id` with no participants.
    #[must_use]
    pub fn new(environment_id: impl Into<String>) -> Self {
        Self {
            environment_id: environment_id.into(),
            mode: RunMode::default(),
            agents: Vec::new(),
        }
    }

    /// Append a participant.
    #[must_use]
    pub fn with_agent(mut self, settings: AgentSettings) -> Self {
        self.agents.push(settings);
        self
    }

    /// Set the run mode.
    #[must_use]
    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Load a run config from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = read_config_file(path.as_ref())?;
        Self::from_ron_str(&contents)
    }

    /// Parse from a RON string.
    pub fn from_ron_str(ron: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(ron)?)
    }

    /// Parse from a JSON string (the shape outer front ends send).
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Orchestrator-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Upper bound on one agent call, in milliseconds.
    pub agent_timeout_ms: u64,
    /// Width of the reward vectors.
    pub reward_dims: usize,
    /// Keep an open engine connection across runs.
    pub reuse_connection: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            agent_timeout_ms: 5_000,
            reward_dims: 1,
            reuse_connection: true,
        }
    }
}

impl OrchestratorConfig {
    /// Agent call timeout as a [`Duration`].
    #[must_use]
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_timeout_ms)
    }

    /// Load from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = read_config_file(path.as_ref())?;
        Ok(ron::from_str(&contents)?)
    }
}

fn read_config_file(path: &Path) -> Result<String, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }
    Ok(std::fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_request() {
        let json = r#"{
            "environmentId": "MapA",
            "modeId": "Performing",
            "agents": [
                {"race": "RANDOM", "endpoint": "https://agent1", "token": "t0k"},
                {"race": "ZERG"}
            ]
        }"#;
        let config = RunConfig::from_json_str(json).unwrap();
        assert_eq!(config.environment_id, "MapA");
        assert_eq!(config.mode, RunMode::Performing);
        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.agents[0].token.as_deref(), Some("t0k"));
        assert_eq!(config.agents[1].race, Race::Zerg);
        assert!(config.agents[1].endpoint.is_none());
    }

    #[test]
    fn test_parse_ron_config() {
        let ron = r#"(
            environmentId: "Sandbox/TwoBases",
            agents: [
                (race: TERRAN, endpoint: Some("http://localhost:8080/graphql")),
                (race: RANDOM, difficulty: Some(HARD)),
            ],
        )"#;
        let config = RunConfig::from_ron_str(ron).unwrap();
        assert_eq!(config.mode, RunMode::Training);
        assert_eq!(config.agents[1].difficulty, Some(Difficulty::Hard));
    }

    #[test]
    fn test_load_missing_file() {
        let err = RunConfig::load("/definitely/not/here.ron").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_orchestrator_defaults() {
        let config: OrchestratorConfig = ron::from_str("()").unwrap();
        assert_eq!(config, OrchestratorConfig::default());
        assert_eq!(config.agent_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_builder() {
        let config = RunConfig::new("MapA")
            .with_agent(AgentSettings::agent(Race::Random, "https://agent1").with_token("x"))
            .with_agent(AgentSettings::computer(Race::Random))
            .with_mode(RunMode::Performing);
        assert_eq!(config.agents.len(), 2);
        assert_eq!(config.mode, RunMode::Performing);
    }
}
