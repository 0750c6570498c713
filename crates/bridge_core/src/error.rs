//! Error types for the orchestration core.
//!
//! Every error that ends up in a run [`Status`](crate::status::Status) is
//! rendered through its `Display` impl first, so the status never carries
//! opaque failure objects.

use thiserror::Error;

use crate::config::ConfigError;
use crate::engine::CommandResult;
use crate::status::StatusCode;

/// Result type alias using [`BridgeError`].
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Failures reported by the simulation engine adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The engine could not be reached.
    #[error("Engine connection failed: {0}")]
    Connection(String),

    /// The engine refused to start a match.
    #[error("Failed to start match on '{map}': {message}")]
    MatchStart {
        /// Map or scenario that was requested.
        map: String,
        /// Error message.
        message: String,
    },

    /// The engine failed while a match was in progress.
    #[error("Engine failure: {0}")]
    Engine(String),
}

/// Failures of a single request/response call to a remote agent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The call did not complete within the configured timeout.
    #[error("Agent request timed out after {0} ms")]
    Timeout(u64),

    /// The agent could not be reached or answered with a failure status.
    #[error("Agent request failed: {0}")]
    Request(String),

    /// The agent answered, but the payload did not match the schema.
    #[error("Malformed agent response: {0}")]
    Malformed(String),

    /// The endpoint could not be used to open a transport.
    #[error("Invalid agent endpoint '{endpoint}': {message}")]
    InvalidEndpoint {
        /// Endpoint as configured.
        endpoint: String,
        /// Error message.
        message: String,
    },
}

/// Top-level error type for the orchestration core.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Engine unreachable or failing.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Remote agent unreachable, malformed response or timeout.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The run request cannot be executed as configured.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The engine rejected a submitted action.
    #[error("Engine rejected ability {ability_id} for slot {slot}: {result}")]
    EngineCommand {
        /// Player slot that issued the command.
        slot: usize,
        /// Ability that was submitted.
        ability_id: u32,
        /// Result code reported by the engine.
        result: CommandResult,
    },

    /// Status transition not allowed by the lifecycle rules.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status code.
        from: StatusCode,
        /// Requested status code.
        to: StatusCode,
    },

    /// Failed to load or parse a configuration file.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
