//! # Bridge Core
//!
//! Orchestration core that couples a real-time simulation engine with one or
//! more remotely hosted decision-making agents.
//!
//! Once per engine frame the core:
//! - Encodes the engine state into a wire-safe observation
//! - Sends it to the agent for that player slot
//! - Decodes the returned action and applies it to the engine
//! - Updates the per-agent statistics and continuation context
//!
//! The engine and the agent transport are external collaborators, reached
//! only through the [`engine::EngineAdapter`] and
//! [`transport::AgentTransport`] traits.
//!
//! ## Crate Structure
//!
//! - [`status`] - Run status codes and the transition rules
//! - [`protocol`] - Wire schema exchanged with agents and callers
//! - [`codec`] - Raw engine entities to wire records and back
//! - [`session`] - Per-slot agent session state
//! - [`stepper`] - One observation/action exchange per frame
//! - [`run`] - The [`Orchestrator`] owning the active run

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod reward;
pub mod run;
pub mod session;
pub mod status;
pub mod stepper;
pub mod transport;

pub use run::Orchestrator;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::codec::{decode_action, encode_action, encode_observation, DecodedAction};
    pub use crate::config::{AgentSettings, OrchestratorConfig, RunConfig, RunMode};
    pub use crate::engine::{
        Alliance, CommandResult, ConnectionHandle, Difficulty, EngineAdapter, EngineCommand,
        EngineFrame, FrameHooks, MatchFuture, MatchResult, Participant, PlayerCommon, Race,
        RawOrder, RawPosition, RawUnit,
    };
    pub use crate::error::{BridgeError, EngineError, Result, TransportError};
    pub use crate::protocol::{
        AgentAction, AgentContext, AgentInfo, AgentStats, Observation, Point2, Point3,
        StepRequest, StepResponse, UnitObservation,
    };
    pub use crate::reward::{RewardFn, ScoreDelta, ZeroReward};
    pub use crate::run::Orchestrator;
    pub use crate::session::AgentSession;
    pub use crate::status::{Status, StatusCode, StatusMachine, StatusUpdate};
    pub use crate::transport::{AgentTransport, TransportFactory};
}
