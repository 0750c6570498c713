//! # Bridge Test Utilities
//!
//! Shared testing utilities for all crates:
//! - Unit, frame and run config fixtures
//! - A manually driven mock engine
//! - A scripted agent transport that records every call
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod mock_engine;
pub mod scripted;
pub mod strategies;

use std::sync::Arc;
use std::time::Duration;

use bridge_core::config::OrchestratorConfig;
use bridge_core::status::StatusCode;
use bridge_core::Orchestrator;

pub use mock_engine::{MockEngine, MockFrame};
pub use scripted::{ScriptedFactory, ScriptedTransport};

/// Re-export proptest for convenience.
pub use proptest;

/// Orchestrator wired to `engine` and `factory`.
#[must_use]
pub fn orchestrator(
    engine: &Arc<MockEngine>,
    factory: &Arc<ScriptedFactory>,
    config: OrchestratorConfig,
) -> Orchestrator {
    Orchestrator::new(engine.clone(), factory.clone(), config)
}

/// Poll until the run reaches `code` or `timeout` elapses.
///
/// Returns whether the code was reached. Works with a paused test clock.
pub async fn wait_for_status(
    orchestrator: &Orchestrator,
    code: StatusCode,
    timeout: Duration,
) -> bool {
    let poll = async {
        while orchestrator.status().code != code {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    };
    tokio::time::timeout(timeout, poll).await.is_ok()
}
