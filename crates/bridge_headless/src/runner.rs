//! Runs one match and streams observations.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use bridge_core::config::{ConfigError, OrchestratorConfig, RunConfig};
use bridge_core::error::TransportError;
use bridge_core::protocol::Observation;
use bridge_core::status::{Status, StatusCode};
use bridge_core::transport::TransportFactory;
use bridge_core::Orchestrator;
use bridge_transport::GraphQlTransportFactory;
use thiserror::Error;
use tracing::{info, warn};

use crate::sandbox::{SandboxConfig, SandboxEngine};

/// Error type for the headless runner.
#[derive(Error, Debug)]
pub enum HeadlessError {
    /// Failed to load a config file.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Failed to set up the agent transport.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Failed to write output.
    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to serialize an observation.
    #[error("Failed to serialize observation: {0}")]
    Json(#[from] serde_json::Error),
}

/// Output pacing.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Interval between observation lines.
    pub observe_interval: Duration,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            observe_interval: Duration::from_millis(250),
        }
    }
}

/// Sandbox engine, orchestrator and output loop for one match.
pub struct HeadlessRunner {
    engine: Arc<SandboxEngine>,
    orchestrator: Orchestrator,
    options: RunnerOptions,
}

impl HeadlessRunner {
    /// Runner reaching agents through `transports`.
    pub fn new(
        engine: Arc<SandboxEngine>,
        transports: Arc<dyn TransportFactory>,
        config: OrchestratorConfig,
        options: RunnerOptions,
    ) -> Self {
        let orchestrator = Orchestrator::new(engine.clone(), transports, config);
        Self {
            engine,
            orchestrator,
            options,
        }
    }

    /// Runner reaching agents over GraphQL.
    pub fn with_graphql(
        sandbox: SandboxConfig,
        config: OrchestratorConfig,
        options: RunnerOptions,
    ) -> Result<Self, HeadlessError> {
        let transports = GraphQlTransportFactory::new(config.agent_timeout())?;
        Ok(Self::new(
            Arc::new(SandboxEngine::new(sandbox)),
            Arc::new(transports),
            config,
            options,
        ))
    }

    /// Orchestrator driving the match.
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Run `config` to completion, writing one observation per line to `out`.
    ///
    /// Returns the final status.
    pub async fn run<W: Write>(&self, config: RunConfig, out: &mut W) -> Result<Status, HeadlessError> {
        let status = self.orchestrator.run(config).await;
        info!(run_id = %status.id, status = %status.code, "Run requested");
        write_line(out, &self.orchestrator.observe())?;

        for probe in self.orchestrator.probe_agents().await {
            match probe.result {
                Ok(agent) => info!(slot = probe.slot, id = %agent.id, name = %agent.name, "Agent connected"),
                Err(e) => warn!(slot = probe.slot, error = %e, "Agent did not report its identity"),
            }
        }

        loop {
            tokio::time::sleep(self.options.observe_interval).await;
            let observation = self.orchestrator.observe();
            write_line(out, &observation)?;
            if is_finished(observation.status.code, self.engine.is_active()) {
                info!(status = %observation.status.code, step = observation.step, "Run finished");
                return Ok(observation.status);
            }
        }
    }
}

fn is_finished(code: StatusCode, engine_active: bool) -> bool {
    match code {
        StatusCode::Ended | StatusCode::Stopped => true,
        StatusCode::Starting | StatusCode::Running => false,
        StatusCode::Unknown | StatusCode::Idle | StatusCode::Error => !engine_active,
    }
}

fn write_line<W: Write>(out: &mut W, observation: &Observation) -> Result<(), HeadlessError> {
    serde_json::to_writer(&mut *out, observation)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_finished() {
        assert!(is_finished(StatusCode::Ended, true));
        assert!(is_finished(StatusCode::Stopped, true));
        assert!(!is_finished(StatusCode::Running, false));
        assert!(!is_finished(StatusCode::Error, true));
        assert!(is_finished(StatusCode::Error, false));
    }
}
