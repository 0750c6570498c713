//! The simulation run aggregate.
//!
//! [`Orchestrator`] owns the single active run: its status machine, the
//! agent sessions, the step and episode counters and the engine connection.
//! It is a cheap-to-clone handle; every clone sees the same run.
//!
//! Each call to [`Orchestrator::run`] bumps a generation counter. The frame
//! hooks and the match watcher of a run carry the generation they were
//! created for and drop their writes once a newer run has replaced it.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::config::{OrchestratorConfig, RunConfig};
use crate::engine::{ConnectionHandle, EngineAdapter, FrameSnapshot, MatchFuture, Participant};
use crate::error::{BridgeError, EngineError, Result, TransportError};
use crate::protocol::{AgentInfo, AgentStatsReport, Observation};
use crate::reward::{RewardFn, ZeroReward};
use crate::session::AgentSession;
use crate::status::{Status, StatusCode, StatusMachine, StatusUpdate};
use crate::stepper::StepCoordinator;
use crate::transport::{call_with_timeout, TransportFactory, INFO_OPERATION};

/// Run state shared between the orchestrator and the frame hooks.
pub(crate) type SharedRun = Arc<RwLock<RunState>>;

/// Mutable state of the active run.
#[derive(Debug, Default)]
pub(crate) struct RunState {
    /// Tag of the run currently owning this state.
    pub generation: u64,
    /// Request the current run was started with.
    pub config: Option<RunConfig>,
    pub machine: StatusMachine,
    /// Matches started since the orchestrator was created.
    pub episode: u64,
    /// Whether the current generation already counted its episode.
    pub episode_started: bool,
    /// Latest engine frame counter.
    pub step: u64,
    /// Sessions in slot order.
    pub agents: Vec<AgentSession>,
    pub last_frame: Option<FrameSnapshot>,
    pub connection: Option<ConnectionHandle>,
}

impl RunState {
    /// Record `err` into the status if `generation` still owns the state.
    fn record_error(&mut self, generation: u64, err: &BridgeError) -> bool {
        if self.generation != generation {
            debug!(generation, error = %err, "Dropping error from superseded run");
            return false;
        }
        error!(generation, error = %err, "Run failed");
        self.machine.set_error(err.to_string());
        true
    }
}

/// Result of calling `info` on one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProbe {
    /// Player slot.
    pub slot: usize,
    /// Reported identity, or the display form of the failure.
    pub result: std::result::Result<AgentInfo, String>,
}

/// What the synchronous part of [`Orchestrator::run`] hands to the async part.
struct PreparedRun {
    generation: u64,
    environment_id: String,
    participants: Vec<Participant>,
    connection: Option<ConnectionHandle>,
    superseded: Option<ConnectionHandle>,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Handle to the active simulation run.
#[derive(Clone)]
pub struct Orchestrator {
    engine: Arc<dyn EngineAdapter>,
    transports: Arc<dyn TransportFactory>,
    reward: Arc<dyn RewardFn>,
    config: OrchestratorConfig,
    state: SharedRun,
}

impl Orchestrator {
    /// Create an orchestrator with no run and the zero reward rule.
    pub fn new(
        engine: Arc<dyn EngineAdapter>,
        transports: Arc<dyn TransportFactory>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            engine,
            transports,
            reward: Arc::new(ZeroReward),
            config,
            state: Arc::new(RwLock::new(RunState::default())),
        }
    }

    /// Use `reward` for runs started after this call.
    #[must_use]
    pub fn with_reward(mut self, reward: Arc<dyn RewardFn>) -> Self {
        self.reward = reward;
        self
    }

    /// Orchestrator settings.
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Generation of the current run (0 before the first run).
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.state.read().generation
    }

    /// Reset state and start a match for `config`.
    ///
    /// Returns the status as soon as the match has been requested. Match
    /// completion is observed in the background and moves the status to
    /// `Ended`. Failures during start are recorded into the returned status
    /// rather than returned as errors.
    pub async fn run(&self, config: RunConfig) -> Status {
        let prepared = self.reset(config);
        let generation = prepared.generation;

        if let Some(connection) = prepared.superseded.as_ref() {
            info!(connection = connection.id, "Stopping superseded match");
            if let Err(e) = self.engine.request_stop(connection).await {
                warn!(error = %e, "Failed to stop superseded match");
            }
        }

        if prepared.participants.is_empty() {
            return self.status();
        }

        let connection = match prepared.connection {
            Some(connection) => connection,
            None => match self.connect(generation).await {
                Some(connection) => connection,
                None => return self.status(),
            },
        };

        if self.state.read().generation != generation {
            debug!(generation, "Run superseded before match start");
            return self.status();
        }

        let hooks = Arc::new(StepCoordinator::new(
            generation,
            Arc::clone(&self.state),
            Arc::clone(&self.reward),
            self.config.agent_timeout(),
            self.config.reward_dims,
        ));

        info!(
            generation,
            environment = %prepared.environment_id,
            participants = prepared.participants.len(),
            "Starting match"
        );
        match self
            .engine
            .start_match(
                &connection,
                &prepared.environment_id,
                prepared.participants,
                hooks,
            )
            .await
        {
            Ok(completion) => {
                tokio::spawn(watch_match(Arc::clone(&self.state), generation, completion));
            }
            Err(e) => {
                self.state.write().record_error(generation, &BridgeError::from(e));
            }
        }

        self.status()
    }

    /// Mark the run as stopped and ask the engine to stop delivering frames.
    ///
    /// Returns without waiting for the engine. Runs that are not starting
    /// or running keep their status, but an errored run still has its
    /// engine match stopped.
    pub async fn stop(&self) -> Status {
        let (status, connection) = {
            let mut state = self.state.write();
            let code = state.machine.code();
            let generation = state.generation;
            match code {
                StatusCode::Starting | StatusCode::Running => {
                    match state.machine.set_status(StatusUpdate::code(StatusCode::Stopped)) {
                        Ok(_) => info!(generation, "Run stopped"),
                        Err(e) => warn!(error = %e, "Failed to mark run as stopped"),
                    }
                }
                other => debug!(status = %other, "Stop requested with no active match"),
            }
            let connection = matches!(
                code,
                StatusCode::Starting | StatusCode::Running | StatusCode::Error
            )
            .then(|| state.connection.clone())
            .flatten();
            (state.machine.status().clone(), connection)
        };

        if let Some(connection) = connection {
            let engine = Arc::clone(&self.engine);
            tokio::spawn(async move {
                if let Err(e) = engine.request_stop(&connection).await {
                    warn!(error = %e, "Engine stop request failed");
                }
            });
        }

        status
    }

    /// Last committed status.
    #[must_use]
    pub fn status(&self) -> Status {
        self.state.read().machine.status().clone()
    }

    /// Full snapshot of the run, with per-agent statistics.
    #[must_use]
    pub fn observe(&self) -> Observation {
        let state = self.state.read();
        Observation {
            episode: state.episode,
            step: state.step,
            mode: state.config.as_ref().map(|c| c.mode),
            units: state
                .last_frame
                .as_ref()
                .map(|frame| codec::encode_observation(&frame.units))
                .unwrap_or_default(),
            agent_stats: state
                .agents
                .iter()
                .filter_map(|session| {
                    session.stats().map(|stats| AgentStatsReport {
                        slot: session.slot(),
                        participant_id: session.participant_id().to_string(),
                        stats: stats.clone(),
                    })
                })
                .collect(),
            status: state.machine.status().clone(),
        }
    }

    /// Environments the engine can load.
    ///
    /// # Errors
    /// Returns [`BridgeError::Engine`] if the engine cannot list its maps.
    pub async fn list_environments(&self) -> Result<Vec<String>> {
        Ok(self.engine.list_maps().await?)
    }

    /// Ask every agent of the current run for its identity.
    pub async fn probe_agents(&self) -> Vec<AgentProbe> {
        let targets: Vec<_> = {
            let state = self.state.read();
            state
                .agents
                .iter()
                .filter_map(|session| session.transport().map(|t| (session.slot(), Arc::clone(t))))
                .collect()
        };

        let timeout = self.config.agent_timeout();
        let probes = targets.into_iter().map(|(slot, transport)| async move {
            let result = call_with_timeout(
                transport.as_ref(),
                INFO_OPERATION,
                Value::Object(serde_json::Map::new()),
                timeout,
            )
            .await
            .and_then(|value| {
                serde_json::from_value::<AgentInfo>(value)
                    .map_err(|e| TransportError::Malformed(e.to_string()))
            })
            .map_err(|e| e.to_string());

            if let Err(e) = &result {
                warn!(slot, error = %e, "Agent info probe failed");
            }
            AgentProbe { slot, result }
        });

        join_all(probes).await
    }

    // ------------------------------------------------------------------------
    // Run start helpers
    // ------------------------------------------------------------------------

    fn reset(&self, config: RunConfig) -> PreparedRun {
        let mut state = self.state.write();

        let superseded = if matches!(
            state.machine.code(),
            StatusCode::Starting | StatusCode::Running | StatusCode::Error
        ) {
            state.connection.clone()
        } else {
            None
        };
        if !self.config.reuse_connection {
            state.connection = None;
        }

        state.generation += 1;
        let generation = state.generation;
        let run_id = format!("run-{generation}@{}", Utc::now().to_rfc3339());

        state.machine = StatusMachine::new(run_id.clone());
        state.episode_started = false;
        state.step = 0;
        state.last_frame = None;
        state.agents = config
            .agents
            .iter()
            .enumerate()
            .map(|(slot, settings)| AgentSession::create(settings, slot, self.transports.as_ref()))
            .collect();

        if let Err(e) = state.machine.set_status(StatusUpdate::code(StatusCode::Starting)) {
            warn!(error = %e, "Failed to mark run as starting");
        }
        info!(generation, run_id = %run_id, environment = %config.environment_id, "Run reset");

        let participants = if state.agents.iter().any(AgentSession::has_transport) {
            state.agents.iter().map(AgentSession::participant).collect()
        } else {
            let err = BridgeError::Configuration(
                "must have at least one valid agent endpoint".to_string(),
            );
            state.record_error(generation, &err);
            Vec::new()
        };

        let environment_id = config.environment_id.clone();
        let connection = state.connection.clone();
        state.config = Some(config);

        PreparedRun {
            generation,
            environment_id,
            participants,
            connection,
            superseded,
        }
    }

    async fn connect(&self, generation: u64) -> Option<ConnectionHandle> {
        match self.engine.connect().await {
            Ok(connection) => {
                let mut state = self.state.write();
                if state.generation != generation {
                    debug!(generation, "Dropping engine connection of superseded run");
                    return None;
                }
                info!(connection = connection.id, address = %connection.address, "Connected to engine");
                state.connection = Some(connection.clone());
                Some(connection)
            }
            Err(e) => {
                self.state.write().record_error(generation, &BridgeError::from(e));
                None
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

async fn watch_match(state: SharedRun, generation: u64, completion: MatchFuture) {
    let outcome: std::result::Result<_, EngineError> = completion.await;

    let mut state = state.write();
    if state.generation != generation {
        debug!(generation, "Ignoring completion of superseded match");
        return;
    }

    match outcome {
        Ok(result) => {
            state.step = state.step.max(result.game_loop);
            match state.machine.set_status(StatusUpdate::code(StatusCode::Ended)) {
                Ok(_) => info!(generation, game_loop = result.game_loop, "Match ended"),
                Err(e) => debug!(generation, error = %e, "Match completed after terminal status"),
            }
        }
        Err(e) => {
            state.record_error(generation, &BridgeError::from(e));
        }
    }
}
