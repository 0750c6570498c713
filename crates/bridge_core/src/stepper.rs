//! One observation/action exchange per agent slot per frame.
//!
//! The [`StepCoordinator`] is registered with the engine as the frame hooks
//! of exactly one run generation. Every callback re-checks that generation
//! and the run status against the shared run state before calling the
//! agent, before submitting the decoded command and again before committing
//! the result. A superseded, stopped or ended run is never written to.
//!
//! The shared state lock is only taken inside the synchronous helpers and
//! is never held across an `.await`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, trace, warn};

use crate::codec::{self, DecodedAction};
use crate::engine::{CommandResult, EngineCommand, EngineFrame, FrameHooks, FrameSnapshot, PlayerCommon};
use crate::error::{BridgeError, TransportError};
use crate::protocol::{AgentAction, AgentContext, StepRequest, StepResponse};
use crate::reward::{RewardContext, RewardFn};
use crate::run::{RunState, SharedRun};
use crate::status::{StatusCode, StatusUpdate};
use crate::transport::{call_with_timeout, AgentTransport, STEP_OPERATION};

/// Everything needed to call the agent, captured under the lock.
struct PreparedStep {
    transport: Arc<dyn AgentTransport>,
    request: StepRequest,
    previous_score: f64,
}

/// Outcome of a successful agent call, applied under the lock.
struct CompletedStep {
    action: AgentAction,
    context: Option<AgentContext>,
    submitted: Option<(EngineCommand, CommandResult)>,
    player: PlayerCommon,
    previous_score: f64,
}

/// Per-frame exchange driver for one run generation.
pub struct StepCoordinator {
    generation: u64,
    state: SharedRun,
    reward: Arc<dyn RewardFn>,
    timeout: Duration,
    reward_dims: usize,
}

impl StepCoordinator {
    pub(crate) fn new(
        generation: u64,
        state: SharedRun,
        reward: Arc<dyn RewardFn>,
        timeout: Duration,
        reward_dims: usize,
    ) -> Self {
        Self {
            generation,
            state,
            reward,
            timeout,
            reward_dims,
        }
    }

    /// Run generation these hooks were registered for.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Execute one exchange for `slot` on `frame`.
    pub async fn exchange(&self, slot: usize, frame: &dyn EngineFrame) {
        let snapshot = FrameSnapshot::capture(frame);
        let step = snapshot.game_loop;
        let player = snapshot.player;

        let Some(prepared) = self.prepare(slot, snapshot) else {
            return;
        };

        let variables = match prepared.request.to_variables() {
            Ok(variables) => variables,
            Err(e) => {
                self.record_failure(slot, step, TransportError::Malformed(e.to_string()).into());
                return;
            }
        };

        debug!(slot, step, "Sending observation to agent");
        let response = call_with_timeout(
            prepared.transport.as_ref(),
            STEP_OPERATION,
            variables,
            self.timeout,
        )
        .await
        .and_then(StepResponse::from_value);

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                self.record_failure(slot, step, e.into());
                return;
            }
        };

        let action = response.action.unwrap_or_else(AgentAction::no_op);
        let submitted = match codec::decode_action(&action) {
            DecodedAction::NoOp => {
                trace!(slot, step, "Agent chose no-op");
                None
            }
            DecodedAction::Command(command) => {
                let live = self.is_live(&self.state.read());
                if !live {
                    debug!(slot, step, "Run no longer accepting steps, command not submitted");
                    return;
                }
                let result = frame.submit(command.clone()).await;
                Some((command, result))
            }
        };

        self.commit(
            slot,
            step,
            CompletedStep {
                action,
                context: response.context,
                submitted,
                player,
                previous_score: prepared.previous_score,
            },
        );
    }

    fn begin_session(&self, slot: usize, snapshot: FrameSnapshot) {
        let mut state = self.state.write();
        if state.generation != self.generation {
            debug!(slot, generation = self.generation, "Ignoring game start from superseded run");
            return;
        }

        if !state.episode_started {
            state.episode += 1;
            state.episode_started = true;
            info!(episode = state.episode, generation = self.generation, "Episode started");
        }
        state.step = snapshot.game_loop;

        if state.machine.code() == StatusCode::Starting {
            match state.machine.set_status(StatusUpdate::code(StatusCode::Running)) {
                Ok(_) => info!(generation = self.generation, "Match running"),
                Err(e) => warn!(error = %e, "Failed to mark run as running"),
            }
        }

        let dims = self.reward_dims;
        match state.agents.get_mut(slot) {
            Some(session) => session.on_session_start(dims),
            None => warn!(slot, "Game start for unknown slot"),
        }
        state.last_frame = Some(snapshot);
    }

    fn prepare(&self, slot: usize, snapshot: FrameSnapshot) -> Option<PreparedStep> {
        let mut state = self.state.write();
        if state.generation != self.generation {
            debug!(slot, generation = self.generation, "Dropping frame from superseded run");
            return None;
        }
        if !state.machine.code().accepts_steps() {
            trace!(slot, status = %state.machine.code(), "Run not accepting steps");
            return None;
        }

        state.step = snapshot.game_loop;
        let episode = state.episode;
        let mode = state.config.as_ref().map(|c| c.mode).unwrap_or_default();

        let prepared = {
            let Some(session) = state.agents.get(slot) else {
                warn!(slot, "Frame for unknown slot");
                return None;
            };
            let transport = session.transport()?.clone();
            let stats = session.stats();
            PreparedStep {
                transport,
                request: StepRequest {
                    episode,
                    step: snapshot.game_loop,
                    mode,
                    slot,
                    units: codec::encode_observation(&snapshot.units),
                    player: codec::encode_player(&snapshot.player),
                    last_reward: stats
                        .map(|s| s.last_reward.clone())
                        .unwrap_or_else(|| vec![0.0; self.reward_dims]),
                    last_action: stats.and_then(|s| s.last_action.clone()),
                    context: session.context().cloned(),
                },
                previous_score: stats.map_or(0.0, |s| s.score),
            }
        };

        state.last_frame = Some(snapshot);
        Some(prepared)
    }

    fn commit(&self, slot: usize, step: u64, completed: CompletedStep) {
        let mut state = self.state.write();
        if !self.is_live(&state) {
            debug!(slot, step, "Dropping agent response for a finished or superseded run");
            return;
        }

        let reward = self.reward.reward(&RewardContext {
            slot,
            step,
            player: &completed.player,
            previous_score: completed.previous_score,
            command: completed.submitted.as_ref().map(|(command, _)| command),
            dims: self.reward_dims,
        });

        if let Some(session) = state.agents.get_mut(slot) {
            session.record_exchange(
                completed.action,
                completed.context,
                &reward,
                completed.player.score,
            );
        }

        if let Some((command, result)) = completed.submitted {
            if !result.is_success() {
                let err = BridgeError::EngineCommand {
                    slot,
                    ability_id: command.ability_id,
                    result,
                };
                warn!(slot, step, error = %err, "Engine rejected agent command");
                state.machine.set_error(err.to_string());
            }
        }
    }

    /// Whether `state` still belongs to this generation and takes steps.
    ///
    /// Checked again after every await: a stop or match completion may
    /// land while the agent call is in flight.
    fn is_live(&self, state: &RunState) -> bool {
        state.generation == self.generation && state.machine.code().accepts_steps()
    }

    fn record_failure(&self, slot: usize, step: u64, err: BridgeError) {
        let mut state = self.state.write();
        if !self.is_live(&state) {
            debug!(slot, step, error = %err, "Dropping failure for a finished or superseded run");
            return;
        }
        warn!(slot, step, error = %err, "Agent exchange failed");
        state.machine.set_error(err.to_string());
    }
}

#[async_trait]
impl FrameHooks for StepCoordinator {
    async fn on_game_start(&self, slot: usize, frame: &dyn EngineFrame) {
        self.begin_session(slot, FrameSnapshot::capture(frame));
    }

    async fn on_step(&self, slot: usize, frame: &dyn EngineFrame) {
        self.exchange(slot, frame).await;
    }
}
