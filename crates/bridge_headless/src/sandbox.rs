//! In-process sandbox engine.
//!
//! Runs a [`World`] on a tokio task, one frame at a time, and delivers every
//! frame to the agent slots through the registered hooks. Computer slots get
//! a simple mining AI. A match ends at the frame limit or when stopped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_core::engine::{
    CommandResult, ConnectionHandle, EngineAdapter, EngineCommand, EngineFrame, FrameHooks,
    MatchFuture, MatchResult, Participant, PlayerCommon, RawUnit,
};
use bridge_core::error::EngineError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::maps::{builtin_maps, find_map};
use crate::world::World;

/// Sandbox engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Frames per match.
    pub frame_limit: u64,
    /// Wall-clock pause between frames, in milliseconds.
    pub frame_interval_ms: u64,
    /// Workers each player starts with.
    pub workers_per_player: u32,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            frame_limit: 1_000,
            frame_interval_ms: 0,
            workers_per_player: 4,
        }
    }
}

/// Stop request and liveness of one match.
#[derive(Debug, Default)]
struct MatchControl {
    stop: AtomicBool,
    active: AtomicBool,
}

/// Deterministic in-process engine.
pub struct SandboxEngine {
    config: SandboxConfig,
    next_connection: AtomicU64,
    current: Mutex<Option<Arc<MatchControl>>>,
}

impl SandboxEngine {
    /// Create an engine with `config`.
    #[must_use]
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            next_connection: AtomicU64::new(1),
            current: Mutex::new(None),
        }
    }

    /// Whether the most recently started match is still delivering frames.
    ///
    /// A superseded match winding down does not count.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|control| control.active.load(Ordering::SeqCst))
    }

    fn stop_current(&self) {
        if let Some(control) = self.current.lock().as_ref() {
            control.stop.store(true, Ordering::SeqCst);
        }
    }
}

impl Default for SandboxEngine {
    fn default() -> Self {
        Self::new(SandboxConfig::default())
    }
}

#[async_trait]
impl EngineAdapter for SandboxEngine {
    async fn connect(&self) -> Result<ConnectionHandle, EngineError> {
        let id = self.next_connection.fetch_add(1, Ordering::SeqCst);
        debug!(connection = id, "Sandbox connection opened");
        Ok(ConnectionHandle {
            id,
            address: "sandbox://local".to_string(),
        })
    }

    async fn start_match(
        &self,
        _connection: &ConnectionHandle,
        map: &str,
        participants: Vec<Participant>,
        hooks: Arc<dyn FrameHooks>,
    ) -> Result<MatchFuture, EngineError> {
        let Some(sandbox_map) = find_map(map) else {
            return Err(EngineError::MatchStart {
                map: map.to_string(),
                message: "unknown map".to_string(),
            });
        };
        if participants.len() > sandbox_map.max_players() {
            return Err(EngineError::MatchStart {
                map: map.to_string(),
                message: format!(
                    "map supports {} players, {} requested",
                    sandbox_map.max_players(),
                    participants.len()
                ),
            });
        }

        self.stop_current();
        let control = Arc::new(MatchControl {
            stop: AtomicBool::new(false),
            active: AtomicBool::new(true),
        });
        *self.current.lock() = Some(Arc::clone(&control));

        let world = World::new(sandbox_map, participants.len(), self.config.workers_per_player);
        let session = MatchLoop {
            world: Arc::new(Mutex::new(world)),
            participants,
            hooks,
            control,
            frame_limit: self.config.frame_limit,
            frame_interval: Duration::from_millis(self.config.frame_interval_ms),
        };

        info!(map, frame_limit = session.frame_limit, "Sandbox match starting");
        let handle = tokio::spawn(session.run());

        Ok(Box::pin(async move {
            handle
                .await
                .map_err(|e| EngineError::Engine(format!("match task failed: {e}")))
        }))
    }

    async fn list_maps(&self) -> Result<Vec<String>, EngineError> {
        Ok(builtin_maps().into_iter().map(|map| map.name).collect())
    }

    async fn request_stop(&self, connection: &ConnectionHandle) -> Result<(), EngineError> {
        debug!(connection = connection.id, "Sandbox stop requested");
        self.stop_current();
        Ok(())
    }
}

struct MatchLoop {
    world: Arc<Mutex<World>>,
    participants: Vec<Participant>,
    hooks: Arc<dyn FrameHooks>,
    control: Arc<MatchControl>,
    frame_limit: u64,
    frame_interval: Duration,
}

impl MatchLoop {
    async fn run(self) -> MatchResult {
        let agents: Vec<usize> = self
            .participants
            .iter()
            .filter(|p| p.is_agent())
            .map(Participant::slot)
            .collect();
        let computers: Vec<usize> = self
            .participants
            .iter()
            .filter(|p| !p.is_agent())
            .map(Participant::slot)
            .collect();

        for &slot in &agents {
            let frame = self.frame(slot);
            self.hooks.on_game_start(slot, &frame).await;
        }

        while !self.control.stop.load(Ordering::SeqCst) {
            {
                let mut world = self.world.lock();
                if world.game_loop() >= self.frame_limit {
                    break;
                }
                for &slot in &computers {
                    world.computer_turn(slot);
                }
                world.advance();
            }

            for &slot in &agents {
                if self.control.stop.load(Ordering::SeqCst) {
                    break;
                }
                let frame = self.frame(slot);
                self.hooks.on_step(slot, &frame).await;
            }

            if self.frame_interval.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(self.frame_interval).await;
            }
        }

        let stopped = self.control.stop.load(Ordering::SeqCst);
        let result = self.world.lock().result(stopped);
        self.control.active.store(false, Ordering::SeqCst);
        info!(game_loop = result.game_loop, stopped, "Sandbox match finished");
        result
    }

    fn frame(&self, slot: usize) -> SandboxFrame {
        SandboxFrame {
            slot,
            world: Arc::clone(&self.world),
        }
    }
}

/// One slot's view of the sandbox world.
struct SandboxFrame {
    slot: usize,
    world: Arc<Mutex<World>>,
}

#[async_trait]
impl EngineFrame for SandboxFrame {
    fn game_loop(&self) -> u64 {
        self.world.lock().game_loop()
    }

    fn units(&self) -> Vec<RawUnit> {
        self.world.lock().units_for(self.slot)
    }

    fn player(&self) -> PlayerCommon {
        self.world.lock().player(self.slot)
    }

    async fn submit(&self, command: EngineCommand) -> CommandResult {
        let result = self.world.lock().apply(self.slot, &command);
        debug!(slot = self.slot, ability_id = command.ability_id, %result, "Sandbox command applied");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::engine::{Outcome, Race};

    struct CountingHooks {
        starts: AtomicU64,
        steps: AtomicU64,
    }

    #[async_trait]
    impl FrameHooks for CountingHooks {
        async fn on_game_start(&self, _slot: usize, _frame: &dyn EngineFrame) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_step(&self, _slot: usize, _frame: &dyn EngineFrame) {
            self.steps.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn participants() -> Vec<Participant> {
        vec![
            Participant::Agent {
                slot: 0,
                race: Race::Terran,
            },
            Participant::Computer {
                slot: 1,
                race: Race::Zerg,
                difficulty: Default::default(),
            },
        ]
    }

    #[tokio::test]
    async fn test_match_runs_to_frame_limit() {
        let engine = SandboxEngine::new(SandboxConfig {
            frame_limit: 25,
            ..Default::default()
        });
        let hooks = Arc::new(CountingHooks {
            starts: AtomicU64::new(0),
            steps: AtomicU64::new(0),
        });
        let connection = engine.connect().await.unwrap();

        let completion = engine
            .start_match(&connection, "Sandbox/TwoBases", participants(), hooks.clone())
            .await
            .unwrap();
        let result = completion.await.unwrap();

        assert_eq!(result.game_loop, 25);
        assert_eq!(hooks.starts.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.steps.load(Ordering::SeqCst), 25);
        assert_eq!(result.results[1].outcome, Outcome::Victory);
        assert!(!engine.is_active());
    }

    #[tokio::test]
    async fn test_superseded_match_does_not_clear_activity() {
        let engine = SandboxEngine::new(SandboxConfig {
            frame_limit: 100_000,
            frame_interval_ms: 1,
            ..Default::default()
        });
        let hooks = Arc::new(CountingHooks {
            starts: AtomicU64::new(0),
            steps: AtomicU64::new(0),
        });
        let connection = engine.connect().await.unwrap();

        let first = engine
            .start_match(&connection, "Sandbox/TwoBases", participants(), hooks.clone())
            .await
            .unwrap();
        let second = engine
            .start_match(&connection, "Sandbox/TwoBases", participants(), hooks)
            .await
            .unwrap();

        let superseded = first.await.unwrap();
        assert_eq!(superseded.results[0].outcome, Outcome::Undecided);
        assert!(engine.is_active());

        engine.request_stop(&connection).await.unwrap();
        second.await.unwrap();
        assert!(!engine.is_active());
    }

    #[tokio::test]
    async fn test_unknown_map_rejected() {
        let engine = SandboxEngine::default();
        let connection = engine.connect().await.unwrap();
        let hooks = Arc::new(CountingHooks {
            starts: AtomicU64::new(0),
            steps: AtomicU64::new(0),
        });

        let err = engine
            .start_match(&connection, "MapZ", participants(), hooks)
            .await
            .err()
            .unwrap();

        assert!(matches!(err, EngineError::MatchStart { .. }));
    }

    #[tokio::test]
    async fn test_list_maps() {
        let maps = SandboxEngine::default().list_maps().await.unwrap();
        assert!(maps.contains(&"Sandbox/TwoBases".to_string()));
    }
}
