//! Manually driven engine double.
//!
//! [`MockEngine`] records every adapter call and hands frames to the
//! registered hooks only when a test asks for them, so tests decide
//! exactly when a match starts, advances and ends.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_core::engine::{
    CommandResult, ConnectionHandle, EngineAdapter, EngineCommand, EngineFrame, FrameHooks,
    MatchFuture, MatchResult, Participant, PlayerCommon, RawUnit,
};
use bridge_core::error::EngineError;
use parking_lot::Mutex;
use tokio::sync::oneshot;

type Completion = oneshot::Sender<Result<MatchResult, EngineError>>;

#[derive(Default)]
struct MockState {
    connect_calls: usize,
    start_calls: usize,
    stop_calls: usize,
    next_connection: u64,
    map: Option<String>,
    participants: Vec<Participant>,
    hooks: Option<Arc<dyn FrameHooks>>,
    completion: Option<Completion>,
    game_loop: u64,
    units: Vec<RawUnit>,
    player: PlayerCommon,
}

/// Engine double driven explicitly by the test.
pub struct MockEngine {
    state: Mutex<MockState>,
    commands: Arc<Mutex<Vec<EngineCommand>>>,
    command_result: Mutex<CommandResult>,
    maps: Vec<String>,
    connect_error: Option<String>,
    start_error: Option<String>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Engine with maps `MapA` and `MapB` that accepts every command.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            commands: Arc::new(Mutex::new(Vec::new())),
            command_result: Mutex::new(CommandResult::Success),
            maps: vec!["MapA".to_string(), "MapB".to_string()],
            connect_error: None,
            start_error: None,
        }
    }

    /// Fail every `connect` with `message`.
    #[must_use]
    pub fn failing_connect(mut self, message: impl Into<String>) -> Self {
        self.connect_error = Some(message.into());
        self
    }

    /// Fail every `start_match` with `message`.
    #[must_use]
    pub fn failing_start(mut self, message: impl Into<String>) -> Self {
        self.start_error = Some(message.into());
        self
    }

    /// Result code returned for submitted commands from now on.
    pub fn set_command_result(&self, result: CommandResult) {
        *self.command_result.lock() = result;
    }

    /// Units visible in subsequent frames.
    pub fn set_units(&self, units: Vec<RawUnit>) {
        self.state.lock().units = units;
    }

    /// Player totals reported in subsequent frames.
    pub fn set_player(&self, player: PlayerCommon) {
        self.state.lock().player = player;
    }

    /// Number of `connect` calls.
    pub fn connect_calls(&self) -> usize {
        self.state.lock().connect_calls
    }

    /// Number of `start_match` calls.
    pub fn start_calls(&self) -> usize {
        self.state.lock().start_calls
    }

    /// Number of `request_stop` calls.
    pub fn stop_calls(&self) -> usize {
        self.state.lock().stop_calls
    }

    /// Map of the most recent `start_match`.
    pub fn last_map(&self) -> Option<String> {
        self.state.lock().map.clone()
    }

    /// Participants of the most recent `start_match`.
    pub fn participants(&self) -> Vec<Participant> {
        self.state.lock().participants.clone()
    }

    /// Hooks registered by the most recent `start_match`.
    pub fn hooks(&self) -> Option<Arc<dyn FrameHooks>> {
        self.state.lock().hooks.clone()
    }

    /// Every command submitted so far.
    pub fn submitted(&self) -> Vec<EngineCommand> {
        self.commands.lock().clone()
    }

    /// Current frame counter.
    pub fn game_loop(&self) -> u64 {
        self.state.lock().game_loop
    }

    /// Frame built from the current units, player totals and frame counter.
    pub fn frame(&self) -> MockFrame {
        let state = self.state.lock();
        MockFrame {
            game_loop: state.game_loop,
            units: state.units.clone(),
            player: state.player,
            commands: Arc::clone(&self.commands),
            result: *self.command_result.lock(),
        }
    }

    /// Deliver `on_game_start` to every agent slot.
    pub async fn start_game(&self) {
        let Some((hooks, slots)) = self.driven_slots() else {
            return;
        };
        let frame = self.frame();
        for slot in slots {
            hooks.on_game_start(slot, &frame).await;
        }
    }

    /// Advance `frames` frames, calling `on_step` for every agent slot in
    /// slot order and awaiting each call.
    pub async fn step(&self, frames: u64) {
        let Some((hooks, slots)) = self.driven_slots() else {
            return;
        };
        for _ in 0..frames {
            self.state.lock().game_loop += 1;
            let frame = self.frame();
            for &slot in &slots {
                hooks.on_step(slot, &frame).await;
            }
        }
    }

    /// Report match completion to the orchestrator.
    pub fn finish_match(&self, result: MatchResult) -> bool {
        self.complete(Ok(result))
    }

    /// Report an engine failure while the match was running.
    pub fn fail_match(&self, error: EngineError) -> bool {
        self.complete(Err(error))
    }

    fn complete(&self, outcome: Result<MatchResult, EngineError>) -> bool {
        match self.state.lock().completion.take() {
            Some(sender) => sender.send(outcome).is_ok(),
            None => false,
        }
    }

    fn driven_slots(&self) -> Option<(Arc<dyn FrameHooks>, Vec<usize>)> {
        let state = self.state.lock();
        let hooks = state.hooks.clone()?;
        let slots = state
            .participants
            .iter()
            .filter(|p| p.is_agent())
            .map(Participant::slot)
            .collect();
        Some((hooks, slots))
    }
}

#[async_trait]
impl EngineAdapter for MockEngine {
    async fn connect(&self) -> Result<ConnectionHandle, EngineError> {
        let mut state = self.state.lock();
        state.connect_calls += 1;
        if let Some(message) = &self.connect_error {
            return Err(EngineError::Connection(message.clone()));
        }
        state.next_connection += 1;
        Ok(ConnectionHandle {
            id: state.next_connection,
            address: "mock://engine".to_string(),
        })
    }

    async fn start_match(
        &self,
        _connection: &ConnectionHandle,
        map: &str,
        participants: Vec<Participant>,
        hooks: Arc<dyn FrameHooks>,
    ) -> Result<MatchFuture, EngineError> {
        let mut state = self.state.lock();
        state.start_calls += 1;
        if let Some(message) = &self.start_error {
            return Err(EngineError::MatchStart {
                map: map.to_string(),
                message: message.clone(),
            });
        }

        let (sender, receiver) = oneshot::channel();
        state.map = Some(map.to_string());
        state.participants = participants;
        state.hooks = Some(hooks);
        state.completion = Some(sender);
        state.game_loop = 0;

        Ok(Box::pin(async move {
            receiver
                .await
                .unwrap_or_else(|_| Err(EngineError::Engine("match abandoned".to_string())))
        }))
    }

    async fn list_maps(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.maps.clone())
    }

    async fn request_stop(&self, _connection: &ConnectionHandle) -> Result<(), EngineError> {
        self.state.lock().stop_calls += 1;
        Ok(())
    }
}

/// Frame handed to the hooks by [`MockEngine`].
pub struct MockFrame {
    game_loop: u64,
    units: Vec<RawUnit>,
    player: PlayerCommon,
    commands: Arc<Mutex<Vec<EngineCommand>>>,
    result: CommandResult,
}

#[async_trait]
impl EngineFrame for MockFrame {
    fn game_loop(&self) -> u64 {
        self.game_loop
    }

    fn units(&self) -> Vec<RawUnit> {
        self.units.clone()
    }

    fn player(&self) -> PlayerCommon {
        self.player
    }

    async fn submit(&self, command: EngineCommand) -> CommandResult {
        self.commands.lock().push(command);
        self.result
    }
}
