//! Simulation engine boundary.
//!
//! The engine is an external collaborator. It owns frame stepping, unit
//! queries and map loading; the core only sees the traits in this module.
//!
//! # Frame delivery
//!
//! After [`EngineAdapter::start_match`] the engine calls
//! [`FrameHooks::on_game_start`] once per agent-backed slot and then
//! [`FrameHooks::on_step`] once per slot per frame. Each callback is awaited
//! before the engine delivers the next frame to that slot, which keeps the
//! exchanges of one slot strictly sequential.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::protocol::{Point2, Point3};

/// Future resolving when the engine reports match completion.
pub type MatchFuture = BoxFuture<'static, Result<MatchResult, EngineError>>;

// ============================================================================
// Participants
// ============================================================================

/// Playable race of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Race {
    /// Terran.
    Terran,
    /// Zerg.
    Zerg,
    /// Protoss.
    Protoss,
    /// Picked by the engine at match start.
    #[default]
    Random,
}

impl fmt::Display for Race {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Race::Terran => "TERRAN",
            Race::Zerg => "ZERG",
            Race::Protoss => "PROTOSS",
            Race::Random => "RANDOM",
        };
        f.write_str(name)
    }
}

/// Strength of a built-in engine AI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
    /// Very easy.
    VeryEasy,
    /// Easy.
    Easy,
    /// Medium.
    #[default]
    Medium,
    /// Medium hard.
    MediumHard,
    /// Hard.
    Hard,
    /// Harder.
    Harder,
    /// Very hard.
    VeryHard,
}

/// A player handed to the engine when a match starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Participant {
    /// Controlled by a remote agent through the frame hooks.
    Agent {
        /// Player slot (index into the run's agent list).
        slot: usize,
        /// Requested race.
        race: Race,
    },
    /// Controlled by the engine's built-in AI.
    Computer {
        /// Player slot.
        slot: usize,
        /// Requested race.
        race: Race,
        /// Built-in AI strength.
        difficulty: Difficulty,
    },
}

impl Participant {
    /// Player slot of this participant.
    #[must_use]
    pub fn slot(&self) -> usize {
        match self {
            Self::Agent { slot, .. } | Self::Computer { slot, .. } => *slot,
        }
    }

    /// Requested race.
    #[must_use]
    pub fn race(&self) -> Race {
        match self {
            Self::Agent { race, .. } | Self::Computer { race, .. } => *race,
        }
    }

    /// Whether frames for this slot are routed to the frame hooks.
    #[must_use]
    pub fn is_agent(&self) -> bool {
        matches!(self, Self::Agent { .. })
    }
}

// ============================================================================
// Connection and match
// ============================================================================

/// An open connection to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionHandle {
    /// Engine-assigned connection id.
    pub id: u64,
    /// Address the connection was opened against.
    pub address: String,
}

/// Final outcome for one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Won the match.
    Victory,
    /// Lost the match.
    Defeat,
    /// Nobody won.
    Tie,
    /// Match ended without a decision (frame limit, quit).
    Undecided,
}

/// Outcome of one player slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerResult {
    /// Player slot.
    pub slot: usize,
    /// Final outcome.
    pub outcome: Outcome,
}

/// What the engine reports when a match completes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Frame counter at match end.
    pub game_loop: u64,
    /// Per-slot outcomes.
    pub results: Vec<PlayerResult>,
}

// ============================================================================
// Raw engine entities
// ============================================================================

/// Relationship of a unit to the observing player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Alliance {
    /// Owned by the observing player.
    #[serde(rename = "SELF")]
    Own,
    /// Allied player.
    Ally,
    /// Neutral (resources, rocks).
    Neutral,
    /// Opponent.
    Enemy,
}

/// Position as reported by the engine: a single point or several.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawPosition {
    /// One world-space point.
    Point(Point3),
    /// Several points (e.g. a multi-cell footprint).
    Points(Vec<Point3>),
}

/// One queued order on a unit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawOrder {
    /// Ability being executed.
    pub ability_id: u32,
    /// World-space target, if the order targets a point.
    pub target_world_space_pos: Option<Point2>,
    /// Target unit, if the order targets a unit.
    pub target_unit_tag: Option<u64>,
}

/// Unit state as reported by the engine.
///
/// Every field except the tag is optional: engines omit fields that do not
/// apply to a unit (resources have no orders, snapshots have no health).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawUnit {
    /// Stable engine tag.
    pub tag: u64,
    /// Unit type id.
    pub unit_type: Option<u32>,
    /// World position(s).
    pub pos: Option<RawPosition>,
    /// Queued orders.
    pub orders: Option<Vec<RawOrder>>,
    /// Current health.
    pub health: Option<f32>,
    /// Maximum health.
    pub health_max: Option<f32>,
    /// Abilities currently available to the unit.
    pub available_abilities: Option<Vec<u32>>,
    /// Relationship to the observing player.
    pub alliance: Option<Alliance>,
    /// Minerals left in a mineral field.
    pub mineral_contents: Option<u32>,
    /// Vespene left in a geyser.
    pub vespene_contents: Option<u32>,
    /// Workers assigned to a town hall or refinery.
    pub assigned_harvesters: Option<u32>,
    /// Saturation target for a town hall or refinery.
    pub ideal_harvesters: Option<u32>,
}

/// Resource and supply totals of the observing player.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerCommon {
    /// Banked minerals.
    pub minerals: u32,
    /// Banked vespene.
    pub vespene: u32,
    /// Supply in use.
    pub food_used: u32,
    /// Supply cap.
    pub food_cap: u32,
    /// Engine score, when the engine computes one.
    pub score: Option<f64>,
}

/// Owned copy of the frame state the core keeps between frames.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FrameSnapshot {
    /// Engine frame counter.
    pub game_loop: u64,
    /// Units visible to the slot.
    pub units: Vec<RawUnit>,
    /// Player totals.
    pub player: PlayerCommon,
}

impl FrameSnapshot {
    /// Copy the queryable state out of a live frame.
    pub fn capture(frame: &dyn EngineFrame) -> Self {
        Self {
            game_loop: frame.game_loop(),
            units: frame.units(),
            player: frame.player(),
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Command submitted to the engine on behalf of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineCommand {
    /// Ability to execute.
    pub ability_id: u32,
    /// Units receiving the command.
    pub unit_tags: Vec<u64>,
    /// Target point; `(-1, -1)` when the command has no point target.
    pub target_world_space_pos: Point2,
    /// Target unit, if any.
    pub target_unit_tag: Option<u64>,
    /// Append to the order queue instead of replacing it.
    pub queue_command: bool,
}

/// Per-command result code reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandResult {
    /// Command accepted.
    Success,
    /// Ability not usable by the given units.
    Unsupported,
    /// Engine-side failure.
    Error,
}

impl CommandResult {
    /// Whether the engine accepted the command.
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "Success",
            Self::Unsupported => "Unsupported",
            Self::Error => "Error",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Queryable view of the current engine frame for one player slot.
#[async_trait]
pub trait EngineFrame: Send + Sync {
    /// Engine frame counter (authoritative step number).
    fn game_loop(&self) -> u64;

    /// Units visible to this slot.
    fn units(&self) -> Vec<RawUnit>;

    /// Resource and supply totals of this slot.
    fn player(&self) -> PlayerCommon;

    /// Submit a command and wait for the engine's result code.
    async fn submit(&self, command: EngineCommand) -> CommandResult;
}

/// Callbacks the engine drives for agent-backed slots.
#[async_trait]
pub trait FrameHooks: Send + Sync {
    /// Called once per agent slot when the match begins.
    async fn on_game_start(&self, slot: usize, frame: &dyn EngineFrame);

    /// Called once per agent slot per frame.
    async fn on_step(&self, slot: usize, frame: &dyn EngineFrame);
}

/// Connection to a simulation engine.
#[async_trait]
pub trait EngineAdapter: Send + Sync + 'static {
    /// Open a connection to the engine.
    async fn connect(&self) -> Result<ConnectionHandle, EngineError>;

    /// Start a match and register `hooks` for the agent-backed slots.
    ///
    /// Returns as soon as the match has been requested; the returned
    /// future resolves when the match completes.
    async fn start_match(
        &self,
        connection: &ConnectionHandle,
        map: &str,
        participants: Vec<Participant>,
        hooks: Arc<dyn FrameHooks>,
    ) -> Result<MatchFuture, EngineError>;

    /// Catalog of maps the engine can load.
    async fn list_maps(&self) -> Result<Vec<String>, EngineError>;

    /// Ask the engine to stop delivering frames for the current match.
    async fn request_stop(&self, _connection: &ConnectionHandle) -> Result<(), EngineError> {
        Ok(())
    }
}
