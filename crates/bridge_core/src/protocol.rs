//! Wire schema exchanged with remote agents and outer callers.
//!
//! All records serialize as camelCase JSON. Every field a peer might omit is
//! optional or defaulted, so a partially populated payload still parses.
//!
//! # Step exchange
//!
//! ```text
//! -> step(observation: {"episode":1,"step":22,"units":[...],"context":"..."})
//! <- {"action":{"abilityId":"16","unitTags":["4294967297"],"targetWorldSpacePos":{"x":30,"y":40}},"context":"..."}
//! ```
//!
//! Unit tags travel as strings since engine tags exceed the integer range
//! many agent runtimes represent exactly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::RunMode;
use crate::engine::Alliance;
use crate::error::TransportError;
use crate::status::Status;

/// Action identifier meaning "take no action this step".
pub const NO_OP_ACTION_ID: &str = "NO_OP";

// ============================================================================
// Geometry
// ============================================================================

/// A point on the map plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
}

impl Point2 {
    /// Target used when a command has no point target.
    pub const NONE: Point2 = Point2 { x: -1.0, y: -1.0 };

    /// Create a point.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A point in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
    /// Height.
    #[serde(default)]
    pub z: f32,
}

impl Point3 {
    /// Create a point.
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

// ============================================================================
// Observation records
// ============================================================================

/// One queued order as seen by an agent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderObservation {
    /// Ability being executed.
    pub ability_id: u32,
    /// Point target, `null` when the order has none.
    #[serde(default)]
    pub target_world_space_pos: Option<Point2>,
}

/// One unit as seen by an agent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UnitObservation {
    /// Stable engine tag.
    pub id: String,
    /// Unit type id.
    pub unit_type: Option<u32>,
    /// World positions, always an array.
    pub positions: Vec<Point3>,
    /// Queued orders.
    pub orders: Vec<OrderObservation>,
    /// Current health.
    pub health: Option<f32>,
    /// Maximum health.
    pub health_max: Option<f32>,
    /// Available ability ids.
    pub abilities: Vec<u32>,
    /// Relationship to the observing player.
    pub alliance: Option<Alliance>,
    /// Minerals left in a mineral field.
    pub mineral_contents: Option<u32>,
    /// Vespene left in a geyser.
    pub vespene_contents: Option<u32>,
    /// Workers assigned.
    pub assigned_harvesters: Option<u32>,
    /// Saturation target.
    pub ideal_harvesters: Option<u32>,
}

/// Resource and supply totals sent with each step.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerSummary {
    /// Banked minerals.
    pub minerals: u32,
    /// Banked vespene.
    pub vespene: u32,
    /// Supply in use.
    pub food_used: u32,
    /// Supply cap.
    pub food_cap: u32,
}

// ============================================================================
// Actions and context
// ============================================================================

/// Action returned by an agent.
///
/// Identifiers are kept in string form. Agents may send them as JSON
/// strings or numbers; numbers are converted on the way in.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentAction {
    /// Ability id as a string, or [`NO_OP_ACTION_ID`].
    #[serde(deserialize_with = "lenient::optional_id")]
    pub ability_id: Option<String>,
    /// Units receiving the command.
    #[serde(deserialize_with = "lenient::id_list")]
    pub unit_tags: Vec<String>,
    /// Point target.
    pub target_world_space_pos: Option<Point2>,
    /// Unit target.
    #[serde(deserialize_with = "lenient::optional_id")]
    pub target_unit_tag: Option<String>,
    /// Append to the order queue.
    pub queue_command: Option<bool>,
}

impl AgentAction {
    /// The "do nothing this step" action.
    #[must_use]
    pub fn no_op() -> Self {
        Self {
            ability_id: Some(NO_OP_ACTION_ID.to_string()),
            ..Default::default()
        }
    }

    /// Whether this action carries the no-op identifier.
    #[must_use]
    pub fn is_no_op(&self) -> bool {
        self.ability_id
            .as_deref()
            .is_some_and(|id| id.trim() == NO_OP_ACTION_ID)
    }
}

/// Identifier fields that accept either JSON strings or numbers.
mod lenient {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        Text(String),
        Unsigned(u64),
        Signed(i64),
        Float(f64),
    }

    impl From<StringOrNumber> for String {
        fn from(value: StringOrNumber) -> Self {
            match value {
                StringOrNumber::Text(text) => text,
                StringOrNumber::Unsigned(n) => n.to_string(),
                StringOrNumber::Signed(n) => n.to_string(),
                StringOrNumber::Float(n) => n.to_string(),
            }
        }
    }

    pub(super) fn optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<StringOrNumber>::deserialize(deserializer)?.map(String::from))
    }

    /// A `null` list is read as empty.
    pub(super) fn id_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<Vec<StringOrNumber>>::deserialize(deserializer)?
            .unwrap_or_default()
            .into_iter()
            .map(String::from)
            .collect())
    }
}

/// Opaque continuation token owned by the agent.
///
/// The orchestrator stores and returns it verbatim and never inspects it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentContext(pub String);

impl AgentContext {
    /// Wrap a token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

// ============================================================================
// Step exchange
// ============================================================================

/// Payload sent to an agent once per frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRequest {
    /// Episode counter.
    pub episode: u64,
    /// Engine frame counter.
    pub step: u64,
    /// Run mode (bookkeeping only).
    pub mode: RunMode,
    /// Player slot this request is for.
    pub slot: usize,
    /// Units visible to the slot.
    pub units: Vec<UnitObservation>,
    /// Resource and supply totals.
    pub player: PlayerSummary,
    /// Reward computed after the previous step.
    pub last_reward: Vec<f64>,
    /// Action returned on the previous step.
    pub last_action: Option<AgentAction>,
    /// Context returned on the previous step.
    pub context: Option<AgentContext>,
}

impl StepRequest {
    /// GraphQL-style variables object carrying this request.
    pub fn to_variables(&self) -> serde_json::Result<Value> {
        Ok(serde_json::json!({ "observation": serde_json::to_value(self)? }))
    }
}

/// Reply expected from an agent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StepResponse {
    /// Chosen action; absent means no-op.
    pub action: Option<AgentAction>,
    /// New context; absent or `null` clears the stored context.
    pub context: Option<AgentContext>,
}

impl StepResponse {
    /// Parse the structured result of a transport call.
    ///
    /// # Errors
    /// Returns [`TransportError::Malformed`] if the value is not an object
    /// matching the schema.
    pub fn from_value(value: Value) -> Result<Self, TransportError> {
        if !value.is_object() {
            return Err(TransportError::Malformed(format!(
                "expected step result object, got {value}"
            )));
        }
        serde_json::from_value(value).map_err(|e| TransportError::Malformed(e.to_string()))
    }
}

/// Identity an agent reports through the `info` operation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentInfo {
    /// Agent id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
}

// ============================================================================
// Caller-facing snapshots
// ============================================================================

/// Running statistics of one agent session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStats {
    /// Action returned on the most recent successful exchange.
    pub last_action: Option<AgentAction>,
    /// Reward of the most recent step.
    pub last_reward: Vec<f64>,
    /// Elementwise sum of all step rewards.
    pub total_reward: Vec<f64>,
    /// Latest engine score.
    pub score: f64,
    /// Successful exchanges this match.
    pub steps: u64,
}

impl AgentStats {
    /// Zeroed statistics with `dims`-wide reward vectors.
    #[must_use]
    pub fn zeroed(dims: usize) -> Self {
        Self {
            last_action: None,
            last_reward: vec![0.0; dims],
            total_reward: vec![0.0; dims],
            score: 0.0,
            steps: 0,
        }
    }

    /// Record `reward` as the latest step reward and add it to the total.
    ///
    /// `reward` is padded with zeros or truncated to the configured width.
    pub fn accumulate(&mut self, reward: &[f64]) {
        let dims = self.total_reward.len();
        self.last_reward = reward
            .iter()
            .copied()
            .chain(std::iter::repeat(0.0))
            .take(dims)
            .collect();
        for (total, step) in self.total_reward.iter_mut().zip(&self.last_reward) {
            *total += step;
        }
    }
}

/// Statistics of one slot in an [`Observation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatsReport {
    /// Player slot.
    pub slot: usize,
    /// Participant designation.
    pub participant_id: String,
    /// Statistics.
    pub stats: AgentStats,
}

/// Full snapshot returned by `observe()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    /// Episode counter.
    pub episode: u64,
    /// Engine frame counter.
    pub step: u64,
    /// Mode of the current run, if any.
    pub mode: Option<RunMode>,
    /// Units from the latest frame.
    pub units: Vec<UnitObservation>,
    /// One entry per session that has statistics.
    pub agent_stats: Vec<AgentStatsReport>,
    /// Current status.
    pub status: Status,
}
