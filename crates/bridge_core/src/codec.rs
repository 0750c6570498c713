//! Translation between raw engine entities and the wire schema.
//!
//! Pure functions only: no state, no I/O. Both directions are total; missing
//! or unparseable input degrades to an empty value or a no-op, never to an
//! error that would fail a step.

use tracing::warn;

use crate::engine::{EngineCommand, PlayerCommon, RawOrder, RawPosition, RawUnit};
use crate::protocol::{
    AgentAction, OrderObservation, PlayerSummary, Point2, UnitObservation, NO_OP_ACTION_ID,
};

/// Result of decoding an agent action.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedAction {
    /// Submit nothing this step.
    NoOp,
    /// Submit this command.
    Command(EngineCommand),
}

/// Encode every unit of a frame.
#[must_use]
pub fn encode_observation(units: &[RawUnit]) -> Vec<UnitObservation> {
    units.iter().map(encode_unit).collect()
}

/// Encode a single unit.
#[must_use]
pub fn encode_unit(unit: &RawUnit) -> UnitObservation {
    let positions = match &unit.pos {
        Some(RawPosition::Point(point)) => vec![*point],
        Some(RawPosition::Points(points)) => points.clone(),
        None => Vec::new(),
    };

    UnitObservation {
        id: unit.tag.to_string(),
        unit_type: unit.unit_type,
        positions,
        orders: unit
            .orders
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(encode_order)
            .collect(),
        health: unit.health,
        health_max: unit.health_max,
        abilities: unit.available_abilities.clone().unwrap_or_default(),
        alliance: unit.alliance,
        mineral_contents: unit.mineral_contents,
        vespene_contents: unit.vespene_contents,
        assigned_harvesters: unit.assigned_harvesters,
        ideal_harvesters: unit.ideal_harvesters,
    }
}

fn encode_order(order: &RawOrder) -> OrderObservation {
    OrderObservation {
        ability_id: order.ability_id,
        target_world_space_pos: order.target_world_space_pos,
    }
}

/// Resource and supply totals for the wire.
#[must_use]
pub fn encode_player(player: &PlayerCommon) -> PlayerSummary {
    PlayerSummary {
        minerals: player.minerals,
        vespene: player.vespene,
        food_used: player.food_used,
        food_cap: player.food_cap,
    }
}

/// Decode an agent action into an engine command.
///
/// An absent or no-op identifier yields [`DecodedAction::NoOp`]. The
/// ability id is read from the leading decimal digits of the identifier
/// after an optional `+`, so `"16"`, `"+16"` and `"16.0"` all name ability
/// 16; an identifier without leading digits also yields a no-op. Unit tags
/// that do not parse are dropped. The point target defaults to
/// [`Point2::NONE`] and the queue flag to `false`.
#[must_use]
pub fn decode_action(action: &AgentAction) -> DecodedAction {
    let Some(raw_id) = action.ability_id.as_deref().map(str::trim) else {
        return DecodedAction::NoOp;
    };
    if raw_id == NO_OP_ACTION_ID {
        return DecodedAction::NoOp;
    }
    let Some(ability_id) = parse_ability_id(raw_id) else {
        warn!(ability_id = raw_id, "Unparseable ability id, treating as no-op");
        return DecodedAction::NoOp;
    };

    let unit_tags = action
        .unit_tags
        .iter()
        .filter_map(|tag| match parse_tag(tag) {
            Some(tag) => Some(tag),
            None => {
                warn!(tag = %tag, "Dropping unparseable unit tag");
                None
            }
        })
        .collect();

    DecodedAction::Command(EngineCommand {
        ability_id,
        unit_tags,
        target_world_space_pos: action.target_world_space_pos.unwrap_or(Point2::NONE),
        target_unit_tag: action.target_unit_tag.as_deref().and_then(parse_tag),
        queue_command: action.queue_command.unwrap_or(false),
    })
}

/// Encode an engine command as the wire action an agent would send.
#[must_use]
pub fn encode_action(command: &EngineCommand) -> AgentAction {
    AgentAction {
        ability_id: Some(command.ability_id.to_string()),
        unit_tags: command.unit_tags.iter().map(u64::to_string).collect(),
        target_world_space_pos: Some(command.target_world_space_pos),
        target_unit_tag: command.target_unit_tag.map(|tag| tag.to_string()),
        queue_command: Some(command.queue_command),
    }
}

fn parse_ability_id(raw: &str) -> Option<u32> {
    let unsigned = raw.strip_prefix('+').unwrap_or(raw);
    let end = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    unsigned[..end].parse().ok()
}

fn parse_tag(tag: &str) -> Option<u64> {
    tag.trim().parse().ok()
}
