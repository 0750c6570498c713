//! Test fixtures and helpers.
//!
//! Pre-built units, player totals and run configs for consistent testing.

use bridge_core::config::{AgentSettings, RunConfig};
use bridge_core::engine::{Alliance, PlayerCommon, Race, RawOrder, RawPosition, RawUnit};
use bridge_core::protocol::{Point2, Point3};

/// Endpoint used by the default single-agent configs.
pub const AGENT_ENDPOINT: &str = "https://agent1/graphql";

/// Move ability id.
pub const MOVE_ABILITY: u32 = 16;

/// Harvest ability id.
pub const HARVEST_ABILITY: u32 = 295;

/// Worker unit type id.
pub const WORKER_TYPE: u32 = 84;

/// Mineral field unit type id.
pub const MINERAL_TYPE: u32 = 341;

/// A friendly worker at `(x, y)` with no orders.
#[must_use]
pub fn worker(tag: u64, x: f32, y: f32) -> RawUnit {
    RawUnit {
        tag,
        unit_type: Some(WORKER_TYPE),
        pos: Some(RawPosition::Point(Point3::new(x, y, 0.0))),
        orders: Some(Vec::new()),
        health: Some(20.0),
        health_max: Some(20.0),
        available_abilities: Some(vec![MOVE_ABILITY, HARVEST_ABILITY]),
        alliance: Some(Alliance::Own),
        ..Default::default()
    }
}

/// A worker already moving to `target`.
#[must_use]
pub fn moving_worker(tag: u64, x: f32, y: f32, target: Point2) -> RawUnit {
    RawUnit {
        orders: Some(vec![RawOrder {
            ability_id: MOVE_ABILITY,
            target_world_space_pos: Some(target),
            target_unit_tag: None,
        }]),
        ..worker(tag, x, y)
    }
}

/// A neutral mineral field.
#[must_use]
pub fn mineral_field(tag: u64, x: f32, y: f32, contents: u32) -> RawUnit {
    RawUnit {
        tag,
        unit_type: Some(MINERAL_TYPE),
        pos: Some(RawPosition::Points(vec![
            Point3::new(x, y, 0.0),
            Point3::new(x + 1.0, y, 0.0),
        ])),
        alliance: Some(Alliance::Neutral),
        mineral_contents: Some(contents),
        ..Default::default()
    }
}

/// An entity with nothing but a tag.
#[must_use]
pub fn bare_unit(tag: u64) -> RawUnit {
    RawUnit {
        tag,
        ..Default::default()
    }
}

/// `count` units alternating between workers and mineral fields.
#[must_use]
pub fn unit_field(count: usize) -> Vec<RawUnit> {
    (0..count)
        .map(|i| {
            let tag = 4_294_967_296 + i as u64;
            let offset = (i % 64) as f32;
            if i % 2 == 0 {
                moving_worker(tag, offset, offset, Point2::new(50.0, 50.0))
            } else {
                mineral_field(tag, offset, 80.0, 1_500)
            }
        })
        .collect()
}

/// Player totals with the given score.
#[must_use]
pub fn player(minerals: u32, score: Option<f64>) -> PlayerCommon {
    PlayerCommon {
        minerals,
        vespene: 0,
        food_used: 12,
        food_cap: 15,
        score,
    }
}

/// `MapA` with one agent on [`AGENT_ENDPOINT`] and one engine-AI opponent.
#[must_use]
pub fn map_a_config() -> RunConfig {
    RunConfig::new("MapA")
        .with_agent(AgentSettings::agent(Race::Random, AGENT_ENDPOINT))
        .with_agent(AgentSettings::computer(Race::Random))
}

/// A run where no slot has a usable endpoint.
#[must_use]
pub fn engine_only_config() -> RunConfig {
    RunConfig::new("MapA")
        .with_agent(AgentSettings::agent(Race::Random, "not a uri"))
        .with_agent(AgentSettings::computer(Race::Zerg))
}

/// One agent slot per endpoint, in order.
#[must_use]
pub fn agents_config(environment_id: &str, endpoints: &[&str]) -> RunConfig {
    endpoints.iter().fold(RunConfig::new(environment_id), |config, endpoint| {
        config.with_agent(AgentSettings::agent(Race::Random, *endpoint))
    })
}
