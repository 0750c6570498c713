//! Deterministic sandbox world.
//!
//! Units move in straight lines at a fixed speed. Workers ordered to gather
//! walk to a mineral field and then mine it a fixed amount per frame,
//! credited straight to their owner. There is no combat and no pathing.

use bridge_core::engine::{
    Alliance, CommandResult, EngineCommand, MatchResult, Outcome, PlayerCommon, PlayerResult,
    RawOrder, RawPosition, RawUnit,
};
use bridge_core::protocol::{Point2, Point3};

use crate::maps::SandboxMap;

/// Stop ability id.
pub const STOP_ABILITY: u32 = 4;
/// Move ability id.
pub const MOVE_ABILITY: u32 = 16;
/// Gather ability id.
pub const GATHER_ABILITY: u32 = 295;

/// Worker unit type id.
pub const WORKER_TYPE: u32 = 84;
/// Mineral field unit type id.
pub const MINERAL_FIELD_TYPE: u32 = 341;

/// World units travelled per frame.
pub const UNIT_SPEED: f32 = 0.5;
/// Minerals mined per frame by a worker next to a field.
pub const GATHER_PER_FRAME: u32 = 1;
/// Distance at which a worker can mine a field.
pub const GATHER_RANGE: f32 = 1.0;

/// First tag handed out; above 2^32 like real engine tags.
const FIRST_TAG: u64 = 1 << 32;

const WORKER_HEALTH: f32 = 40.0;

#[derive(Debug, Clone, PartialEq)]
enum Order {
    Move(Point2),
    Gather(u64),
}

#[derive(Debug, Clone)]
struct Unit {
    tag: u64,
    owner: Option<usize>,
    unit_type: u32,
    pos: Point2,
    order: Option<Order>,
    minerals: u32,
}

impl Unit {
    fn is_field(&self) -> bool {
        self.unit_type == MINERAL_FIELD_TYPE
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PlayerState {
    minerals: u32,
    collected: u32,
    workers: u32,
}

/// Mutable state of one sandbox match.
#[derive(Debug, Clone)]
pub struct World {
    map: SandboxMap,
    game_loop: u64,
    units: Vec<Unit>,
    players: Vec<PlayerState>,
}

impl World {
    /// Lay out `map` for `players` players with `workers` workers each.
    #[must_use]
    pub fn new(map: SandboxMap, players: usize, workers: u32) -> Self {
        let mut next_tag = FIRST_TAG;
        let mut units = Vec::new();

        for pos in &map.mineral_fields {
            units.push(Unit {
                tag: next_tag,
                owner: None,
                unit_type: MINERAL_FIELD_TYPE,
                pos: *pos,
                order: None,
                minerals: map.field_contents,
            });
            next_tag += 1;
        }

        for (slot, start) in map.start_locations.iter().take(players).enumerate() {
            for i in 0..workers {
                units.push(Unit {
                    tag: next_tag,
                    owner: Some(slot),
                    unit_type: WORKER_TYPE,
                    pos: map.clamp(Point2::new(start.x + i as f32, start.y)),
                    order: None,
                    minerals: 0,
                });
                next_tag += 1;
            }
        }

        Self {
            map,
            game_loop: 0,
            units,
            players: vec![
                PlayerState {
                    minerals: 50,
                    collected: 0,
                    workers,
                };
                players
            ],
        }
    }

    /// Current frame counter.
    #[must_use]
    pub fn game_loop(&self) -> u64 {
        self.game_loop
    }

    /// Advance one frame: move units and mine minerals.
    pub fn advance(&mut self) {
        self.game_loop += 1;

        for i in 0..self.units.len() {
            let Some(order) = self.units[i].order.clone() else {
                continue;
            };
            match order {
                Order::Move(target) => {
                    if step_towards(&mut self.units[i].pos, target) {
                        self.units[i].order = None;
                    }
                }
                Order::Gather(field_tag) => self.gather(i, field_tag),
            }
        }
    }

    fn gather(&mut self, worker: usize, field_tag: u64) {
        let Some(field) = self.units.iter().position(|u| u.tag == field_tag && u.minerals > 0) else {
            self.units[worker].order = None;
            return;
        };

        let field_pos = self.units[field].pos;
        if distance(self.units[worker].pos, field_pos) > GATHER_RANGE {
            step_towards(&mut self.units[worker].pos, field_pos);
            return;
        }

        let mined = self.units[field].minerals.min(GATHER_PER_FRAME);
        self.units[field].minerals -= mined;
        if let Some(owner) = self.units[worker].owner {
            if let Some(player) = self.players.get_mut(owner) {
                player.minerals += mined;
                player.collected += mined;
            }
        }
    }

    /// Order every idle worker of `slot` to mine the nearest field.
    pub fn computer_turn(&mut self, slot: usize) {
        let fields: Vec<(u64, Point2)> = self
            .units
            .iter()
            .filter(|u| u.is_field() && u.minerals > 0)
            .map(|u| (u.tag, u.pos))
            .collect();

        for unit in &mut self.units {
            if unit.owner != Some(slot) || unit.order.is_some() {
                continue;
            }
            let nearest = fields.iter().min_by(|a, b| {
                distance(unit.pos, a.1).total_cmp(&distance(unit.pos, b.1))
            });
            if let Some((tag, _)) = nearest {
                unit.order = Some(Order::Gather(*tag));
            }
        }
    }

    /// Apply a command issued by `slot`.
    pub fn apply(&mut self, slot: usize, command: &EngineCommand) -> CommandResult {
        if command.unit_tags.is_empty() {
            return CommandResult::Error;
        }
        let owned = command.unit_tags.iter().all(|tag| {
            self.units
                .iter()
                .any(|u| u.tag == *tag && u.owner == Some(slot))
        });
        if !owned {
            return CommandResult::Error;
        }

        let order = match command.ability_id {
            STOP_ABILITY => None,
            MOVE_ABILITY => {
                if command.target_world_space_pos == Point2::NONE {
                    return CommandResult::Error;
                }
                Some(Order::Move(self.map.clamp(command.target_world_space_pos)))
            }
            GATHER_ABILITY => {
                let Some(target) = command.target_unit_tag else {
                    return CommandResult::Error;
                };
                if !self.units.iter().any(|u| u.tag == target && u.is_field()) {
                    return CommandResult::Error;
                }
                Some(Order::Gather(target))
            }
            _ => return CommandResult::Unsupported,
        };

        for unit in &mut self.units {
            if command.unit_tags.contains(&unit.tag) {
                unit.order = order.clone();
            }
        }
        CommandResult::Success
    }

    /// Units as seen by `slot`.
    #[must_use]
    pub fn units_for(&self, slot: usize) -> Vec<RawUnit> {
        self.units.iter().map(|unit| raw_unit(unit, slot)).collect()
    }

    /// Totals of `slot`.
    #[must_use]
    pub fn player(&self, slot: usize) -> PlayerCommon {
        let state = self.players.get(slot).copied().unwrap_or_default();
        PlayerCommon {
            minerals: state.minerals,
            vespene: 0,
            food_used: state.workers,
            food_cap: 15,
            score: Some(f64::from(state.collected)),
        }
    }

    /// Final result; the player who mined the most wins.
    #[must_use]
    pub fn result(&self, stopped: bool) -> MatchResult {
        let best = self.players.iter().map(|p| p.collected).max().unwrap_or(0);
        let leaders = self.players.iter().filter(|p| p.collected == best).count();

        let results = self
            .players
            .iter()
            .enumerate()
            .map(|(slot, player)| PlayerResult {
                slot,
                outcome: if stopped {
                    Outcome::Undecided
                } else if player.collected < best {
                    Outcome::Defeat
                } else if leaders > 1 {
                    Outcome::Tie
                } else {
                    Outcome::Victory
                },
            })
            .collect();

        MatchResult {
            game_loop: self.game_loop,
            results,
        }
    }
}

fn raw_unit(unit: &Unit, viewer: usize) -> RawUnit {
    let alliance = match unit.owner {
        None => Alliance::Neutral,
        Some(owner) if owner == viewer => Alliance::Own,
        Some(_) => Alliance::Enemy,
    };

    if unit.is_field() {
        return RawUnit {
            tag: unit.tag,
            unit_type: Some(unit.unit_type),
            pos: Some(RawPosition::Points(vec![
                Point3::new(unit.pos.x, unit.pos.y, 0.0),
                Point3::new(unit.pos.x + 1.0, unit.pos.y, 0.0),
            ])),
            alliance: Some(alliance),
            mineral_contents: Some(unit.minerals),
            ..Default::default()
        };
    }

    let orders = unit
        .order
        .iter()
        .map(|order| match order {
            Order::Move(target) => RawOrder {
                ability_id: MOVE_ABILITY,
                target_world_space_pos: Some(*target),
                target_unit_tag: None,
            },
            Order::Gather(tag) => RawOrder {
                ability_id: GATHER_ABILITY,
                target_world_space_pos: None,
                target_unit_tag: Some(*tag),
            },
        })
        .collect();

    RawUnit {
        tag: unit.tag,
        unit_type: Some(unit.unit_type),
        pos: Some(RawPosition::Point(Point3::new(unit.pos.x, unit.pos.y, 0.0))),
        orders: Some(orders),
        health: Some(WORKER_HEALTH),
        health_max: Some(WORKER_HEALTH),
        // Abilities are only visible for own units.
        available_abilities: (alliance == Alliance::Own)
            .then(|| vec![STOP_ABILITY, MOVE_ABILITY, GATHER_ABILITY]),
        alliance: Some(alliance),
        ..Default::default()
    }
}

fn distance(a: Point2, b: Point2) -> f32 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Move `pos` one frame towards `target`; true once it has arrived.
fn step_towards(pos: &mut Point2, target: Point2) -> bool {
    let remaining = distance(*pos, target);
    if remaining <= UNIT_SPEED {
        *pos = target;
        return true;
    }
    let scale = UNIT_SPEED / remaining;
    pos.x += (target.x - pos.x) * scale;
    pos.y += (target.y - pos.y) * scale;
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maps::find_map;

    fn two_bases() -> World {
        World::new(find_map("Sandbox/TwoBases").unwrap(), 2, 2)
    }

    fn own_workers(world: &World, slot: usize) -> Vec<RawUnit> {
        world
            .units_for(slot)
            .into_iter()
            .filter(|u| u.alliance == Some(Alliance::Own))
            .collect()
    }

    fn move_command(tag: u64, x: f32, y: f32) -> EngineCommand {
        EngineCommand {
            ability_id: MOVE_ABILITY,
            unit_tags: vec![tag],
            target_world_space_pos: Point2::new(x, y),
            target_unit_tag: None,
            queue_command: false,
        }
    }

    #[test]
    fn test_layout() {
        let world = two_bases();
        let units = world.units_for(0);
        assert_eq!(units.len(), 6 + 4);
        assert!(units.iter().all(|u| u.tag >= FIRST_TAG));
        assert_eq!(own_workers(&world, 0).len(), 2);
        assert_eq!(
            units.iter().filter(|u| u.alliance == Some(Alliance::Enemy)).count(),
            2
        );
    }

    #[test]
    fn test_move_arrives() {
        let mut world = two_bases();
        let tag = own_workers(&world, 0)[0].tag;
        assert_eq!(world.apply(0, &move_command(tag, 8.0, 10.0)), CommandResult::Success);

        for _ in 0..4 {
            world.advance();
        }

        let worker = world.units_for(0).into_iter().find(|u| u.tag == tag).unwrap();
        assert_eq!(worker.pos, Some(RawPosition::Point(Point3::new(8.0, 10.0, 0.0))));
        assert_eq!(worker.orders, Some(Vec::new()));
    }

    #[test]
    fn test_foreign_units_rejected() {
        let mut world = two_bases();
        let enemy = own_workers(&world, 1)[0].tag;
        assert_eq!(world.apply(0, &move_command(enemy, 1.0, 1.0)), CommandResult::Error);
    }

    #[test]
    fn test_unknown_ability_unsupported() {
        let mut world = two_bases();
        let tag = own_workers(&world, 0)[0].tag;
        let command = EngineCommand {
            ability_id: 9_999,
            ..move_command(tag, 1.0, 1.0)
        };
        assert_eq!(world.apply(0, &command), CommandResult::Unsupported);
    }

    #[test]
    fn test_move_without_target_rejected() {
        let mut world = two_bases();
        let tag = own_workers(&world, 0)[0].tag;
        assert_eq!(
            world.apply(0, &move_command(tag, -1.0, -1.0)),
            CommandResult::Error
        );
    }

    #[test]
    fn test_computer_mines_and_wins() {
        let mut world = two_bases();
        for _ in 0..60 {
            world.computer_turn(1);
            world.advance();
        }

        let player = world.player(1);
        assert!(player.minerals > 50);
        assert_eq!(player.score, Some(f64::from(player.minerals - 50)));

        let result = world.result(false);
        assert_eq!(result.game_loop, 60);
        assert_eq!(result.results[1].outcome, Outcome::Victory);
        assert_eq!(result.results[0].outcome, Outcome::Defeat);
    }

    #[test]
    fn test_stopped_result_is_undecided() {
        let world = two_bases();
        let result = world.result(true);
        assert!(result.results.iter().all(|r| r.outcome == Outcome::Undecided));
    }
}
