//! Property-based testing strategies.

use bridge_core::engine::EngineCommand;
use bridge_core::protocol::Point2;
use proptest::prelude::*;

/// Engine commands with a real point target.
pub fn engine_command() -> impl Strategy<Value = EngineCommand> {
    (
        1u32..5_000,
        prop::collection::vec(any::<u64>(), 0..8),
        (0.0f32..256.0, 0.0f32..256.0),
        prop::option::of(any::<u64>()),
        any::<bool>(),
    )
        .prop_map(|(ability_id, unit_tags, (x, y), target_unit_tag, queue_command)| {
            EngineCommand {
                ability_id,
                unit_tags,
                target_world_space_pos: Point2::new(x, y),
                target_unit_tag,
                queue_command,
            }
        })
}

/// Sequences of `dims`-wide reward vectors.
pub fn reward_sequence(dims: usize, max_steps: usize) -> impl Strategy<Value = Vec<Vec<f64>>> {
    prop::collection::vec(prop::collection::vec(-100.0f64..100.0, dims), 0..max_steps)
}
