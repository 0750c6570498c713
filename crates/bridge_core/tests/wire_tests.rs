//! Wire-level action tests.
//!
//! Actions travel as JSON text between the orchestrator and agents; tags
//! above 2^53 must survive the trip.

use bridge_core::codec::{decode_action, encode_action, DecodedAction};
use bridge_core::protocol::{AgentAction, StepResponse};
use bridge_test_utils::proptest::prelude::*;
use bridge_test_utils::strategies::engine_command;

proptest! {
    #[test]
    fn action_survives_json_text(command in engine_command()) {
        let text = serde_json::to_string(&encode_action(&command)).unwrap();
        let parsed: AgentAction = serde_json::from_str(&text).unwrap();

        prop_assert_eq!(decode_action(&parsed), DecodedAction::Command(command));
    }
}

#[test]
fn large_tags_are_strings_on_the_wire() {
    let response = StepResponse::from_value(serde_json::json!({
        "action": { "abilityId": "16", "unitTags": ["18446744073709551615"] },
    }))
    .unwrap();

    match decode_action(&response.action.unwrap()) {
        DecodedAction::Command(command) => assert_eq!(command.unit_tags, vec![u64::MAX]),
        DecodedAction::NoOp => panic!("expected a command"),
    }
}

#[test]
fn numeric_identifiers_decode_to_a_command() {
    let response = StepResponse::from_value(serde_json::json!({
        "action": {
            "abilityId": 16,
            "unitTags": [11, "12"],
            "targetWorldSpacePos": { "x": 30.0, "y": 40.0 },
            "targetUnitTag": 4_294_967_297_u64,
        },
        "context": "numeric",
    }))
    .unwrap();

    match decode_action(&response.action.unwrap()) {
        DecodedAction::Command(command) => {
            assert_eq!(command.ability_id, 16);
            assert_eq!(command.unit_tags, vec![11, 12]);
            assert_eq!(command.target_unit_tag, Some(4_294_967_297));
        }
        DecodedAction::NoOp => panic!("expected a command"),
    }
}
