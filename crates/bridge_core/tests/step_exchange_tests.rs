//! Step exchange tests.
//!
//! One observation/action round trip per agent slot per frame: payload
//! contents, context hand-back, failure handling, ordering and rewards.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bridge_core::config::OrchestratorConfig;
use bridge_core::engine::CommandResult;
use bridge_core::error::TransportError;
use bridge_core::protocol::Point2;
use bridge_core::reward::{RewardContext, RewardFn, ScoreDelta};
use bridge_core::status::StatusCode;
use bridge_core::Orchestrator;
use bridge_test_utils::fixtures::{self, AGENT_ENDPOINT, MOVE_ABILITY};
use bridge_test_utils::proptest::prelude::*;
use bridge_test_utils::scripted::{move_reply, no_op_reply};
use bridge_test_utils::strategies::reward_sequence;
use bridge_test_utils::{MockEngine, ScriptedFactory};
use parking_lot::Mutex;

fn setup(config: OrchestratorConfig) -> (Arc<MockEngine>, Arc<ScriptedFactory>, Orchestrator) {
    let engine = Arc::new(MockEngine::new());
    let factory = Arc::new(ScriptedFactory::new());
    let orch = bridge_test_utils::orchestrator(&engine, &factory, config);
    (engine, factory, orch)
}

#[tokio::test]
async fn step_request_carries_frame_and_session_state() {
    let (engine, factory, orch) = setup(OrchestratorConfig::default());
    engine.set_units(vec![
        fixtures::worker(4_294_967_297, 10.0, 12.0),
        fixtures::mineral_field(7, 30.0, 40.0, 1_500),
        fixtures::bare_unit(9),
    ]);
    engine.set_player(fixtures::player(50, None));
    let transport = factory.transport(AGENT_ENDPOINT);
    transport.push_value(move_reply(&[4_294_967_297], 30.0, 40.0, Some("ctx-1")));

    orch.run(fixtures::map_a_config()).await;
    engine.start_game().await;
    engine.step(2).await;

    let calls = transport.step_calls();
    assert_eq!(calls.len(), 2);

    let first = calls[0].observation();
    assert_eq!(first["episode"], 1);
    assert_eq!(first["step"], 1);
    assert_eq!(first["slot"], 0);
    assert_eq!(first["mode"], "Training");
    assert_eq!(first["player"]["minerals"], 50);
    assert_eq!(first["lastReward"], serde_json::json!([0.0]));
    assert!(first["lastAction"].is_null());
    assert!(first["context"].is_null());

    let units = first["units"].as_array().unwrap();
    assert_eq!(units.len(), 3);
    assert_eq!(units[0]["id"], "4294967297");
    assert_eq!(units[0]["alliance"], "SELF");
    assert_eq!(units[1]["positions"].as_array().unwrap().len(), 2);
    assert_eq!(units[1]["mineralContents"], 1_500);
    assert!(units[2]["positions"].as_array().unwrap().is_empty());
    assert!(units[2]["health"].is_null());

    let second = calls[1].observation();
    assert_eq!(second["step"], 2);
    assert_eq!(second["context"], "ctx-1");
    assert_eq!(second["lastAction"]["abilityId"], "16");
}

#[tokio::test]
async fn returned_action_is_submitted_to_engine() {
    let (engine, factory, orch) = setup(OrchestratorConfig::default());
    factory
        .transport(AGENT_ENDPOINT)
        .push_value(move_reply(&[11, 12], 30.0, 40.0, None));

    orch.run(fixtures::map_a_config()).await;
    engine.start_game().await;
    engine.step(2).await;

    let submitted = engine.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].ability_id, MOVE_ABILITY);
    assert_eq!(submitted[0].unit_tags, vec![11, 12]);
    assert_eq!(submitted[0].target_world_space_pos, Point2::new(30.0, 40.0));
    assert!(!submitted[0].queue_command);
}

#[tokio::test]
async fn numeric_ability_id_is_submitted() {
    let (engine, factory, orch) = setup(OrchestratorConfig::default());
    factory.transport(AGENT_ENDPOINT).push_value(serde_json::json!({
        "action": { "abilityId": 16, "unitTags": [11], "targetWorldSpacePos": { "x": 5.0, "y": 6.0 } },
        "context": null,
    }));

    orch.run(fixtures::map_a_config()).await;
    engine.start_game().await;
    engine.step(1).await;

    let status = orch.status();
    assert_eq!(status.code, StatusCode::Running);
    assert!(status.errors.is_empty());
    let submitted = engine.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].ability_id, MOVE_ABILITY);
    assert_eq!(submitted[0].unit_tags, vec![11]);
}

#[tokio::test]
async fn no_op_and_missing_action_submit_nothing() {
    let (engine, factory, orch) = setup(OrchestratorConfig::default());
    let transport = factory.transport(AGENT_ENDPOINT);
    transport.push_value(no_op_reply(None));
    transport.push_value(serde_json::json!({ "context": "kept" }));

    orch.run(fixtures::map_a_config()).await;
    engine.start_game().await;
    engine.step(2).await;

    assert!(engine.submitted().is_empty());
    let stats = orch.observe().agent_stats[0].stats.clone();
    assert_eq!(stats.steps, 2);
    assert!(stats.last_action.unwrap().is_no_op());
}

#[tokio::test]
async fn null_context_clears_stored_context() {
    let (engine, factory, orch) = setup(OrchestratorConfig::default());
    let transport = factory.transport(AGENT_ENDPOINT);
    transport.push_value(no_op_reply(Some("first")));
    transport.push_value(no_op_reply(None));

    orch.run(fixtures::map_a_config()).await;
    engine.start_game().await;
    engine.step(3).await;

    let calls = transport.step_calls();
    assert_eq!(calls[1].observation()["context"], "first");
    assert!(calls[2].observation()["context"].is_null());
}

#[tokio::test(start_paused = true)]
async fn timed_out_call_keeps_context_and_run_continues() {
    let config = OrchestratorConfig {
        agent_timeout_ms: 100,
        ..Default::default()
    };
    let (engine, factory, orch) = setup(config);
    let transport = factory.transport(AGENT_ENDPOINT);
    transport.push_value(no_op_reply(Some("ctx-1")));
    transport.push_delayed(Duration::from_secs(10), no_op_reply(Some("too-late")));

    orch.run(fixtures::map_a_config()).await;
    engine.start_game().await;
    engine.step(2).await;

    let status = orch.status();
    assert_eq!(status.code, StatusCode::Error);
    assert_eq!(status.errors.len(), 1);
    assert!(status.errors[0].contains("timed out"));

    engine.step(1).await;
    let calls = transport.step_calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[2].observation()["context"], "ctx-1");
    assert_eq!(orch.observe().agent_stats[0].stats.steps, 2);
}

#[tokio::test]
async fn transport_failure_does_not_abort_run() {
    let (engine, factory, orch) = setup(OrchestratorConfig::default());
    let transport = factory.transport(AGENT_ENDPOINT);
    transport.push_failure(TransportError::Request("connection reset".into()));
    transport.push_value(serde_json::json!(["not", "an", "object"]));

    orch.run(fixtures::map_a_config()).await;
    engine.start_game().await;

    engine.step(1).await;
    assert_eq!(
        orch.status().errors,
        vec!["Agent request failed: connection reset".to_string()]
    );

    engine.step(1).await;
    let status = orch.status();
    assert_eq!(status.code, StatusCode::Error);
    assert_eq!(status.errors.len(), 1);
    assert!(status.errors[0].starts_with("Malformed agent response"));

    engine.step(1).await;
    assert_eq!(transport.step_calls().len(), 3);
    assert_eq!(orch.observe().agent_stats[0].stats.steps, 1);
}

#[tokio::test]
async fn rejected_command_is_recorded_not_fatal() {
    let (engine, factory, orch) = setup(OrchestratorConfig::default());
    engine.set_command_result(CommandResult::Unsupported);
    factory
        .transport(AGENT_ENDPOINT)
        .push_value(move_reply(&[11], 5.0, 5.0, None));

    orch.run(fixtures::map_a_config()).await;
    engine.start_game().await;
    engine.step(2).await;

    let status = orch.status();
    assert_eq!(status.code, StatusCode::Error);
    assert!(status.errors[0].contains("Engine rejected ability 16"));
    assert_eq!(engine.submitted().len(), 1);
    assert_eq!(orch.observe().agent_stats[0].stats.steps, 2);
}

#[tokio::test(start_paused = true)]
async fn exchanges_of_one_session_never_overlap() {
    let (engine, factory, orch) = setup(OrchestratorConfig::default());
    let endpoints = ["https://agent1/graphql", "https://agent2/graphql"];
    for endpoint in endpoints {
        let transport = factory.transport(endpoint);
        for _ in 0..4 {
            transport.push_delayed(Duration::from_millis(20), no_op_reply(None));
        }
    }

    orch.run(fixtures::agents_config("MapA", &endpoints)).await;
    engine.start_game().await;
    engine.step(4).await;

    for endpoint in endpoints {
        let transport = factory.transport(endpoint);
        assert_eq!(transport.max_in_flight(), 1);
        let steps: Vec<u64> = transport
            .step_calls()
            .iter()
            .map(|call| call.observation()["step"].as_u64().unwrap())
            .collect();
        assert_eq!(steps, vec![1, 2, 3, 4]);
    }
}

#[tokio::test]
async fn engine_frame_counter_is_authoritative() {
    let (engine, _factory, orch) = setup(OrchestratorConfig::default());
    orch.run(fixtures::map_a_config()).await;
    engine.start_game().await;
    engine.step(5).await;

    assert_eq!(engine.game_loop(), 5);
    assert_eq!(orch.observe().step, 5);
}

#[tokio::test]
async fn score_delta_reward_tracks_engine_score() {
    let engine = Arc::new(MockEngine::new());
    let factory = Arc::new(ScriptedFactory::new());
    let orch = bridge_test_utils::orchestrator(&engine, &factory, OrchestratorConfig::default())
        .with_reward(Arc::new(ScoreDelta));

    orch.run(fixtures::map_a_config()).await;
    engine.start_game().await;
    engine.set_player(fixtures::player(0, Some(10.0)));
    engine.step(1).await;
    engine.set_player(fixtures::player(0, Some(25.0)));
    engine.step(1).await;

    let stats = orch.observe().agent_stats[0].stats.clone();
    assert_eq!(stats.last_reward, vec![15.0]);
    assert_eq!(stats.total_reward, vec![25.0]);
    assert_eq!(stats.score, 25.0);
}

/// Hands out a fixed sequence of rewards, then zeros.
struct SequenceReward(Mutex<VecDeque<Vec<f64>>>);

impl RewardFn for SequenceReward {
    fn reward(&self, ctx: &RewardContext<'_>) -> Vec<f64> {
        self.0
            .lock()
            .pop_front()
            .unwrap_or_else(|| vec![0.0; ctx.dims])
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn total_reward_is_elementwise_sum(rewards in reward_sequence(3, 12)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();

        let stats = runtime.block_on(async {
            let engine = Arc::new(MockEngine::new());
            let factory = Arc::new(ScriptedFactory::new());
            let config = OrchestratorConfig {
                reward_dims: 3,
                ..Default::default()
            };
            let reward = SequenceReward(Mutex::new(rewards.iter().cloned().collect()));
            let orch = bridge_test_utils::orchestrator(&engine, &factory, config)
                .with_reward(Arc::new(reward));

            orch.run(fixtures::map_a_config()).await;
            engine.start_game().await;
            engine.step(rewards.len() as u64).await;
            orch.observe().agent_stats[0].stats.clone()
        });

        let mut expected = vec![0.0; 3];
        for reward in &rewards {
            for (total, value) in expected.iter_mut().zip(reward) {
                *total += value;
            }
        }
        prop_assert_eq!(stats.steps, rewards.len() as u64);
        for (actual, wanted) in stats.total_reward.iter().zip(&expected) {
            prop_assert!((actual - wanted).abs() < 1e-9);
        }
        if let Some(last) = rewards.last() {
            prop_assert_eq!(&stats.last_reward, last);
        }
    }
}
