//! End-to-end runs on the sandbox engine with scripted agents.

use std::sync::Arc;
use std::time::Duration;

use bridge_core::config::{AgentSettings, OrchestratorConfig, RunConfig};
use bridge_core::engine::Race;
use bridge_core::protocol::Observation;
use bridge_core::status::StatusCode;
use bridge_headless::{HeadlessRunner, RunnerOptions, SandboxConfig, SandboxEngine};
use bridge_test_utils::fixtures::AGENT_ENDPOINT;
use bridge_test_utils::scripted::move_reply;
use bridge_test_utils::ScriptedFactory;
use tempfile::TempDir;

/// Tag of slot 0's first worker on `Sandbox/TwoBases` (six fields come first).
const FIRST_WORKER: u64 = (1 << 32) + 6;

fn runner(factory: &Arc<ScriptedFactory>, frames: u64, frame_ms: u64) -> HeadlessRunner {
    let engine = Arc::new(SandboxEngine::new(SandboxConfig {
        frame_limit: frames,
        frame_interval_ms: frame_ms,
        workers_per_player: 2,
    }));
    HeadlessRunner::new(
        engine,
        factory.clone(),
        OrchestratorConfig::default(),
        RunnerOptions {
            observe_interval: Duration::from_millis(5),
        },
    )
}

fn two_bases() -> RunConfig {
    RunConfig::new("Sandbox/TwoBases")
        .with_agent(AgentSettings::agent(Race::Terran, AGENT_ENDPOINT))
        .with_agent(AgentSettings::computer(Race::Zerg))
}

fn parse_lines(out: &[u8]) -> Vec<Observation> {
    String::from_utf8(out.to_vec())
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn match_plays_to_the_frame_limit() {
    let factory = Arc::new(ScriptedFactory::new());
    let runner = runner(&factory, 30, 0);
    let mut out = Vec::new();

    let status = runner.run(two_bases(), &mut out).await.unwrap();

    assert_eq!(status.code, StatusCode::Ended);
    let lines = parse_lines(&out);
    assert!(lines.len() >= 2);
    assert_eq!(lines[0].status.code, StatusCode::Starting);

    let last = lines.last().unwrap();
    assert_eq!(last.step, 30);
    assert_eq!(last.agent_stats.len(), 1);
    assert_eq!(last.agent_stats[0].stats.steps, 30);
    assert_eq!(factory.transport(AGENT_ENDPOINT).step_calls().len(), 30);
}

#[tokio::test]
async fn agent_move_is_applied_to_the_world() {
    let factory = Arc::new(ScriptedFactory::new());
    factory
        .transport(AGENT_ENDPOINT)
        .set_default_reply(move_reply(&[FIRST_WORKER], 8.0, 12.0, None));
    let runner = runner(&factory, 30, 0);
    let mut out = Vec::new();

    let status = runner.run(two_bases(), &mut out).await.unwrap();

    assert_eq!(status.code, StatusCode::Ended);
    let last = parse_lines(&out).pop().unwrap();
    let worker = last
        .units
        .iter()
        .find(|unit| unit.id == FIRST_WORKER.to_string())
        .unwrap();
    assert_eq!(worker.positions.len(), 1);
    assert_eq!(worker.positions[0].x, 8.0);
    assert_eq!(worker.positions[0].y, 12.0);
}

#[tokio::test]
async fn run_without_agents_reports_configuration_error() {
    let factory = Arc::new(ScriptedFactory::new());
    let runner = runner(&factory, 30, 0);
    let mut out = Vec::new();
    let config = RunConfig::new("Sandbox/TwoBases")
        .with_agent(AgentSettings::computer(Race::Terran))
        .with_agent(AgentSettings::computer(Race::Zerg));

    let status = runner.run(config, &mut out).await.unwrap();

    assert_eq!(status.code, StatusCode::Error);
    assert!(status.errors[0].contains("must have at least one valid agent endpoint"));
}

#[tokio::test]
async fn stop_ends_a_long_match() {
    let factory = Arc::new(ScriptedFactory::new());
    let runner = runner(&factory, 100_000, 1);
    let orchestrator = runner.orchestrator().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        orchestrator.stop().await;
    });
    let mut out = Vec::new();

    let status = runner.run(two_bases(), &mut out).await.unwrap();

    assert_eq!(status.code, StatusCode::Stopped);
    let last = parse_lines(&out).pop().unwrap();
    assert!(last.step < 100_000);
}

#[tokio::test]
async fn unknown_map_is_an_engine_error() {
    let factory = Arc::new(ScriptedFactory::new());
    let runner = runner(&factory, 30, 0);
    let mut out = Vec::new();
    let config = RunConfig::new("Sandbox/Nowhere")
        .with_agent(AgentSettings::agent(Race::Random, AGENT_ENDPOINT));

    let status = runner.run(config, &mut out).await.unwrap();

    assert_eq!(status.code, StatusCode::Error);
    assert!(status.errors[0].contains("unknown map"));
}

#[tokio::test]
async fn run_file_drives_a_match() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("run.ron");
    std::fs::write(
        &path,
        format!(
            r#"(
                environmentId: "Sandbox/Crossroads",
                mode: Performing,
                agents: [
                    (race: PROTOSS, endpoint: Some("{AGENT_ENDPOINT}")),
                    (race: TERRAN, difficulty: Some(EASY)),
                ],
            )"#
        ),
    )
    .unwrap();

    let factory = Arc::new(ScriptedFactory::new());
    let runner = runner(&factory, 10, 0);
    let mut out = Vec::new();

    let config = RunConfig::load(&path).unwrap();
    let status = runner.run(config, &mut out).await.unwrap();

    assert_eq!(status.code, StatusCode::Ended);
    let calls = factory.transport(AGENT_ENDPOINT).step_calls();
    assert_eq!(calls.len(), 10);
    assert_eq!(calls[0].observation()["mode"], "Performing");
}
