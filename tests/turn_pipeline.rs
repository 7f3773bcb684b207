use std::{
    fs,
    path::Path,
    sync::{Arc, Mutex},
};

use badlands::{
    agent::RoleKind,
    engine::{EngineBuilder, EngineSettings},
    events::{EventSink, SimEvent},
    scenario::{Scenario, ScenarioLoader},
    snapshot::RunReport,
    world::{OutcomeKind, OutcomeReason},
};
use tempfile::tempdir;

fn skirmish() -> Scenario {
    ScenarioLoader::new(env!("CARGO_MANIFEST_DIR"))
        .load("scenarios/skirmish.yaml")
        .expect("scenario should load")
}

fn settings(scenario: &Scenario, dir: &Path, interval: u64) -> EngineSettings {
    EngineSettings {
        scenario_name: scenario.name.clone(),
        seed: scenario.seed,
        max_turns: scenario.max_turns,
        snapshot_interval_turns: interval,
        snapshot_dir: dir.to_path_buf(),
    }
}

#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<SimEvent>>>);

impl EventSink for SharedSink {
    fn accept(&mut self, event: &SimEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

#[test]
fn same_seed_replays_identically() {
    let scenario = skirmish();
    let temp = tempdir().unwrap();
    let run = || {
        let mut world = scenario.build_world().unwrap();
        let mut engine = EngineBuilder::new(settings(&scenario, temp.path(), 0))
            .with_turn_pipeline()
            .build();
        engine.run(&mut world, 40).unwrap();
        (
            world.events().all().to_vec(),
            serde_json::to_value(world.snapshot(&scenario.name)).unwrap(),
        )
    };
    let (events_a, snapshot_a) = run();
    let (events_b, snapshot_b) = run();
    assert!(events_a.len() > 1);
    assert_eq!(events_a, events_b);
    assert_eq!(snapshot_a, snapshot_b);
}

#[test]
fn engine_runs_hook_each_turn() {
    let scenario = skirmish();
    let temp = tempdir().unwrap();
    let mut world = scenario.build_world().unwrap();
    let mut engine = EngineBuilder::new(settings(&scenario, temp.path(), 0))
        .with_turn_pipeline()
        .build();

    let mut turns = Vec::new();
    engine
        .run_with_hook(&mut world, 6, |snapshot| turns.push(snapshot.turn))
        .expect("run succeeds");

    assert!(!turns.is_empty());
    assert_eq!(turns.first().copied(), Some(1));
    assert!(turns.windows(2).all(|w| w[1] == w[0] + 1));
    assert_eq!(turns.last().copied(), Some(world.turn()));
}

#[test]
fn turn_limit_ends_the_run_and_freezes_the_world() {
    let mut scenario = skirmish();
    scenario.max_turns = 3;
    let temp = tempdir().unwrap();
    let mut world = scenario.build_world().unwrap();
    let mut engine = EngineBuilder::new(settings(&scenario, temp.path(), 0))
        .with_turn_pipeline()
        .build();

    let outcome = engine.run(&mut world, 10).unwrap().expect("run should end");
    assert_eq!(outcome.kind, OutcomeKind::Timeout);
    assert_eq!(outcome.reason, OutcomeReason::TurnLimit);
    assert_eq!(world.turn(), 3);

    let before = world.events().len();
    let summary = engine.advance_turn(&mut world).unwrap();
    assert!(summary.events.is_empty());
    assert_eq!(summary.outcome, Some(outcome));
    assert_eq!(world.turn(), 3);
    assert_eq!(world.events().len(), before);
}

#[test]
fn every_agent_stays_within_its_bounds() {
    let scenario = skirmish();
    let temp = tempdir().unwrap();
    let mut world = scenario.build_world().unwrap();
    let mut engine = EngineBuilder::new(settings(&scenario, temp.path(), 0))
        .with_turn_pipeline()
        .build();
    let mut dead = Vec::new();
    for _ in 0..scenario.max_turns {
        let summary = engine.advance_turn(&mut world).unwrap();
        let dims = world.grid().dims();
        for agent in world.agents() {
            assert!((0..=agent.max_health()).contains(&agent.health()));
            assert!((0..=agent.max_stamina()).contains(&agent.stamina()));
            assert!((0..dims.width()).contains(&agent.pos.x));
            assert!((0..dims.height()).contains(&agent.pos.y));
            assert_eq!(agent.health() == 0, !agent.is_alive());
            if dead.contains(&agent.id) {
                assert!(!agent.is_alive(), "{} came back", agent.name);
            }
            if !agent.is_alive() && !dead.contains(&agent.id) {
                dead.push(agent.id);
            }
        }
        if summary.outcome.is_some() {
            break;
        }
    }
}

#[test]
fn sinks_receive_each_turns_events_in_order() {
    let scenario = skirmish();
    let temp = tempdir().unwrap();
    let mut world = scenario.build_world().unwrap();
    let start = world.events().len();
    let sink = SharedSink::default();
    let mut engine = EngineBuilder::new(settings(&scenario, temp.path(), 0))
        .with_turn_pipeline()
        .with_sink(sink.clone())
        .build();
    engine.run(&mut world, 15).unwrap();

    let seen = sink.0.lock().unwrap().clone();
    assert_eq!(seen.as_slice(), world.events().since(start));
    assert!(seen.windows(2).all(|w| w[0].turn <= w[1].turn));
}

#[test]
fn snapshots_land_on_the_interval() {
    let scenario = skirmish();
    let temp = tempdir().unwrap();
    let mut world = scenario.build_world().unwrap();
    let mut engine = EngineBuilder::new(settings(&scenario, temp.path(), 5))
        .with_turn_pipeline()
        .build();
    engine.run(&mut world, 10).unwrap();

    let dir = temp.path().join(&scenario.name);
    let written = engine.snapshot_writer().written().len() as u64;
    assert_eq!(written, world.turn() / 5);
    if world.turn() >= 5 {
        let text = fs::read_to_string(dir.join("turn_000005.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["turn"], 5);
        assert_eq!(value["scenario"], "skirmish");
    }
    assert!(!dir.join("turn_000004.json").exists());
}

#[test]
fn export_report_carries_the_outcome() {
    let mut scenario = skirmish();
    scenario.max_turns = 4;
    let temp = tempdir().unwrap();
    let mut world = scenario.build_world().unwrap();
    let mut engine = EngineBuilder::new(settings(&scenario, temp.path(), 0))
        .with_turn_pipeline()
        .build();
    engine.run(&mut world, 10).unwrap();

    let path = temp.path().join("reports/run.json");
    RunReport::from_world(&world, &scenario.name, scenario.seed)
        .write(&path)
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["seed"], 7);
    assert_eq!(value["turns"], world.turn());
    assert!(value["outcome"]["kind"].is_string());
    let stamp = value["generated_at"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
    assert_eq!(
        value["events"].as_array().unwrap().len(),
        world.events().len()
    );
}

#[test]
fn q_tables_survive_between_runs() {
    let scenario = skirmish();
    let temp = tempdir().unwrap();
    let q_dir = temp.path().join("q");
    let mut world = scenario.build_world().unwrap();
    let mut engine = EngineBuilder::new(settings(&scenario, temp.path(), 0))
        .with_turn_pipeline()
        .build();
    engine.run(&mut world, 20).unwrap();
    assert_eq!(world.save_q_tables(&q_dir).unwrap(), 2);

    let learned = |w: &badlands::World, kind: RoleKind| {
        let id = w.find_role(kind).unwrap();
        w.policy(id).unwrap().learner().unwrap().table().len()
    };
    let saved = learned(&world, RoleKind::Protagonist);
    assert!(saved > 0);
    assert!(q_dir.join("protagonist.json").exists());
    assert!(q_dir.join("synthetic.json").exists());

    let mut fresh = scenario.build_world().unwrap();
    assert_eq!(learned(&fresh, RoleKind::Protagonist), 0);
    assert_eq!(fresh.load_q_tables(&q_dir), 2);
    assert_eq!(learned(&fresh, RoleKind::Protagonist), saved);
}

#[test]
fn reset_makes_the_run_repeatable() {
    let scenario = skirmish();
    let temp = tempdir().unwrap();
    let sink = SharedSink::default();
    let mut engine = EngineBuilder::new(settings(&scenario, temp.path(), 0))
        .with_turn_pipeline()
        .with_sink(sink.clone())
        .build();

    let mut world = scenario.build_world().unwrap();
    engine.run(&mut world, 12).unwrap();
    let first = world.events().all().to_vec();

    engine.reset();
    let mut world = scenario.build_world().unwrap();
    engine.run(&mut world, 12).unwrap();
    assert_eq!(world.events().all(), first.as_slice());
}
