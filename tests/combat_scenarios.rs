use badlands::{
    agent::{AgentId, AgentState, BossPhase, Role, RoleKind},
    engine::{EngineBuilder, EngineSettings},
    events::EventKind,
    grid::{Dims, Grid, Pos, Terrain},
    honour::{self, Rank},
    items::Item,
    resolver,
    strategy::{BucketConfig, Intent, LearningParams, Strategy},
    systems::{HazardSystem, WeatherSystem},
    weather::{WeatherKind, WeatherState, WeatherTable},
    world::World,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tempfile::tempdir;

fn world() -> World {
    World::new(Grid::filled(Dims::new(20, 20).unwrap(), Terrain::Empty))
}

fn settings(name: &str, dir: &std::path::Path) -> EngineSettings {
    EngineSettings {
        scenario_name: name.into(),
        seed: 1,
        max_turns: 0,
        snapshot_interval_turns: 0,
        snapshot_dir: dir.to_path_buf(),
    }
}

fn acid_rain() -> WeatherTable {
    WeatherTable {
        transition_chance: 0.0,
        calm_weight: 0.5,
        initial: WeatherKind::AcidRain,
    }
}

fn add(world: &mut World, state: AgentState) -> AgentId {
    let strategy = Strategy::for_role(
        &state.role,
        LearningParams::protagonist(),
        BucketConfig::default(),
        false,
    );
    world.spawn(state, strategy)
}

#[test]
fn protagonist_kills_weak_wildlife_for_a_trophy() {
    let mut w = world();
    let dek = add(
        &mut w,
        AgentState::new("Dek", Pos::new(5, 5), Role::protagonist()).with_health(100),
    );
    let beast = add(
        &mut w,
        AgentState::new("Hound", Pos::new(6, 5), Role::wildlife(Pos::new(6, 5), 0.5)).with_health(10),
    );
    let mut rng = ChaCha8Rng::seed_from_u64(5);

    w.begin_turn();
    let res = resolver::resolve(&mut w, dek, Intent::Attack { target: beast }, &mut rng);
    honour::judge(&mut w, &res);

    let hound = w.agent(beast).unwrap();
    assert_eq!(hound.health(), 0);
    assert!(!hound.is_alive());

    let record = w.agent(dek).unwrap().honour().unwrap().clone();
    assert_eq!(record.trophies.len(), 1);
    assert!(record.honour > 0.0);
    assert!(record.first_kill);
    assert!(w.ledger(dek).unwrap().honour_delta > 0.0);
    assert_eq!(w.ledger(dek).unwrap().wildlife_kills, 1);
    assert!(w.events().of_kind(EventKind::Combat).count() >= 1);
    assert!(w.events().of_kind(EventKind::Honour).count() >= 1);
}

#[test]
fn acid_rain_costs_every_living_agent_the_same() {
    let mut w = world().with_weather_table(WeatherTable {
        transition_chance: 0.0,
        calm_weight: 0.5,
        initial: WeatherKind::AcidRain,
    });
    let ids = [
        add(&mut w, AgentState::new("Dek", Pos::new(1, 1), Role::protagonist())),
        add(&mut w, AgentState::new("Thia", Pos::new(10, 10), Role::synthetic())),
        add(&mut w, AgentState::new("Kalisk", Pos::new(15, 3), Role::boss(Pos::new(15, 3)))),
        add(&mut w, AgentState::new("Hound", Pos::new(4, 16), Role::wildlife(Pos::new(4, 16), 0.2))),
    ];
    let gone = add(
        &mut w,
        AgentState::new("Scuttler", Pos::new(8, 8), Role::wildlife(Pos::new(8, 8), 0.2)).with_health(0),
    );
    let before: Vec<i32> = ids.iter().map(|id| w.agent(*id).unwrap().health()).collect();

    let temp = tempdir().unwrap();
    let mut engine = EngineBuilder::new(EngineSettings {
        scenario_name: "acid".into(),
        seed: 1,
        max_turns: 0,
        snapshot_interval_turns: 0,
        snapshot_dir: temp.path().to_path_buf(),
    })
    .with_system(HazardSystem::new())
    .build();
    engine.advance_turn(&mut w).unwrap();

    let damage = WeatherKind::AcidRain.damage();
    assert_eq!(damage, 5);
    for (id, health) in ids.iter().zip(before) {
        assert_eq!(w.agent(*id).unwrap().health(), health - damage);
        assert_eq!(w.ledger(*id).unwrap().damage_taken, damage);
    }
    assert_eq!(w.agent(gone).unwrap().health(), 0);
}

#[test]
fn boss_hits_twice_as_hard_after_the_phase_flip() {
    let mut w = world();
    w.set_weather(WeatherState::new(WeatherKind::Calm));
    let boss = add(
        &mut w,
        AgentState::new("Kalisk", Pos::new(5, 5), Role::boss(Pos::new(5, 5))).with_health(90),
    );
    let dek = add(&mut w, AgentState::new("Dek", Pos::new(6, 5), Role::protagonist()));
    assert_eq!(w.agent(boss).unwrap().boss_phase(), Some(BossPhase::One));

    // 60% down to 45% in one blow.
    let taken = w.damage(boss, 23);
    assert!(taken.phase_flipped);
    assert_eq!(w.agent(boss).unwrap().health(), 67);
    assert_eq!(w.agent(boss).unwrap().boss_phase(), Some(BossPhase::Two));
    assert_eq!(w.agent(boss).unwrap().damage_multiplier(), 2.0);

    let mut rng = ChaCha8Rng::seed_from_u64(9);
    let res = resolver::resolve(&mut w, boss, Intent::Attack { target: dek }, &mut rng);
    let strike = &res.strikes[0];
    assert!((36..=46).contains(&strike.damage), "phase two hit was {}", strike.damage);

    // Healing back over half never undoes the flip.
    w.agent_mut(boss).unwrap().heal(80);
    assert_eq!(w.agent(boss).unwrap().boss_phase(), Some(BossPhase::Two));
}

#[test]
fn ambush_on_unaware_prey_costs_honour() {
    let mut w = world();
    let dek = add(&mut w, AgentState::new("Dek", Pos::new(5, 5), Role::protagonist()));
    let rival = add(&mut w, AgentState::new("Kwei", Pos::new(6, 6), Role::rival()));
    let mut rng = ChaCha8Rng::seed_from_u64(2);

    w.begin_turn();
    let res = resolver::resolve(
        &mut w,
        dek,
        Intent::Special(badlands::strategy::Special::Ambush { target: rival }),
        &mut rng,
    );
    assert!(res.strikes[0].ambush);
    honour::judge(&mut w, &res);

    let record = w.agent(dek).unwrap().honour().unwrap();
    assert!(record.honour < 0.0);
    assert_eq!(record.rank, Rank::Unblooded);
    assert_eq!(w.find_role(RoleKind::Rival), Some(rival));
}

#[test]
fn acid_rain_lands_once_after_the_action_phase() {
    let mut w = world().with_weather_table(acid_rain());
    let dek = add(
        &mut w,
        AgentState::new("Dek", Pos::new(5, 5), Role::protagonist()).with_health(3),
    );
    let hound = add(
        &mut w,
        AgentState::new("Hound", Pos::new(15, 15), Role::wildlife(Pos::new(15, 15), 0.2))
            .with_max_health(200),
    );
    // Wherever Dek ends its move, a medkit is waiting.
    let dims = w.grid().dims();
    for dx in -1..=1 {
        for dy in -1..=1 {
            let pos = dims.offset(Pos::new(5, 5), dx, dy);
            assert!(w.grid_mut().place_item(pos, Item::Medkit { value: 30 }));
        }
    }

    let temp = tempdir().unwrap();
    let mut engine = EngineBuilder::new(settings("acid", temp.path()))
        .with_turn_pipeline()
        .build();
    let summary = engine.advance_turn(&mut w).unwrap();

    // Hazards first would have killed Dek before the medkit.
    assert_eq!(summary.outcome, None);
    let dek_state = w.agent(dek).unwrap();
    assert!(dek_state.is_alive());
    assert!(dek_state.health() > 3);
    assert_eq!(w.ledger(dek).unwrap().items_collected, 1);
    assert_eq!(w.ledger(dek).unwrap().damage_taken, 5);

    assert_eq!(w.ledger(hound).unwrap().damage_taken, 5);
    assert_eq!(w.agent(hound).unwrap().health(), 195);
}

#[test]
fn weather_death_drops_the_carried_agent() {
    let mut w = world().with_weather_table(acid_rain()).with_coordination(false);
    add(&mut w, AgentState::new("Dek", Pos::new(2, 2), Role::protagonist()));
    let elder = add(
        &mut w,
        AgentState::new("Njohrr", Pos::new(12, 12), Role::elder(Pos::new(12, 12))),
    );
    let thia = add(
        &mut w,
        AgentState::new("Thia", Pos::new(12, 12), Role::synthetic()).with_health(3),
    );
    w.agent_mut(elder).unwrap().carrying = Some(thia);
    w.agent_mut(thia).unwrap().carried_by = Some(elder);

    let temp = tempdir().unwrap();
    let mut engine = EngineBuilder::new(settings("carry", temp.path()))
        .with_turn_pipeline()
        .build();
    let summary = engine.advance_turn(&mut w).unwrap();

    let thia_state = w.agent(thia).unwrap();
    assert!(!thia_state.is_alive());
    assert_eq!(thia_state.carried_by, None);
    assert_eq!(w.agent(elder).unwrap().carrying, None);
    assert!(w.ledger(thia).unwrap().died);
    assert_eq!(w.ledger(elder).unwrap().damage_taken, 5);
    assert!(summary
        .events
        .iter()
        .any(|e| e.kind == EventKind::Combat && e.message == "Thia succumbs to the acid rain"));
}

#[test]
fn turning_to_acid_rain_bites_the_same_turn() {
    let mut w = world().with_weather_table(WeatherTable {
        transition_chance: 1.0,
        calm_weight: 0.0,
        initial: WeatherKind::Calm,
    });
    let hound = add(
        &mut w,
        AgentState::new("Hound", Pos::new(4, 4), Role::wildlife(Pos::new(4, 4), 0.2))
            .with_max_health(1000),
    );
    let temp = tempdir().unwrap();
    let mut engine = EngineBuilder::new(settings("front", temp.path()))
        .with_system(WeatherSystem::new())
        .with_system(HazardSystem::new())
        .build();

    let mut seen = false;
    for _ in 0..60 {
        let summary = engine.advance_turn(&mut w).unwrap();
        let turned = summary
            .events
            .iter()
            .any(|e| e.kind == EventKind::Weather && e.message.contains("acid rain"));
        if turned {
            assert_eq!(w.weather().kind, WeatherKind::AcidRain);
            assert_eq!(w.weather().turns_in_state, 0);
            assert_eq!(w.ledger(hound).unwrap().damage_taken, 5);
            seen = true;
            break;
        }
    }
    assert!(seen, "weather never turned to acid rain");
}
