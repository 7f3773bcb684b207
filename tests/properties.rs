use badlands::{
    agent::{AgentState, BossPhase, Role},
    grid::{Dims, Pos},
    honour::{HonourRecord, HonourRules},
    strategy::{QAction, QTable, StateKey},
};
use proptest::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Op {
    Damage(i32),
    Heal(i32),
    Spend(i32),
    Restore(i32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..80i32).prop_map(Op::Damage),
        (0..80i32).prop_map(Op::Heal),
        (0..60i32).prop_map(Op::Spend),
        (0..60i32).prop_map(Op::Restore),
    ]
}

fn apply(agent: &mut AgentState, op: Op) {
    match op {
        Op::Damage(n) => {
            agent.take_damage(n);
        }
        Op::Heal(n) => {
            agent.heal(n);
        }
        Op::Spend(n) => {
            agent.spend_stamina(n);
        }
        Op::Restore(n) => {
            agent.restore_stamina(n);
        }
    }
}

fn key() -> StateKey {
    StateKey {
        health: 2,
        enemy_distance: 1,
        enemy_count: 1,
        ally_nearby: false,
        stamina: 1,
        boss_phase: 0,
    }
}

proptest! {
    #[test]
    fn offsets_stay_on_the_torus(
        width in 1..60i32,
        height in 1..60i32,
        x in -200..200i32,
        y in -200..200i32,
        dx in -1..=1i32,
        dy in -1..=1i32,
    ) {
        let dims = Dims::new(width, height).unwrap();
        let start = dims.wrap(x, y);
        let moved = dims.offset(start, dx, dy);
        prop_assert!((0..width).contains(&moved.x));
        prop_assert!((0..height).contains(&moved.y));
        let d = dims.distance(start, moved);
        prop_assert!(d <= 1);
        prop_assert_eq!(d, dims.distance(moved, start));
        prop_assert!(dims.distance(start, Pos::new(0, 0)) <= width.max(height) / 2);
    }

    #[test]
    fn resources_stay_clamped(ops in prop::collection::vec(op(), 0..60)) {
        let mut agent = AgentState::new("Dek", Pos::new(0, 0), Role::protagonist());
        let mut died = false;
        for op in ops {
            apply(&mut agent, op);
            prop_assert!((0..=agent.max_health()).contains(&agent.health()));
            prop_assert!((0..=agent.max_stamina()).contains(&agent.stamina()));
            prop_assert_eq!(agent.health() == 0, !agent.is_alive());
            if died {
                prop_assert!(!agent.is_alive());
            }
            died |= !agent.is_alive();
        }
    }

    #[test]
    fn rank_never_regresses(deltas in prop::collection::vec(-20.0..30.0f64, 0..50), kill_at in 0..50usize) {
        let rules = HonourRules::default();
        let mut record = HonourRecord::default();
        let mut last = record.rank;
        for (i, delta) in deltas.into_iter().enumerate() {
            if i == kill_at {
                record.first_kill = true;
            }
            record.adjust(delta, &rules);
            prop_assert!(record.rank >= last);
            last = record.rank;
        }
    }

    #[test]
    fn boss_phase_never_reverts(ops in prop::collection::vec(op(), 0..60)) {
        let mut boss = AgentState::new("Kalisk", Pos::new(0, 0), Role::boss(Pos::new(0, 0)));
        let mut flipped = false;
        for op in ops {
            apply(&mut boss, op);
            let phase = boss.boss_phase();
            if flipped {
                prop_assert_eq!(phase, Some(BossPhase::Two));
            }
            flipped |= phase == Some(BossPhase::Two);
            if boss.is_alive() && boss.health() * 2 <= boss.max_health() {
                prop_assert_eq!(phase, Some(BossPhase::Two));
            }
        }
    }

    #[test]
    fn zero_reward_self_loops_never_diverge(
        seed_reward in -50.0..50.0f64,
        alpha in 0.01..1.0f64,
        gamma in 0.0..0.99f64,
        steps in 1..40usize,
    ) {
        let mut table = QTable::default();
        let state = key();
        let mut current = table.update(state, QAction::Attack, seed_reward, &state, alpha, 0.0);
        for _ in 0..steps {
            let next = table.update(state, QAction::Attack, 0.0, &state, alpha, gamma);
            prop_assert!(next.abs() <= current.abs() + 1e-9);
            current = next;
        }
    }
}
