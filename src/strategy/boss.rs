//! Reactive behaviour tree for the boss.

use crate::agent::{BossPhase, HealthBand, Role};

use super::{Intent, Observation, Special, VisibleAgent};

const REGENERATE_BELOW: f64 = 0.3;
const REGENERATE_COST: i32 = 20;
const EARTHQUAKE_COST: i32 = 30;
const ISOLATION_RADIUS: i32 = 2;

/// Area radius of the earthquake in each phase.
pub fn earthquake_radius(phase: BossPhase) -> i32 {
    match phase {
        BossPhase::One => 2,
        BossPhase::Two => 3,
    }
}

pub fn earthquake_cost() -> i32 {
    EARTHQUAKE_COST
}

pub fn regenerate_cost() -> i32 {
    REGENERATE_COST
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BossTree;

impl BossTree {
    pub fn decide(&self, obs: &Observation) -> Intent {
        let me = &obs.me;
        let Role::Boss(state) = &me.role else {
            return Intent::Rest;
        };
        // Phase is re-read from health every call; the stored flag only ever
        // moves forward, so the two agree once the flip has happened.
        let phase = if state.phase == BossPhase::Two || me.health() * 2 <= me.max_health() {
            BossPhase::Two
        } else {
            BossPhase::One
        };

        let targets: Vec<&VisibleAgent> = obs.enemies().collect();
        let in_reach = targets
            .iter()
            .any(|t| t.distance <= me.stats.attack_range);

        if me.health_fraction() < REGENERATE_BELOW
            && !in_reach
            && me.stamina() >= REGENERATE_COST
        {
            return Intent::Special(Special::Regenerate);
        }

        if targets.is_empty() {
            if obs.dims.distance(me.pos, state.territory.center) > state.territory.radius {
                return obs.toward(state.territory.center);
            }
            return if me.stamina() < me.max_stamina() / 2 {
                Intent::Rest
            } else {
                obs.wander()
            };
        }

        let radius = earthquake_radius(phase);
        let clustered = targets.iter().filter(|t| t.distance <= radius).count();
        if clustered >= 2 && me.stamina() >= EARTHQUAKE_COST {
            return Intent::Special(Special::Earthquake);
        }

        let Some(target) = select_target(&targets, obs) else {
            return Intent::Rest;
        };
        if target.distance <= me.stats.attack_range {
            if me.stamina() < me.stats.attack_cost {
                return Intent::Rest;
            }
            return Intent::Attack { target: target.id };
        }
        obs.toward(target.pos)
    }
}

/// Weakest first, then the most isolated, then the closest.
fn select_target<'a>(targets: &[&'a VisibleAgent], obs: &Observation) -> Option<&'a VisibleAgent> {
    targets
        .iter()
        .copied()
        .min_by_key(|t| {
            let isolated = !targets
                .iter()
                .any(|o| o.id != t.id && obs.dims.distance(o.pos, t.pos) <= ISOLATION_RADIUS);
            (band_rank(t.band), !isolated, t.distance, t.id)
        })
}

fn band_rank(band: HealthBand) -> u8 {
    match band {
        HealthBand::Critical => 0,
        HealthBand::Wounded => 1,
        HealthBand::Hurt => 2,
        HealthBand::Healthy => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentId, AgentState, RoleKind};
    use crate::grid::{Dims, Pos};
    use crate::weather::WeatherKind;

    fn target(id: u64, pos: Pos, distance: i32, band: HealthBand) -> VisibleAgent {
        VisibleAgent {
            id: AgentId(id),
            kind: RoleKind::Protagonist,
            pos,
            distance,
            band,
            hostile: true,
            boss_phase: None,
        }
    }

    fn observe(me: AgentState, agents: Vec<VisibleAgent>) -> Observation {
        Observation {
            turn: 1,
            dims: Dims::new(30, 30).unwrap(),
            me,
            weather: WeatherKind::Calm,
            agents,
            cells: Vec::new(),
            coordination: None,
            trial_active: false,
        }
    }

    fn boss() -> AgentState {
        let mut b = AgentState::new("Adversary", Pos::new(10, 10), Role::boss(Pos::new(10, 10)));
        b.id = AgentId(9);
        b
    }

    #[test]
    fn prefers_the_wounded_target() {
        // Too winded to quake, so it has to pick someone.
        let obs = observe(
            boss().with_stamina(25),
            vec![
                target(1, Pos::new(11, 10), 1, HealthBand::Healthy),
                target(2, Pos::new(8, 10), 2, HealthBand::Wounded),
            ],
        );
        assert_eq!(BossTree.decide(&obs), Intent::Attack { target: AgentId(2) });
    }

    #[test]
    fn quakes_when_targets_cluster() {
        let obs = observe(
            boss(),
            vec![
                target(1, Pos::new(11, 10), 1, HealthBand::Healthy),
                target(2, Pos::new(9, 9), 1, HealthBand::Healthy),
            ],
        );
        assert_eq!(BossTree.decide(&obs), Intent::Special(Special::Earthquake));
    }

    #[test]
    fn regenerates_only_when_unthreatened() {
        let hurt = boss().with_health(30);
        let far = observe(hurt.clone(), vec![target(1, Pos::new(16, 10), 6, HealthBand::Healthy)]);
        assert_eq!(BossTree.decide(&far), Intent::Special(Special::Regenerate));
        let near = observe(hurt, vec![target(1, Pos::new(11, 10), 1, HealthBand::Healthy)]);
        assert_eq!(BossTree.decide(&near), Intent::Attack { target: AgentId(1) });
    }

    #[test]
    fn phase_two_widens_the_quake() {
        let b = boss().with_health(70);
        let obs = observe(
            b,
            vec![
                target(1, Pos::new(13, 10), 3, HealthBand::Healthy),
                target(2, Pos::new(7, 10), 3, HealthBand::Healthy),
            ],
        );
        assert_eq!(BossTree.decide(&obs), Intent::Special(Special::Earthquake));
    }
}
