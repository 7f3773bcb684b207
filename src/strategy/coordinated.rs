//! Role filter applied on top of a learner's intent.

use crate::agent::{HealthBand, RoleKind};
use crate::coordination::{CoordRole, SharedGoal};

use super::{Intent, Observation, Special};

/// Rewrites `intent` to suit the agent's current coordination role. Agents
/// without a coordination view keep their intent unchanged.
pub fn apply_role(intent: Intent, obs: &Observation) -> Intent {
    let Some(view) = obs.coordination.as_ref() else {
        return intent;
    };

    // Goal-level overrides come first.
    match view.goal {
        SharedGoal::EscapeDanger { threat } => {
            if let Intent::Attack { .. } | Intent::Special(Special::Ambush { .. }) = intent {
                if let Some(t) = obs.find(threat) {
                    return obs.away_from(t.pos);
                }
            }
        }
        SharedGoal::CollectItem { pos } => {
            if intent == Intent::Rest && obs.dims.distance(obs.me.pos, pos) > 0 {
                return obs.toward(pos);
            }
        }
        _ => {}
    }

    match view.role {
        CoordRole::Support | CoordRole::Healer => support(intent, obs),
        CoordRole::Scout => {
            if intent == Intent::Rest && obs.nearest_enemy().is_none() && obs.me.stamina() >= 5 {
                Intent::Scan
            } else {
                intent
            }
        }
        CoordRole::Tank => tank(intent, obs),
        CoordRole::Attacker => attacker(intent, obs, view.goal),
        CoordRole::Leader => intent,
    }
}

fn support(intent: Intent, obs: &Observation) -> Intent {
    let Some(leader) = obs.ally() else {
        return intent;
    };
    if leader.band > HealthBand::Wounded {
        return intent;
    }
    match intent {
        Intent::Attack { .. } | Intent::Move { .. } | Intent::Rest | Intent::Scan => {
            if leader.distance <= 1 && obs.me.kind() == RoleKind::Synthetic {
                Intent::Special(Special::HealAlly { target: leader.id })
            } else if leader.distance <= 3 {
                Intent::ShareInfo { target: leader.id }
            } else {
                obs.toward(leader.pos)
            }
        }
        other => other,
    }
}

/// Step between the ally and whatever is closest to it.
fn tank(intent: Intent, obs: &Observation) -> Intent {
    let Some(ally) = obs.ally() else {
        return intent;
    };
    let threat = obs
        .enemies()
        .min_by_key(|e| (obs.dims.distance(e.pos, ally.pos), e.id));
    let Some(threat) = threat else {
        return intent;
    };
    if threat.distance <= obs.me.stats.attack_range {
        return Intent::Attack { target: threat.id };
    }
    if matches!(intent, Intent::Rest | Intent::Move { .. }) {
        return obs.toward(threat.pos);
    }
    intent
}

fn attacker(intent: Intent, obs: &Observation, goal: SharedGoal) -> Intent {
    if obs.me.health_fraction() <= 0.5 {
        return intent;
    }
    let target = match goal {
        SharedGoal::DefeatBoss { boss } | SharedGoal::FlankEnemy { target: boss } => Some(boss),
        SharedGoal::HuntTarget { target } => Some(target),
        _ => None,
    };
    let Some(target) = target.and_then(|id| obs.find(id)) else {
        return intent;
    };
    match intent {
        Intent::Attack { .. } | Intent::Special(Special::Ambush { .. }) => {
            if target.distance <= obs.me.stats.attack_range {
                match intent {
                    Intent::Special(Special::Ambush { .. }) => {
                        Intent::Special(Special::Ambush { target: target.id })
                    }
                    _ => Intent::Attack { target: target.id },
                }
            } else {
                intent
            }
        }
        Intent::Rest | Intent::Move { .. } => {
            if target.distance <= obs.me.stats.attack_range {
                Intent::Attack { target: target.id }
            } else {
                obs.toward(target.pos)
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentId, AgentState, Role};
    use crate::grid::{Dims, Pos};
    use crate::strategy::{CoordinationView, VisibleAgent};
    use crate::weather::WeatherKind;

    fn observe(me: AgentState, agents: Vec<VisibleAgent>, view: CoordinationView) -> Observation {
        Observation {
            turn: 2,
            dims: Dims::new(20, 20).unwrap(),
            me,
            weather: WeatherKind::Calm,
            agents,
            cells: Vec::new(),
            coordination: Some(view),
            trial_active: false,
        }
    }

    fn seen(id: u64, kind: RoleKind, pos: Pos, distance: i32, band: HealthBand, hostile: bool) -> VisibleAgent {
        VisibleAgent {
            id: AgentId(id),
            kind,
            pos,
            distance,
            band,
            hostile,
            boss_phase: None,
        }
    }

    fn synthetic() -> AgentState {
        let mut me = AgentState::new("Thia", Pos::new(5, 5), Role::synthetic());
        me.id = AgentId(1);
        me
    }

    #[test]
    fn healer_tends_a_wounded_leader() {
        let view = CoordinationView {
            goal: SharedGoal::HealAlly { target: AgentId(0) },
            role: CoordRole::Healer,
            partner: Some(AgentId(0)),
            alliance: false,
        };
        let dek = seen(0, RoleKind::Protagonist, Pos::new(6, 5), 1, HealthBand::Wounded, false);
        let beast = seen(7, RoleKind::Wildlife, Pos::new(4, 5), 1, HealthBand::Healthy, true);
        let obs = observe(synthetic(), vec![dek, beast], view);
        assert_eq!(
            apply_role(Intent::Attack { target: AgentId(7) }, &obs),
            Intent::Special(Special::HealAlly { target: AgentId(0) })
        );
    }

    #[test]
    fn scout_scans_when_idle() {
        let view = CoordinationView {
            goal: SharedGoal::Survive,
            role: CoordRole::Scout,
            partner: Some(AgentId(0)),
            alliance: false,
        };
        let obs = observe(synthetic(), Vec::new(), view);
        assert_eq!(apply_role(Intent::Rest, &obs), Intent::Scan);
    }

    #[test]
    fn escape_turns_attacks_into_retreats() {
        let view = CoordinationView {
            goal: SharedGoal::EscapeDanger { threat: AgentId(9) },
            role: CoordRole::Leader,
            partner: Some(AgentId(1)),
            alliance: false,
        };
        let mut dek = AgentState::new("Dek", Pos::new(5, 5), Role::protagonist());
        dek.id = AgentId(0);
        let boss = seen(9, RoleKind::Boss, Pos::new(6, 5), 1, HealthBand::Healthy, true);
        let obs = observe(dek, vec![boss], view);
        assert_eq!(
            apply_role(Intent::Attack { target: AgentId(9) }, &obs),
            Intent::Move { dx: -1, dy: 0 }
        );
    }

    #[test]
    fn without_a_view_intents_pass_through() {
        let mut obs = observe(
            synthetic(),
            Vec::new(),
            CoordinationView {
                goal: SharedGoal::Survive,
                role: CoordRole::Scout,
                partner: None,
                alliance: false,
            },
        );
        obs.coordination = None;
        assert_eq!(apply_role(Intent::Rest, &obs), Intent::Rest);
    }
}
