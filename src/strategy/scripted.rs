//! Fixed priority ladders for the elder, the rival and wildlife.
//!
//! Each ladder is evaluated top to bottom on every call and the first rung
//! that applies wins. Nothing here draws randomness, so identical observations
//! always produce identical intents.

use crate::agent::{Role, RoleKind};
use crate::honour::{TrialKind, STALE_OPINION_TURNS};

use super::{Intent, Observation, Special};

const FLEE_FRACTION: f64 = 0.3;
const REST_STAMINA: i32 = 20;
const WILDLIFE_DETECT_RADIUS: i32 = 2;
const RIVAL_STRIKE_RADIUS: i32 = 5;
const GUARD_RADIUS: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Elder,
    Rival,
    Wildlife,
}

impl Script {
    pub fn decide(&self, obs: &Observation) -> Intent {
        match self {
            Script::Elder => elder(obs),
            Script::Rival => rival(obs),
            Script::Wildlife => wildlife(obs),
        }
    }
}

fn attack_or_approach(obs: &Observation, target: &super::VisibleAgent) -> Intent {
    if target.distance <= obs.me.stats.attack_range {
        if obs.me.stamina() < obs.me.stats.attack_cost {
            return Intent::Rest;
        }
        Intent::Attack { target: target.id }
    } else {
        obs.toward(target.pos)
    }
}

fn elder(obs: &Observation) -> Intent {
    let me = &obs.me;
    if me.health_fraction() < FLEE_FRACTION {
        if let Some(enemy) = obs.nearest_enemy() {
            return obs.away_from(enemy.pos);
        }
    }
    if me.stamina() < REST_STAMINA {
        return Intent::Rest;
    }
    let Role::Elder(state) = &me.role else {
        return Intent::Rest;
    };
    let protagonist = obs.nearest_of(RoleKind::Protagonist);
    if protagonist.is_some() && !obs.trial_active && state.stale_turns >= STALE_OPINION_TURNS {
        let kind = TrialKind::ALL[(obs.turn % TrialKind::ALL.len() as u64) as usize];
        return Intent::Special(Special::IssueTrial { kind });
    }
    if let Some(enemy) = obs.nearest_enemy() {
        if enemy.distance <= me.stats.attack_range {
            return attack_or_approach(obs, enemy);
        }
    }
    if let Some(p) = protagonist {
        if p.distance > 3 {
            return obs.toward(p.pos);
        }
    }
    if obs.dims.distance(me.pos, state.home) > state.patrol_radius {
        return obs.toward(state.home);
    }
    obs.wander()
}

fn rival(obs: &Observation) -> Intent {
    let me = &obs.me;
    if me.health_fraction() < FLEE_FRACTION {
        if let Some(enemy) = obs.nearest_enemy() {
            return obs.away_from(enemy.pos);
        }
    }
    if me.stamina() < REST_STAMINA + 5 {
        return Intent::Rest;
    }
    if let Some(p) = obs.nearest_of(RoleKind::Protagonist) {
        if p.hostile && p.distance <= RIVAL_STRIKE_RADIUS {
            return attack_or_approach(obs, p);
        }
    }
    let prey = obs
        .enemies()
        .find(|a| matches!(a.kind, RoleKind::Wildlife | RoleKind::Boss));
    if let Some(prey) = prey {
        if prey.distance <= me.stats.attack_range || prey.kind == RoleKind::Wildlife {
            return attack_or_approach(obs, prey);
        }
    }
    // Shadow the protagonist and cut down anything closing on them.
    if let Some(p) = obs.nearest_of(RoleKind::Protagonist) {
        let threat = obs
            .enemies()
            .find(|e| e.id != p.id && obs.dims.distance(e.pos, p.pos) <= GUARD_RADIUS);
        if let Some(threat) = threat {
            return attack_or_approach(obs, threat);
        }
    }
    obs.wander()
}

fn wildlife(obs: &Observation) -> Intent {
    let me = &obs.me;
    let Role::Wildlife(state) = &me.role else {
        return Intent::Rest;
    };
    let predator = obs.nearest_enemy();
    if me.health_fraction() < FLEE_FRACTION {
        if let Some(p) = predator {
            return obs.away_from(p.pos);
        }
    }
    if let Some(p) = predator.filter(|p| p.distance <= WILDLIFE_DETECT_RADIUS) {
        return if state.aggression >= 0.5 {
            attack_or_approach(obs, p)
        } else {
            obs.away_from(p.pos)
        };
    }
    if me.stamina() < REST_STAMINA {
        return Intent::Rest;
    }
    if obs.dims.distance(me.pos, state.territory.center) > state.territory.radius {
        return obs.toward(state.territory.center);
    }
    obs.wander()
}
