//! Shared goal and role assignment for the protagonist and the synthetic.
//!
//! The record is rebuilt every turn before anyone decides. It only ever
//! informs the coordinated strategy; it never acts on its own.

use serde::{Deserialize, Serialize};

use crate::agent::{AgentId, AgentState, BossPhase, Role, RoleKind, HOSTILE_RIVALRY};
use crate::grid::Pos;
use crate::resolver::Resolution;
use crate::strategy::{Intent, Special};
use crate::world::World;

const THREAT_HORIZON: i32 = 15;
const BOSS_ENGAGE_RADIUS: i32 = 6;
const COVER_RADIUS: i32 = 2;
const ITEM_RADIUS: i32 = 5;
const REGROUP_DISTANCE: i32 = 6;
const DANGEROUS_THREAT: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "goal", rename_all = "snake_case")]
pub enum SharedGoal {
    Survive,
    HuntTarget { target: AgentId },
    ProtectAlly { ally: AgentId },
    CollectItem { pos: Pos },
    ReachPosition { pos: Pos },
    EscapeDanger { threat: AgentId },
    DefeatBoss { boss: AgentId },
    HealAlly { target: AgentId },
    CoverAlly { ally: AgentId, threat: AgentId },
    FlankEnemy { target: AgentId },
}

impl SharedGoal {
    pub fn label(&self) -> &'static str {
        match self {
            SharedGoal::Survive => "survive",
            SharedGoal::HuntTarget { .. } => "hunt target",
            SharedGoal::ProtectAlly { .. } => "protect ally",
            SharedGoal::CollectItem { .. } => "collect item",
            SharedGoal::ReachPosition { .. } => "reach position",
            SharedGoal::EscapeDanger { .. } => "escape danger",
            SharedGoal::DefeatBoss { .. } => "defeat boss",
            SharedGoal::HealAlly { .. } => "heal ally",
            SharedGoal::CoverAlly { .. } => "cover ally",
            SharedGoal::FlankEnemy { .. } => "flank enemy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoordRole {
    Leader,
    Support,
    Scout,
    Tank,
    Healer,
    Attacker,
}

/// Fixed (leader, support) role pair for each goal.
pub fn roles_for(goal: &SharedGoal) -> (CoordRole, CoordRole) {
    use CoordRole::*;
    match goal {
        SharedGoal::Survive | SharedGoal::ReachPosition { .. } => (Leader, Support),
        SharedGoal::EscapeDanger { .. } | SharedGoal::CollectItem { .. } => (Leader, Scout),
        SharedGoal::ProtectAlly { .. } | SharedGoal::CoverAlly { .. } => (Tank, Support),
        SharedGoal::HealAlly { .. } => (Leader, Healer),
        SharedGoal::DefeatBoss { .. } => (Attacker, Support),
        SharedGoal::FlankEnemy { .. } => (Attacker, Attacker),
        SharedGoal::HuntTarget { .. } => (Attacker, Scout),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threat {
    pub id: AgentId,
    pub score: f64,
    pub distance: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub goal: SharedGoal,
    pub leader: AgentId,
    pub support: AgentId,
    pub leader_role: CoordRole,
    pub support_role: CoordRole,
    /// Highest score first.
    pub threats: Vec<Threat>,
}

impl Plan {
    pub fn role_of(&self, id: AgentId) -> Option<(CoordRole, AgentId)> {
        if id == self.leader {
            Some((self.leader_role, self.support))
        } else if id == self.support {
            Some((self.support_role, self.leader))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub turn: u64,
    pub hostiles: u32,
    pub hazards: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intel {
    pub boss_weakness: bool,
    pub last_scan: Option<ScanReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinationScore {
    pub goal_actions: u32,
    pub goal_changes: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoordinationRecord {
    pub plan: Option<Plan>,
    pub alliance: bool,
    pub intel: Intel,
    pub score: CoordinationScore,
}

fn threat_base(me: &AgentState, other: &AgentState) -> Option<f64> {
    match &other.role {
        Role::Boss(boss) => Some(if boss.phase == BossPhase::Two {
            100.0
        } else {
            80.0
        }),
        Role::Wildlife(w) => Some(30.0 + 20.0 * w.aggression),
        Role::Rival(r) if r.rivalry >= HOSTILE_RIVALRY && me.is_hostile_to(other) => Some(40.0),
        _ => None,
    }
}

/// Scores every living enemy of `leader` within the horizon.
pub fn assess_threats(world: &World, leader: &AgentState) -> Vec<Threat> {
    let dims = world.grid().dims();
    let mut threats: Vec<Threat> = world
        .agents()
        .iter()
        .filter(|a| a.is_alive() && a.id != leader.id)
        .filter_map(|a| {
            let base = threat_base(leader, a)?;
            let distance = dims.distance(leader.pos, a.pos);
            if distance > THREAT_HORIZON {
                return None;
            }
            let proximity = (1.0 - distance as f64 / 15.0).max(0.1);
            let score = base * (0.5 + 0.5 * a.health_fraction()) * proximity;
            Some(Threat {
                id: a.id,
                score,
                distance,
            })
        })
        .collect();
    threats.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
    threats
}

/// Builds this turn's plan, or `None` unless both partners are alive.
pub fn assess(world: &World) -> Option<Plan> {
    let leader = world
        .find_role(RoleKind::Protagonist)
        .and_then(|id| world.agent(id))
        .filter(|a| a.is_alive())?;
    let support = world
        .find_role(RoleKind::Synthetic)
        .and_then(|id| world.agent(id))
        .filter(|a| a.is_alive())?;
    let dims = world.grid().dims();
    let threats = assess_threats(world, leader);
    let top = threats.first().copied();

    let goal = if leader.health_fraction() < 0.3 {
        match top {
            Some(t) if t.score > DANGEROUS_THREAT => SharedGoal::EscapeDanger { threat: t.id },
            _ => SharedGoal::Survive,
        }
    } else if support.health_fraction() < 0.3 {
        SharedGoal::ProtectAlly { ally: support.id }
    } else if leader.health_fraction() < 0.5 {
        SharedGoal::HealAlly { target: leader.id }
    } else if let Some(boss) = world
        .agents()
        .iter()
        .find(|a| a.is_alive() && a.kind() == RoleKind::Boss && dims.distance(a.pos, leader.pos) <= BOSS_ENGAGE_RADIUS)
    {
        if world.coordination().alliance {
            SharedGoal::FlankEnemy { target: boss.id }
        } else {
            SharedGoal::DefeatBoss { boss: boss.id }
        }
    } else if let Some(t) = threats.iter().find(|t| {
        world
            .agent(t.id)
            .is_some_and(|a| dims.distance(a.pos, support.pos) <= COVER_RADIUS)
    }) {
        SharedGoal::CoverAlly {
            ally: support.id,
            threat: t.id,
        }
    } else if let Some(t) = top.filter(|t| t.score > DANGEROUS_THREAT) {
        SharedGoal::HuntTarget { target: t.id }
    } else if let Some(pos) = nearest_item(world, leader.pos) {
        SharedGoal::CollectItem { pos }
    } else if support.carried_by.is_none() && dims.distance(leader.pos, support.pos) > REGROUP_DISTANCE {
        SharedGoal::ReachPosition { pos: support.pos }
    } else {
        SharedGoal::Survive
    };

    let (leader_role, support_role) = roles_for(&goal);
    Some(Plan {
        goal,
        leader: leader.id,
        support: support.id,
        leader_role,
        support_role,
        threats,
    })
}

fn nearest_item(world: &World, from: Pos) -> Option<Pos> {
    let dims = world.grid().dims();
    world
        .grid()
        .items()
        .into_iter()
        .map(|(pos, _)| pos)
        .filter(|pos| dims.distance(from, *pos) <= ITEM_RADIUS)
        .min_by_key(|pos| (dims.distance(from, *pos), pos.y, pos.x))
}

/// Whether a resolved action pushed the shared goal forward.
pub fn served_goal(world: &World, res: &Resolution, plan: &Plan) -> bool {
    if plan.role_of(res.actor).is_none() || res.degraded.is_some() {
        return false;
    }
    let dims = world.grid().dims();
    let hit = |id: AgentId| res.strikes.iter().any(|s| s.target == id && s.damage > 0);
    let closed_on = |pos: Pos| {
        res.moved
            && world
                .agent(res.actor)
                .is_some_and(|a| dims.distance(a.pos, pos) < dims.distance(res.origin, pos))
    };
    match plan.goal {
        SharedGoal::HuntTarget { target }
        | SharedGoal::DefeatBoss { boss: target }
        | SharedGoal::FlankEnemy { target } => hit(target),
        SharedGoal::CoverAlly { threat, .. } => hit(threat),
        SharedGoal::ProtectAlly { .. } => {
            !res.strikes.is_empty() || res.healed > 0 || res.performed == Intent::Carry { target: plan.support }
        }
        SharedGoal::HealAlly { .. } => {
            res.healed > 0 || matches!(res.performed, Intent::Special(Special::HealAlly { .. }))
        }
        SharedGoal::EscapeDanger { threat } => match world.agent(threat) {
            Some(t) => {
                res.moved
                    && world.agent(res.actor).is_some_and(|a| {
                        dims.distance(a.pos, t.pos) > dims.distance(res.origin, t.pos)
                    })
            }
            None => false,
        },
        SharedGoal::CollectItem { pos } | SharedGoal::ReachPosition { pos } => closed_on(pos),
        SharedGoal::Survive => matches!(res.performed, Intent::Rest | Intent::Scan | Intent::UseItem),
    }
}
