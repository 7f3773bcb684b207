//! Decision strategies.
//!
//! Every agent owns exactly one [`Strategy`], picked when the agent is built.
//! A strategy sees the world only through an [`Observation`] assembled fresh
//! for its turn, and answers with an [`Intent`]; the resolver decides what
//! actually happens.

pub mod boss;
mod coordinated;
mod learning;
mod scripted;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agent::{AgentId, AgentState, BossPhase, HealthBand, Role, RoleKind};
use crate::coordination::{CoordRole, SharedGoal};
use crate::grid::{Dims, Pos, Terrain};
use crate::honour::TrialKind;
use crate::items::Item;
use crate::weather::WeatherKind;
use crate::world::World;

pub use boss::BossTree;
pub use coordinated::apply_role;
pub use learning::{
    reward_for, BucketConfig, LearningParams, QAction, QEntry, QLearner, QTable, RewardInputs,
    StateKey,
};
pub use scripted::Script;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Special {
    Ambush { target: AgentId },
    HealAlly { target: AgentId },
    Earthquake,
    Regenerate,
    IssueTrial { kind: TrialKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Intent {
    Move { dx: i32, dy: i32 },
    Attack { target: AgentId },
    Rest,
    UseItem,
    Special(Special),
    Carry { target: AgentId },
    Drop { target: AgentId },
    Scan,
    RequestInfo { target: AgentId },
    ShareInfo { target: AgentId },
    FormAlliance { target: AgentId },
}

impl Intent {
    pub fn label(&self) -> &'static str {
        match self {
            Intent::Move { .. } => "move",
            Intent::Attack { .. } => "attack",
            Intent::Rest => "rest",
            Intent::UseItem => "use item",
            Intent::Special(Special::Ambush { .. }) => "ambush",
            Intent::Special(Special::HealAlly { .. }) => "heal ally",
            Intent::Special(Special::Earthquake) => "earthquake",
            Intent::Special(Special::Regenerate) => "regenerate",
            Intent::Special(Special::IssueTrial { .. }) => "issue trial",
            Intent::Carry { .. } => "carry",
            Intent::Drop { .. } => "drop",
            Intent::Scan => "scan",
            Intent::RequestInfo { .. } => "request info",
            Intent::ShareInfo { .. } => "share info",
            Intent::FormAlliance { .. } => "form alliance",
        }
    }
}

/// Another living agent as seen from outside.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleAgent {
    pub id: AgentId,
    pub kind: RoleKind,
    pub pos: Pos,
    pub distance: i32,
    pub band: HealthBand,
    pub hostile: bool,
    pub boss_phase: Option<BossPhase>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisibleCell {
    pub pos: Pos,
    pub distance: i32,
    pub terrain: Terrain,
    pub hazardous: bool,
    pub item: Option<Item>,
}

/// Coordination state handed to a paired agent.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinationView {
    pub goal: SharedGoal,
    pub role: CoordRole,
    pub partner: Option<AgentId>,
    pub alliance: bool,
}

/// Read-only view of the world from one agent's position.
#[derive(Debug, Clone)]
pub struct Observation {
    pub turn: u64,
    pub dims: Dims,
    pub me: AgentState,
    pub weather: WeatherKind,
    /// Living agents within sensor range, nearest first.
    pub agents: Vec<VisibleAgent>,
    pub cells: Vec<VisibleCell>,
    pub coordination: Option<CoordinationView>,
    /// Whether the protagonist is currently under a trial.
    pub trial_active: bool,
}

impl Observation {
    pub fn build(world: &World, id: AgentId) -> Option<Observation> {
        let me = world.agent(id)?.clone();
        let weather = world.weather().kind;
        let radius = me.sensor_radius(weather);
        let dims = world.grid().dims();

        let mut agents: Vec<VisibleAgent> = world
            .agents()
            .iter()
            .filter(|other| other.id != id && other.is_alive())
            .filter_map(|other| {
                let distance = dims.distance(me.pos, other.pos);
                (distance <= radius).then(|| VisibleAgent {
                    id: other.id,
                    kind: other.kind(),
                    pos: other.pos,
                    distance,
                    band: other.health_band(),
                    hostile: me.is_hostile_to(other),
                    boss_phase: other.boss_phase(),
                })
            })
            .collect();
        agents.sort_by_key(|a| (a.distance, a.id));

        let cells = world
            .grid()
            .neighbors(me.pos, radius)
            .into_iter()
            .chain(std::iter::once(me.pos))
            .map(|pos| {
                let cell = world.grid().cell(pos);
                VisibleCell {
                    pos,
                    distance: dims.distance(me.pos, pos),
                    terrain: cell.terrain,
                    hazardous: cell.is_hazardous(),
                    item: cell.item,
                }
            })
            .collect();

        let coordination = world.coordination_view(id);
        let trial_active = world
            .find_role(RoleKind::Protagonist)
            .and_then(|pid| world.agent(pid))
            .and_then(|p| p.honour())
            .is_some_and(|h| h.trial.is_some());

        Some(Observation {
            turn: world.clock(),
            dims,
            me,
            weather,
            agents,
            cells,
            coordination,
            trial_active,
        })
    }

    pub fn enemies(&self) -> impl Iterator<Item = &VisibleAgent> {
        self.agents.iter().filter(|a| a.hostile)
    }

    pub fn nearest_enemy(&self) -> Option<&VisibleAgent> {
        self.enemies().next()
    }

    pub fn find(&self, id: AgentId) -> Option<&VisibleAgent> {
        self.agents.iter().find(|a| a.id == id)
    }

    pub fn nearest_of(&self, kind: RoleKind) -> Option<&VisibleAgent> {
        self.agents.iter().find(|a| a.kind == kind)
    }

    /// The paired agent: the coordination partner if any, otherwise the
    /// nearest visible protagonist/synthetic counterpart.
    pub fn ally(&self) -> Option<&VisibleAgent> {
        if let Some(partner) = self.coordination.as_ref().and_then(|c| c.partner) {
            return self.find(partner);
        }
        match self.me.kind() {
            RoleKind::Protagonist => self.nearest_of(RoleKind::Synthetic),
            RoleKind::Synthetic => self.nearest_of(RoleKind::Protagonist),
            _ => None,
        }
    }

    pub fn nearest_item(&self) -> Option<&VisibleCell> {
        self.cells
            .iter()
            .filter(|c| c.item.is_some_and(|item| item.applies_to(&self.me)))
            .min_by_key(|c| (c.distance, c.pos.y, c.pos.x))
    }

    pub fn toward(&self, target: Pos) -> Intent {
        let (dx, dy) = self.dims.step_toward(self.me.pos, target);
        if dx == 0 && dy == 0 {
            return Intent::Rest;
        }
        Intent::Move { dx, dy }
    }

    pub fn away_from(&self, threat: Pos) -> Intent {
        let (dx, dy) = self.dims.step_away(self.me.pos, threat);
        Intent::Move { dx, dy }
    }

    /// A step in a direction that depends only on the turn and the agent id.
    pub fn wander(&self) -> Intent {
        const DIRS: [(i32, i32); 8] = [
            (0, -1),
            (1, -1),
            (1, 0),
            (1, 1),
            (0, 1),
            (-1, 1),
            (-1, 0),
            (-1, -1),
        ];
        let (dx, dy) = DIRS[((self.turn / 3 + self.me.id.raw()) % 8) as usize];
        Intent::Move { dx, dy }
    }

    pub fn has_usable_pack_item(&self) -> bool {
        self.me.pack.iter().any(|item| item.applies_to(&self.me))
    }
}

/// Closed set of decision strategies.
#[derive(Debug, Clone)]
pub enum Strategy {
    Scripted(Script),
    QLearning(QLearner),
    BossTree(BossTree),
    /// Q-learning filtered through the coordination role.
    Coordinated(QLearner),
}

impl Strategy {
    /// Default strategy for an agent role.
    pub fn for_role(role: &Role, params: LearningParams, buckets: BucketConfig, coordinated: bool) -> Strategy {
        match role.kind() {
            RoleKind::Protagonist | RoleKind::Synthetic => {
                let learner = QLearner::new(params, buckets);
                if coordinated {
                    Strategy::Coordinated(learner)
                } else {
                    Strategy::QLearning(learner)
                }
            }
            RoleKind::Boss => Strategy::BossTree(BossTree),
            RoleKind::Elder => Strategy::Scripted(Script::Elder),
            RoleKind::Rival => Strategy::Scripted(Script::Rival),
            RoleKind::Wildlife => Strategy::Scripted(Script::Wildlife),
        }
    }

    pub fn decide<R: Rng + ?Sized>(&mut self, obs: &Observation, rng: &mut R) -> Intent {
        match self {
            Strategy::Scripted(script) => script.decide(obs),
            Strategy::BossTree(tree) => tree.decide(obs),
            Strategy::QLearning(learner) => {
                let action = learner.choose(obs, rng);
                action.to_intent(obs)
            }
            Strategy::Coordinated(learner) => {
                let action = learner.choose(obs, rng);
                apply_role(action.to_intent(obs), obs)
            }
        }
    }

    pub fn learner(&self) -> Option<&QLearner> {
        match self {
            Strategy::QLearning(learner) | Strategy::Coordinated(learner) => Some(learner),
            _ => None,
        }
    }

    pub fn learner_mut(&mut self) -> Option<&mut QLearner> {
        match self {
            Strategy::QLearning(learner) | Strategy::Coordinated(learner) => Some(learner),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Strategy::Scripted(_) => "scripted",
            Strategy::QLearning(_) => "q-learning",
            Strategy::BossTree(_) => "behaviour-tree",
            Strategy::Coordinated(_) => "coordinated",
        }
    }
}
