use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;

use serde::{Deserialize, Serialize};

use crate::agent::{AgentId, AgentState, DamageTaken, Role, RoleKind};
use crate::coordination::{CoordinationRecord, Plan};
use crate::events::{EventKind, EventLog};
use crate::grid::{Grid, Pos};
use crate::honour::HonourRules;
use crate::items::Item;
use crate::strategy::{CoordinationView, QTable, Strategy};
use crate::weather::{WeatherKind, WeatherState, WeatherTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Victory,
    Defeat,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeReason {
    BossDefeated,
    ProtagonistDead,
    TurnLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub kind: OutcomeKind,
    pub reason: OutcomeReason,
    pub turn: u64,
}

/// Per-agent tally of one turn, read by the learning system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnLedger {
    pub health_fraction_before: f64,
    pub damage_dealt: i32,
    pub damage_taken: i32,
    pub wildlife_kills: u32,
    pub boss_kills: u32,
    pub healed_ally: bool,
    pub items_collected: u32,
    pub honour_delta: f64,
    pub served_goal: bool,
    pub died: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: u64,
    pub name: String,
    pub kind: RoleKind,
    pub pos: Pos,
    pub health: i32,
    pub max_health: i32,
    pub stamina: i32,
    pub max_stamina: i32,
    pub alive: bool,
    pub carrying: Option<AgentId>,
    pub carried_by: Option<AgentId>,
    pub pack: Vec<Item>,
    pub strategy: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub pos: Pos,
    pub item: Item,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnSnapshot {
    pub scenario: String,
    pub turn: u64,
    pub width: i32,
    pub height: i32,
    pub weather: WeatherKind,
    pub weather_turns: u32,
    pub terrain: Vec<String>,
    pub agents: Vec<AgentSnapshot>,
    pub items: Vec<ItemSnapshot>,
    pub coordination: CoordinationRecord,
    pub outcome: Option<Outcome>,
}

/// Everything the simulation owns. Strategies never hold on to any of it:
/// they get a fresh observation every turn.
#[derive(Debug, Clone)]
pub struct World {
    grid: Grid,
    agents: Vec<AgentState>,
    policies: Vec<Strategy>,
    pub(crate) weather: WeatherState,
    pub(crate) weather_table: WeatherTable,
    pub(crate) honour_rules: HonourRules,
    pub(crate) coordination_enabled: bool,
    coordination: CoordinationRecord,
    events: EventLog,
    ledger: BTreeMap<AgentId, TurnLedger>,
    turn: u64,
    in_turn: bool,
    outcome: Option<Outcome>,
}

impl World {
    pub fn new(grid: Grid) -> Self {
        Self {
            grid,
            agents: Vec::new(),
            policies: Vec::new(),
            weather: WeatherState::new(WeatherKind::Calm),
            weather_table: WeatherTable::default(),
            honour_rules: HonourRules::default(),
            coordination_enabled: true,
            coordination: CoordinationRecord::default(),
            events: EventLog::default(),
            ledger: BTreeMap::new(),
            turn: 0,
            in_turn: false,
            outcome: None,
        }
    }

    #[must_use]
    pub fn with_weather_table(mut self, table: WeatherTable) -> Self {
        self.weather = WeatherState::new(table.initial);
        self.weather_table = table;
        self
    }

    #[must_use]
    pub fn with_honour_rules(mut self, rules: HonourRules) -> Self {
        self.honour_rules = rules;
        self
    }

    #[must_use]
    pub fn with_coordination(mut self, enabled: bool) -> Self {
        self.coordination_enabled = enabled;
        self
    }

    pub fn spawn(&mut self, mut state: AgentState, strategy: Strategy) -> AgentId {
        let id = AgentId(self.agents.len() as u64);
        state.id = id;
        self.agents.push(state);
        self.policies.push(strategy);
        id
    }

    pub fn agent(&self, id: AgentId) -> Option<&AgentState> {
        self.agents.get(id.index())
    }

    pub fn agent_mut(&mut self, id: AgentId) -> Option<&mut AgentState> {
        self.agents.get_mut(id.index())
    }

    /// All agents in id order, dead ones included.
    pub fn agents(&self) -> &[AgentState] {
        &self.agents
    }

    pub fn policy(&self, id: AgentId) -> Option<&Strategy> {
        self.policies.get(id.index())
    }

    pub fn policy_mut(&mut self, id: AgentId) -> Option<&mut Strategy> {
        self.policies.get_mut(id.index())
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut Grid {
        &mut self.grid
    }

    pub fn weather(&self) -> &WeatherState {
        &self.weather
    }

    pub fn set_weather(&mut self, weather: WeatherState) {
        self.weather = weather;
    }

    pub fn honour_rules(&self) -> HonourRules {
        self.honour_rules
    }

    pub fn coordination(&self) -> &CoordinationRecord {
        &self.coordination
    }

    pub fn coordination_mut(&mut self) -> &mut CoordinationRecord {
        &mut self.coordination
    }

    pub fn coordination_enabled(&self) -> bool {
        self.coordination_enabled
    }

    /// Installs this turn's plan. Returns true when the goal changed.
    pub fn set_plan(&mut self, plan: Option<Plan>) -> bool {
        let before = self.coordination.plan.as_ref().map(|p| p.goal);
        let after = plan.as_ref().map(|p| p.goal);
        self.coordination.plan = plan;
        if before != after {
            self.coordination.score.goal_changes += 1;
            true
        } else {
            false
        }
    }

    pub fn coordination_view(&self, id: AgentId) -> Option<CoordinationView> {
        if !self.coordination_enabled {
            return None;
        }
        let plan = self.coordination.plan.as_ref()?;
        let (role, partner) = plan.role_of(id)?;
        Some(CoordinationView {
            goal: plan.goal,
            role,
            partner: Some(partner),
            alliance: self.coordination.alliance,
        })
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn emit(&mut self, kind: EventKind, message: impl Into<String>) {
        let message = message.into();
        let turn = self.clock();
        tracing::debug!(turn, ?kind, "{message}");
        self.events.push(turn, kind, message);
    }

    /// Completed turns.
    pub fn turn(&self) -> u64 {
        self.turn
    }

    /// Number stamped on anything that happens now: the turn in progress, or
    /// the last completed one between turns.
    pub fn clock(&self) -> u64 {
        if self.in_turn {
            self.turn + 1
        } else {
            self.turn
        }
    }

    /// First agent of `kind` by id, alive or not.
    pub fn find_role(&self, kind: RoleKind) -> Option<AgentId> {
        self.agents.iter().find(|a| a.kind() == kind).map(|a| a.id)
    }

    /// Living agents in acting order: role priority, then id.
    pub fn priority_order(&self) -> Vec<AgentId> {
        let mut ids: Vec<(u8, AgentId)> = self
            .agents
            .iter()
            .filter(|a| a.is_alive())
            .map(|a| (a.kind().priority(), a.id))
            .collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    pub fn ledger(&self, id: AgentId) -> Option<&TurnLedger> {
        self.ledger.get(&id)
    }

    pub fn ledger_mut(&mut self, id: AgentId) -> &mut TurnLedger {
        self.ledger.entry(id).or_default()
    }

    /// Routes all damage through one place so the ledger, the carry links
    /// and the boss phase announcement stay in step.
    pub fn damage(&mut self, id: AgentId, amount: i32) -> DamageTaken {
        let Some(agent) = self.agents.get_mut(id.index()) else {
            return DamageTaken::default();
        };
        let taken = agent.take_damage(amount);
        let name = agent.name.clone();
        let (carrying, carried_by) = (agent.carrying, agent.carried_by);
        if taken.killed {
            agent.carrying = None;
            agent.carried_by = None;
        }

        let ledger = self.ledger_mut(id);
        ledger.damage_taken += taken.amount;
        if taken.killed {
            ledger.died = true;
            if let Some(other) = carrying.and_then(|c| self.agent_mut(c)) {
                other.carried_by = None;
            }
            if let Some(other) = carried_by.and_then(|c| self.agent_mut(c)) {
                other.carrying = None;
            }
        }
        if taken.phase_flipped {
            self.emit(EventKind::Combat, format!("{name} enters its second phase"));
        }
        taken
    }

    /// Moves whatever `carrier` holds onto the carrier's cell.
    pub fn sync_carried(&mut self, carrier: AgentId) {
        let Some((pos, Some(load))) = self.agent(carrier).map(|a| (a.pos, a.carrying)) else {
            return;
        };
        if let Some(agent) = self.agent_mut(load) {
            agent.pos = pos;
        }
    }

    pub fn begin_turn(&mut self) {
        self.in_turn = true;
        self.ledger.clear();
        for agent in self.agents.iter().filter(|a| a.is_alive()) {
            self.ledger.insert(
                agent.id,
                TurnLedger {
                    health_fraction_before: agent.health_fraction(),
                    ..TurnLedger::default()
                },
            );
        }
    }

    pub fn finish_turn(&mut self) {
        self.in_turn = false;
        self.turn += 1;
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// Decides whether the run is over. The first decision sticks.
    pub fn evaluate_outcome(&mut self, max_turns: u64) -> Option<Outcome> {
        if self.outcome.is_some() {
            return self.outcome;
        }
        let protagonist_alive = self
            .find_role(RoleKind::Protagonist)
            .and_then(|id| self.agent(id))
            .is_some_and(|a| a.is_alive());
        let boss_dead = self
            .find_role(RoleKind::Boss)
            .and_then(|id| self.agent(id))
            .is_some_and(|a| !a.is_alive());

        let decided = if !protagonist_alive {
            Some((OutcomeKind::Defeat, OutcomeReason::ProtagonistDead))
        } else if boss_dead {
            Some((OutcomeKind::Victory, OutcomeReason::BossDefeated))
        } else if max_turns > 0 && self.turn >= max_turns {
            Some((OutcomeKind::Timeout, OutcomeReason::TurnLimit))
        } else {
            None
        };
        let (kind, reason) = decided?;
        let outcome = Outcome {
            kind,
            reason,
            turn: self.turn,
        };
        let (event, message) = match kind {
            OutcomeKind::Victory => (EventKind::Victory, "The adversary falls. The hunt is won."),
            OutcomeKind::Defeat => (EventKind::Defeat, "The young hunter has fallen."),
            OutcomeKind::Timeout => (EventKind::System, "The hunt runs out of time."),
        };
        self.emit(event, message);
        self.outcome = Some(outcome);
        Some(outcome)
    }

    /// One file per learning agent, named after its role.
    pub fn q_table_path(dir: &Path, kind: RoleKind) -> PathBuf {
        dir.join(format!("{}.json", format!("{kind:?}").to_lowercase()))
    }

    /// Loads every learner's table from `dir`. Missing or corrupt files
    /// leave that learner cold. Returns how many learners were visited.
    pub fn load_q_tables(&mut self, dir: &Path) -> usize {
        let mut visited = 0;
        for (agent, policy) in self.agents.iter().zip(self.policies.iter_mut()) {
            if let Some(learner) = policy.learner_mut() {
                let path = Self::q_table_path(dir, agent.kind());
                learner.set_table(QTable::load_or_default(&path));
                visited += 1;
            }
        }
        visited
    }

    pub fn save_q_tables(&self, dir: &Path) -> Result<usize> {
        let mut saved = 0;
        for (agent, policy) in self.agents.iter().zip(&self.policies) {
            if let Some(learner) = policy.learner() {
                learner
                    .table()
                    .save(&Self::q_table_path(dir, agent.kind()))?;
                saved += 1;
            }
        }
        tracing::info!(dir = %dir.display(), saved, "q-tables saved");
        Ok(saved)
    }

    pub fn snapshot(&self, scenario: &str) -> TurnSnapshot {
        let agents = self
            .agents
            .iter()
            .zip(&self.policies)
            .map(|(a, policy)| AgentSnapshot {
                id: a.id.raw(),
                name: a.name.clone(),
                kind: a.kind(),
                pos: a.pos,
                health: a.health(),
                max_health: a.max_health(),
                stamina: a.stamina(),
                max_stamina: a.max_stamina(),
                alive: a.is_alive(),
                carrying: a.carrying,
                carried_by: a.carried_by,
                pack: a.pack.clone(),
                strategy: policy.label().to_string(),
                role: a.role.clone(),
            })
            .collect();
        let items = self
            .grid
            .items()
            .into_iter()
            .map(|(pos, item)| ItemSnapshot { pos, item })
            .collect();
        TurnSnapshot {
            scenario: scenario.to_string(),
            turn: self.turn,
            width: self.grid.width(),
            height: self.grid.height(),
            weather: self.weather.kind,
            weather_turns: self.weather.turns_in_state,
            terrain: self.grid.terrain_rows(),
            agents,
            items,
            coordination: self.coordination.clone(),
            outcome: self.outcome,
        }
    }
}
