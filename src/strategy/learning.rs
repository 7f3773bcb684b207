//! Tabular Q-learning for the protagonist and the synthetic.
//!
//! The observation is squashed into a small [`StateKey`]; the table maps each
//! visited key to one value per [`QAction`]. Unvisited pairs read as zero.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agent::{BossPhase, HealthBand, RoleKind};
use crate::error::ConfigError;

use super::{Intent, Observation, Special};

pub const ACTION_COUNT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QAction {
    Attack,
    Retreat,
    Heal,
    MoveTowards,
    MoveAway,
    Coordinate,
    Defend,
    Flank,
    Rest,
    Special,
}

impl QAction {
    pub const ALL: [QAction; ACTION_COUNT] = [
        QAction::Attack,
        QAction::Retreat,
        QAction::Heal,
        QAction::MoveTowards,
        QAction::MoveAway,
        QAction::Coordinate,
        QAction::Defend,
        QAction::Flank,
        QAction::Rest,
        QAction::Special,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Turns the abstract action into a concrete intent for this observation.
    pub fn to_intent(self, obs: &Observation) -> Intent {
        let me = &obs.me;
        let enemy = obs.nearest_enemy();
        match self {
            QAction::Attack => match enemy {
                Some(e) if e.distance <= me.stats.attack_range => Intent::Attack { target: e.id },
                Some(e) => obs.toward(e.pos),
                None => Intent::Rest,
            },
            QAction::Retreat => match enemy {
                Some(e) => obs.away_from(e.pos),
                None => Intent::Rest,
            },
            QAction::MoveAway => match enemy {
                Some(e) => obs.away_from(e.pos),
                None => obs.wander(),
            },
            QAction::MoveTowards => {
                if let Some(e) = enemy {
                    obs.toward(e.pos)
                } else if let Some(cell) = obs.nearest_item() {
                    obs.toward(cell.pos)
                } else {
                    obs.wander()
                }
            }
            QAction::Heal => heal(obs),
            QAction::Coordinate => coordinate(obs),
            QAction::Defend | QAction::Rest => Intent::Rest,
            QAction::Flank => match enemy {
                Some(e) if e.distance <= me.stats.attack_range => Intent::Attack { target: e.id },
                Some(e) => {
                    let (mut dx, mut dy) = obs.dims.step_toward(me.pos, e.pos);
                    // Come in on the diagonal rather than head on.
                    if dx == 0 {
                        dx = if me.id.raw() % 2 == 0 { 1 } else { -1 };
                    } else if dy == 0 {
                        dy = if me.id.raw() % 2 == 0 { 1 } else { -1 };
                    }
                    Intent::Move { dx, dy }
                }
                None => obs.wander(),
            },
            QAction::Special => match me.kind() {
                RoleKind::Protagonist => match enemy {
                    Some(e) if e.distance <= 1 => Intent::Special(Special::Ambush { target: e.id }),
                    Some(e) => obs.toward(e.pos),
                    None => Intent::Rest,
                },
                RoleKind::Synthetic => Intent::Scan,
                _ => Intent::Rest,
            },
        }
    }
}

fn heal(obs: &Observation) -> Intent {
    if obs.has_usable_pack_item() {
        return Intent::UseItem;
    }
    if obs.me.kind() == RoleKind::Synthetic {
        if let Some(ally) = obs.ally() {
            if ally.band < HealthBand::Healthy {
                return if ally.distance <= 1 {
                    Intent::Special(Special::HealAlly { target: ally.id })
                } else {
                    obs.toward(ally.pos)
                };
            }
        }
    }
    match obs.nearest_item() {
        Some(cell) if cell.distance > 0 => obs.toward(cell.pos),
        _ => Intent::Rest,
    }
}

fn coordinate(obs: &Observation) -> Intent {
    let me = &obs.me;
    let Some(ally) = obs.ally() else {
        return Intent::Rest;
    };
    let alliance = obs.coordination.as_ref().is_some_and(|c| c.alliance);
    match me.kind() {
        RoleKind::Protagonist => {
            if let Some(carried) = me.carrying {
                if obs.enemies().any(|e| e.distance <= 1) {
                    return Intent::Drop { target: carried };
                }
            } else if ally.distance <= 1 && ally.kind == RoleKind::Synthetic {
                return Intent::Carry { target: ally.id };
            }
            if ally.distance > 3 {
                return obs.toward(ally.pos);
            }
            let knows_weakness = matches!(
                &me.role,
                crate::agent::Role::Protagonist(p) if p.knows_boss_weakness
            );
            if !knows_weakness {
                Intent::RequestInfo { target: ally.id }
            } else if !alliance {
                Intent::FormAlliance { target: ally.id }
            } else {
                Intent::ShareInfo { target: ally.id }
            }
        }
        RoleKind::Synthetic => {
            if ally.distance > 3 {
                return obs.toward(ally.pos);
            }
            if !alliance && me.loyalty().unwrap_or(0) >= 50 {
                Intent::FormAlliance { target: ally.id }
            } else {
                Intent::ShareInfo { target: ally.id }
            }
        }
        _ => Intent::Rest,
    }
}

/// Discretised state the Q-table is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StateKey {
    pub health: u8,
    pub enemy_distance: u8,
    pub enemy_count: u8,
    pub ally_nearby: bool,
    pub stamina: u8,
    pub boss_phase: u8,
}

fn default_health_bounds() -> [f64; 3] {
    [80.0, 50.0, 25.0]
}

fn default_distance_bounds() -> [i32; 3] {
    [1, 4, 8]
}

fn default_stamina_bounds() -> [f64; 2] {
    [70.0, 30.0]
}

fn default_ally_radius() -> i32 {
    4
}

/// Bucket boundaries for [`StateKey`]. Percentages are of the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Descending lower bounds of health buckets 3, 2 and 1.
    #[serde(default = "default_health_bounds")]
    pub health: [f64; 3],
    /// Ascending upper bounds of distance buckets 0, 1 and 2.
    #[serde(default = "default_distance_bounds")]
    pub distance: [i32; 3],
    #[serde(default = "default_stamina_bounds")]
    pub stamina: [f64; 2],
    #[serde(default = "default_ally_radius")]
    pub ally_radius: i32,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            health: default_health_bounds(),
            distance: default_distance_bounds(),
            stamina: default_stamina_bounds(),
            ally_radius: default_ally_radius(),
        }
    }
}

impl BucketConfig {
    pub fn health_bucket(&self, percent: f64) -> u8 {
        let [high, mid, low] = self.health;
        if percent >= high {
            3
        } else if percent >= mid {
            2
        } else if percent >= low {
            1
        } else {
            0
        }
    }

    pub fn distance_bucket(&self, distance: Option<i32>) -> u8 {
        let [near, mid, far] = self.distance;
        match distance {
            Some(d) if d <= near => 0,
            Some(d) if d <= mid => 1,
            Some(d) if d <= far => 2,
            _ => 3,
        }
    }

    pub fn count_bucket(count: usize) -> u8 {
        match count {
            0 => 0,
            1 => 1,
            2 | 3 => 2,
            _ => 3,
        }
    }

    pub fn stamina_bucket(&self, percent: f64) -> u8 {
        let [high, low] = self.stamina;
        if percent >= high {
            2
        } else if percent >= low {
            1
        } else {
            0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LearningParams {
    pub alpha: f64,
    pub gamma: f64,
    pub epsilon: f64,
    pub epsilon_decay: f64,
    pub epsilon_min: f64,
}

impl LearningParams {
    pub fn protagonist() -> Self {
        Self {
            alpha: 0.1,
            gamma: 0.95,
            epsilon: 0.3,
            epsilon_decay: 0.995,
            epsilon_min: 0.05,
        }
    }

    pub fn synthetic() -> Self {
        Self {
            alpha: 0.15,
            gamma: 0.9,
            epsilon: 0.2,
            epsilon_decay: 0.99,
            epsilon_min: 0.03,
        }
    }

    pub fn validate(&self, agent: &str) -> Result<(), ConfigError> {
        let fail = |reason: &str| {
            Err(ConfigError::InvalidLearning {
                agent: agent.to_string(),
                reason: reason.to_string(),
            })
        };
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return fail("alpha must be in (0, 1]");
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return fail("gamma must be in [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.epsilon) {
            return fail("epsilon must be in [0, 1]");
        }
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0) {
            return fail("epsilon_decay must be in (0, 1]");
        }
        if !(self.epsilon_min >= 0.0 && self.epsilon_min <= self.epsilon) {
            return fail("epsilon_min must be between 0 and epsilon");
        }
        Ok(())
    }
}

/// One persisted row of the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QEntry {
    pub state: StateKey,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QTable {
    values: BTreeMap<StateKey, [f64; ACTION_COUNT]>,
}

impl QTable {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, state: &StateKey, action: QAction) -> f64 {
        self.values
            .get(state)
            .map_or(0.0, |row| row[action.index()])
    }

    pub fn max_value(&self, state: &StateKey) -> f64 {
        self.values
            .get(state)
            .map_or(0.0, |row| row.iter().copied().fold(f64::NEG_INFINITY, f64::max))
    }

    /// Highest valued action; ties go to the earliest in [`QAction::ALL`].
    pub fn best_action(&self, state: &StateKey) -> QAction {
        let Some(row) = self.values.get(state) else {
            return QAction::ALL[0];
        };
        let mut best = 0;
        for (i, v) in row.iter().enumerate().skip(1) {
            if *v > row[best] {
                best = i;
            }
        }
        QAction::ALL[best]
    }

    /// Bellman update: `Q(s,a) += alpha * (r + gamma * max Q(s') - Q(s,a))`.
    pub fn update(
        &mut self,
        state: StateKey,
        action: QAction,
        reward: f64,
        next: &StateKey,
        alpha: f64,
        gamma: f64,
    ) -> f64 {
        let future = self.max_value(next);
        let row = self.values.entry(state).or_insert([0.0; ACTION_COUNT]);
        let current = row[action.index()];
        let updated = current + alpha * (reward + gamma * future - current);
        row[action.index()] = updated;
        updated
    }

    pub fn entries(&self) -> Vec<QEntry> {
        self.values
            .iter()
            .map(|(state, row)| QEntry {
                state: *state,
                values: row.to_vec(),
            })
            .collect()
    }

    pub fn from_entries(entries: Vec<QEntry>) -> Result<Self> {
        let mut values = BTreeMap::new();
        for entry in entries {
            let row: [f64; ACTION_COUNT] = entry.values.as_slice().try_into().map_err(|_| {
                anyhow::anyhow!(
                    "expected {ACTION_COUNT} action values, found {}",
                    entry.values.len()
                )
            })?;
            values.insert(entry.state, row);
        }
        Ok(Self { values })
    }

    /// Reads a saved table, starting cold when the file is missing or bad.
    pub fn load_or_default(path: &Path) -> QTable {
        match Self::load(path) {
            Ok(table) => {
                tracing::info!(path = %path.display(), states = table.len(), "loaded q-table");
                table
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "starting with an empty q-table");
                QTable::default()
            }
        }
    }

    fn load(path: &Path) -> Result<QTable> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read q-table {}", path.display()))?;
        let entries: Vec<QEntry> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse q-table {}", path.display()))?;
        Self::from_entries(entries).with_context(|| format!("malformed q-table {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&self.entries())?;
        fs::write(path, json).with_context(|| format!("failed to write q-table {}", path.display()))?;
        tracing::debug!(path = %path.display(), states = self.len(), "saved q-table");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct QLearner {
    table: QTable,
    params: LearningParams,
    epsilon: f64,
    buckets: BucketConfig,
    pending: Option<(StateKey, QAction)>,
}

impl QLearner {
    pub fn new(params: LearningParams, buckets: BucketConfig) -> Self {
        Self {
            table: QTable::default(),
            epsilon: params.epsilon,
            params,
            buckets,
            pending: None,
        }
    }

    pub fn discretize(&self, obs: &Observation) -> StateKey {
        let me = &obs.me;
        let nearest = obs.nearest_enemy().map(|e| e.distance);
        let boss_phase = obs
            .agents
            .iter()
            .find_map(|a| a.boss_phase)
            .map_or(0, |phase| match phase {
                BossPhase::One => 1,
                BossPhase::Two => 2,
            });
        StateKey {
            health: self.buckets.health_bucket(me.health_fraction() * 100.0),
            enemy_distance: self.buckets.distance_bucket(nearest),
            enemy_count: BucketConfig::count_bucket(obs.enemies().count()),
            ally_nearby: obs
                .ally()
                .is_some_and(|a| a.distance <= self.buckets.ally_radius),
            stamina: self.buckets.stamina_bucket(me.stamina_fraction() * 100.0),
            boss_phase,
        }
    }

    /// Epsilon-greedy choice. The pair is remembered until [`QLearner::learn`].
    pub fn choose<R: Rng + ?Sized>(&mut self, obs: &Observation, rng: &mut R) -> QAction {
        let state = self.discretize(obs);
        let action = if rng.gen::<f64>() < self.epsilon {
            QAction::ALL[rng.gen_range(0..ACTION_COUNT)]
        } else {
            self.table.best_action(&state)
        };
        self.pending = Some((state, action));
        action
    }

    pub fn pending(&self) -> Option<(StateKey, QAction)> {
        self.pending
    }

    /// Applies the reward for the pending choice. Returns false when there
    /// was nothing to learn from.
    pub fn learn(&mut self, reward: f64, next: StateKey) -> bool {
        let Some((state, action)) = self.pending.take() else {
            return false;
        };
        self.table
            .update(state, action, reward, &next, self.params.alpha, self.params.gamma);
        self.epsilon = (self.epsilon * self.params.epsilon_decay).max(self.params.epsilon_min);
        true
    }

    /// Drops a pending choice without learning, used when the agent died.
    pub fn forget(&mut self) {
        self.pending = None;
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn params(&self) -> LearningParams {
        self.params
    }

    pub fn table(&self) -> &QTable {
        &self.table
    }

    pub fn set_table(&mut self, table: QTable) {
        self.table = table;
    }
}

/// Everything that happened to one learner during a turn.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RewardInputs {
    pub action: Option<QAction>,
    pub died: bool,
    pub ally_died: bool,
    pub health_fraction_before: f64,
    pub health_fraction: f64,
    pub damage_dealt: i32,
    pub damage_taken: i32,
    pub wildlife_kills: u32,
    pub boss_kills: u32,
    pub healed_ally: bool,
    pub items_collected: u32,
    pub honour_gained: f64,
    pub served_goal: bool,
    pub enemy_adjacent: bool,
}

pub fn reward_for(inputs: &RewardInputs) -> f64 {
    let mut reward = 0.0;
    if inputs.died {
        reward -= 100.0;
    } else {
        reward += 0.1;
        if inputs.health_fraction < 0.25 {
            reward -= 1.0;
        }
    }
    if inputs.ally_died {
        reward -= 50.0;
    }
    reward += 0.5 * inputs.damage_dealt as f64;
    reward -= 0.3 * inputs.damage_taken as f64;
    reward += 10.0 * inputs.wildlife_kills as f64;
    reward += 100.0 * inputs.boss_kills as f64;
    if inputs.healed_ally {
        reward += 5.0;
    }
    reward += 3.0 * inputs.items_collected as f64;
    if inputs.honour_gained > 0.0 {
        reward += 2.0 * inputs.honour_gained;
    }
    if inputs.served_goal {
        reward += 8.0;
    }
    if inputs.action == Some(QAction::Retreat) {
        if inputs.health_fraction_before < 0.3 {
            reward += 5.0;
        } else if inputs.health_fraction_before > 0.7 && !inputs.enemy_adjacent {
            reward -= 3.0;
        }
    }
    reward
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentId, AgentState, Role};
    use crate::grid::{Dims, Pos};
    use crate::strategy::VisibleAgent;
    use crate::weather::WeatherKind;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn key(health: u8) -> StateKey {
        StateKey {
            health,
            enemy_distance: 3,
            enemy_count: 0,
            ally_nearby: false,
            stamina: 2,
            boss_phase: 0,
        }
    }

    fn observe(me: AgentState, agents: Vec<VisibleAgent>) -> Observation {
        Observation {
            turn: 0,
            dims: Dims::new(20, 20).unwrap(),
            me,
            weather: WeatherKind::Calm,
            agents,
            cells: Vec::new(),
            coordination: None,
            trial_active: false,
        }
    }

    #[test]
    fn unvisited_pairs_read_zero() {
        let table = QTable::default();
        assert_eq!(table.value(&key(3), QAction::Flank), 0.0);
        assert_eq!(table.max_value(&key(3)), 0.0);
        assert_eq!(table.best_action(&key(3)), QAction::Attack);
    }

    #[test]
    fn zero_reward_self_loop_stays_put() {
        let mut table = QTable::default();
        let s = key(2);
        table.update(s, QAction::Rest, 0.0, &s, 0.1, 0.95);
        assert_eq!(table.value(&s, QAction::Rest), 0.0);
        for _ in 0..50 {
            table.update(s, QAction::Rest, 0.0, &s, 0.1, 0.0);
        }
        assert_eq!(table.value(&s, QAction::Rest), 0.0);
    }

    #[test]
    fn update_follows_the_bellman_rule() {
        let mut table = QTable::default();
        let s = key(3);
        let next = key(2);
        table.update(next, QAction::Heal, 10.0, &next, 1.0, 0.0);
        let q = table.update(s, QAction::Attack, 1.0, &next, 0.5, 0.9);
        assert!((q - 0.5 * (1.0 + 0.9 * 10.0)).abs() < 1e-9);
        assert_eq!(table.best_action(&s), QAction::Attack);
    }

    #[test]
    fn epsilon_decays_to_its_floor() {
        let params = LearningParams::synthetic();
        let mut learner = QLearner::new(params, BucketConfig::default());
        let obs = observe(AgentState::new("Thia", Pos::new(3, 3), Role::synthetic()), Vec::new());
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut last = learner.epsilon();
        for _ in 0..1000 {
            learner.choose(&obs, &mut rng);
            assert!(learner.learn(0.0, key(1)));
            assert!(learner.epsilon() <= last);
            last = learner.epsilon();
        }
        assert_eq!(learner.epsilon(), params.epsilon_min);
        assert!(!learner.learn(1.0, key(1)));
    }

    #[test]
    fn buckets_use_documented_edges() {
        let b = BucketConfig::default();
        assert_eq!(b.health_bucket(80.0), 3);
        assert_eq!(b.health_bucket(79.9), 2);
        assert_eq!(b.health_bucket(24.0), 0);
        assert_eq!(b.distance_bucket(Some(1)), 0);
        assert_eq!(b.distance_bucket(Some(8)), 2);
        assert_eq!(b.distance_bucket(None), 3);
        assert_eq!(BucketConfig::count_bucket(3), 2);
        assert_eq!(BucketConfig::count_bucket(7), 3);
        assert_eq!(b.stamina_bucket(30.0), 1);
    }

    #[test]
    fn discretize_reads_enemies_and_boss_phase() {
        let mut me = AgentState::new("Dek", Pos::new(5, 5), Role::protagonist()).with_health(60);
        me.id = AgentId(0);
        let boss = VisibleAgent {
            id: AgentId(4),
            kind: RoleKind::Boss,
            pos: Pos::new(8, 5),
            distance: 3,
            band: HealthBand::Wounded,
            hostile: true,
            boss_phase: Some(BossPhase::Two),
        };
        let learner = QLearner::new(LearningParams::protagonist(), BucketConfig::default());
        let state = learner.discretize(&observe(me, vec![boss]));
        assert_eq!(state.health, 2);
        assert_eq!(state.enemy_distance, 1);
        assert_eq!(state.enemy_count, 1);
        assert_eq!(state.boss_phase, 2);
        assert!(!state.ally_nearby);
    }

    #[test]
    fn rewards_weigh_outcomes() {
        let kill = RewardInputs {
            health_fraction: 0.9,
            health_fraction_before: 0.9,
            damage_dealt: 20,
            wildlife_kills: 1,
            ..RewardInputs::default()
        };
        assert!((reward_for(&kill) - 20.1).abs() < 1e-9);

        let death = RewardInputs {
            died: true,
            ..RewardInputs::default()
        };
        assert_eq!(reward_for(&death), -100.0);

        let timid = RewardInputs {
            action: Some(QAction::Retreat),
            health_fraction: 0.9,
            health_fraction_before: 0.9,
            ..RewardInputs::default()
        };
        assert!((reward_for(&timid) - (0.1 - 3.0)).abs() < 1e-9);
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        let mut params = LearningParams::protagonist();
        params.epsilon_min = 0.5;
        assert!(matches!(
            params.validate("Dek"),
            Err(ConfigError::InvalidLearning { .. })
        ));
        assert!(LearningParams::synthetic().validate("Thia").is_ok());
    }

    #[test]
    fn corrupt_tables_start_cold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.json");
        std::fs::write(&path, r#"[{"state":{"health":1,"enemy_distance":0,"enemy_count":1,"ally_nearby":false,"stamina":1,"boss_phase":0},"values":[1.0]}]"#).unwrap();
        assert!(QTable::load_or_default(&path).is_empty());
        assert!(QTable::load_or_default(&dir.path().join("missing.json")).is_empty());

        let mut table = QTable::default();
        table.update(key(1), QAction::Heal, 4.0, &key(1), 0.5, 0.0);
        table.save(&path).unwrap();
        assert_eq!(QTable::load_or_default(&path), table);
    }

    #[test]
    fn special_is_an_ambush_when_adjacent() {
        let mut me = AgentState::new("Dek", Pos::new(5, 5), Role::protagonist());
        me.id = AgentId(0);
        let prey = VisibleAgent {
            id: AgentId(7),
            kind: RoleKind::Wildlife,
            pos: Pos::new(6, 6),
            distance: 1,
            band: HealthBand::Healthy,
            hostile: true,
            boss_phase: None,
        };
        let obs = observe(me, vec![prey]);
        assert_eq!(
            QAction::Special.to_intent(&obs),
            Intent::Special(Special::Ambush { target: AgentId(7) })
        );
        assert_eq!(QAction::Attack.to_intent(&obs), Intent::Attack { target: AgentId(7) });
    }
}
