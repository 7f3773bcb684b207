//! Per-agent state owned by the simulation.
//!
//! Health and stamina are private so every change goes through the clamping
//! mutators; a dead agent never comes back.

use serde::{Deserialize, Serialize};

use crate::grid::Pos;
use crate::honour::{HonourRecord, Verdict};
use crate::items::{Item, WeaponKind};
use crate::weather::WeatherKind;

pub const PACK_CAPACITY: usize = 3;
pub const HOSTILE_RIVALRY: i32 = 35;
const BOSS_PHASE_TWO_SCAN: i32 = 15;
const BOSS_RAGE_THRESHOLD: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub(crate) u64);

impl AgentId {
    pub fn raw(self) -> u64 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    Protagonist,
    Synthetic,
    Elder,
    Rival,
    Boss,
    Wildlife,
}

impl RoleKind {
    /// Position in the fixed per-turn acting order.
    pub fn priority(self) -> u8 {
        match self {
            RoleKind::Protagonist => 0,
            RoleKind::Synthetic => 1,
            RoleKind::Elder => 2,
            RoleKind::Rival => 3,
            RoleKind::Boss => 4,
            RoleKind::Wildlife => 5,
        }
    }

    pub fn template(self) -> StatTemplate {
        let (max_health, max_stamina, base_damage, sensor_radius) = match self {
            RoleKind::Protagonist => (120, 100, 18, 6),
            RoleKind::Synthetic => (60, 150, 6, 6),
            RoleKind::Elder => (180, 140, 22, 8),
            RoleKind::Rival => (160, 130, 20, 7),
            RoleKind::Wildlife => (50, 80, 8, 4),
            RoleKind::Boss => (150, 300, 18, 10),
        };
        let (attack_range, attack_cost, rest_stamina, rest_heal) = match self {
            RoleKind::Protagonist => (1, 15, 20, 5),
            RoleKind::Synthetic => (1, 10, 15, 0),
            RoleKind::Elder => (1, 12, 15, 3),
            RoleKind::Rival => (1, 12, 15, 3),
            RoleKind::Wildlife => (1, 8, 10, 2),
            RoleKind::Boss => (2, 15, 10, 0),
        };
        StatTemplate {
            max_health,
            max_stamina,
            base_damage,
            sensor_radius,
            attack_range,
            attack_cost,
            rest_stamina,
            rest_heal,
        }
    }

    /// Whether this kind can see through a stealth approach.
    pub fn detects_stealth(self) -> bool {
        matches!(self, RoleKind::Boss | RoleKind::Elder)
    }

    /// Killers that take trophies from worthy kills.
    pub fn takes_trophies(self) -> bool {
        matches!(
            self,
            RoleKind::Protagonist | RoleKind::Elder | RoleKind::Rival
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatTemplate {
    pub max_health: i32,
    pub max_stamina: i32,
    pub base_damage: i32,
    pub sensor_radius: i32,
    pub attack_range: i32,
    pub attack_cost: i32,
    pub rest_stamina: i32,
    pub rest_heal: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Territory {
    pub center: Pos,
    pub radius: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BossPhase {
    One,
    Two,
}

/// Coarse health reading other agents get to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HealthBand {
    Critical,
    Wounded,
    Hurt,
    Healthy,
}

impl HealthBand {
    pub fn from_fraction(fraction: f64) -> Self {
        if fraction < 0.25 {
            HealthBand::Critical
        } else if fraction < 0.5 {
            HealthBand::Wounded
        } else if fraction < 0.8 {
            HealthBand::Hurt
        } else {
            HealthBand::Healthy
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtagonistState {
    pub honour: HonourRecord,
    pub weapons: Vec<WeaponKind>,
    pub knows_boss_weakness: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticState {
    pub loyalty: i32,
    pub damage_level: f64,
    pub missing_limb: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElderState {
    pub opinion: f64,
    pub home: Pos,
    pub patrol_radius: i32,
    /// Consecutive turns without an opinion change.
    pub stale_turns: u32,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RivalState {
    pub rivalry: i32,
    pub kills: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WildlifeState {
    pub territory: Territory,
    pub aggression: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BossState {
    pub territory: Territory,
    pub phase: BossPhase,
    pub rage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Role {
    Protagonist(ProtagonistState),
    Synthetic(SyntheticState),
    Elder(ElderState),
    Rival(RivalState),
    Wildlife(WildlifeState),
    Boss(BossState),
}

impl Role {
    pub fn protagonist() -> Self {
        Role::Protagonist(ProtagonistState {
            honour: HonourRecord::default(),
            weapons: Vec::new(),
            knows_boss_weakness: false,
        })
    }

    pub fn synthetic() -> Self {
        Role::Synthetic(SyntheticState {
            loyalty: 30,
            damage_level: 40.0,
            missing_limb: true,
        })
    }

    pub fn elder(home: Pos) -> Self {
        Role::Elder(ElderState {
            opinion: -20.0,
            home,
            patrol_radius: 8,
            stale_turns: 0,
            verdict: Verdict::Neutral,
        })
    }

    pub fn rival() -> Self {
        Role::Rival(RivalState {
            rivalry: 15,
            kills: 0,
        })
    }

    pub fn wildlife(center: Pos, aggression: f64) -> Self {
        Role::Wildlife(WildlifeState {
            territory: Territory { center, radius: 5 },
            aggression: aggression.clamp(0.0, 1.0),
        })
    }

    pub fn boss(center: Pos) -> Self {
        Role::Boss(BossState {
            territory: Territory { center, radius: 7 },
            phase: BossPhase::One,
            rage: 0.0,
        })
    }

    pub fn kind(&self) -> RoleKind {
        match self {
            Role::Protagonist(_) => RoleKind::Protagonist,
            Role::Synthetic(_) => RoleKind::Synthetic,
            Role::Elder(_) => RoleKind::Elder,
            Role::Rival(_) => RoleKind::Rival,
            Role::Wildlife(_) => RoleKind::Wildlife,
            Role::Boss(_) => RoleKind::Boss,
        }
    }
}

/// What a single hit did to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DamageTaken {
    pub amount: i32,
    pub killed: bool,
    pub phase_flipped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub id: AgentId,
    pub name: String,
    pub pos: Pos,
    health: i32,
    max_health: i32,
    stamina: i32,
    max_stamina: i32,
    alive: bool,
    pub stats: StatTemplate,
    pub carrying: Option<AgentId>,
    pub carried_by: Option<AgentId>,
    pub pack: Vec<Item>,
    /// Turn in which the agent hit a trap and lost its remaining movement.
    pub snared_turn: Option<u64>,
    pub role: Role,
}

impl AgentState {
    pub fn new(name: impl Into<String>, pos: Pos, role: Role) -> Self {
        let stats = role.kind().template();
        Self {
            id: AgentId(0),
            name: name.into(),
            pos,
            health: stats.max_health,
            max_health: stats.max_health,
            stamina: stats.max_stamina,
            max_stamina: stats.max_stamina,
            alive: true,
            stats,
            carrying: None,
            carried_by: None,
            pack: Vec::new(),
            snared_turn: None,
            role,
        }
    }

    /// Replaces the maximum health and refills to it.
    #[must_use]
    pub fn with_max_health(mut self, max_health: i32) -> Self {
        self.max_health = max_health.max(1);
        self.health = self.max_health;
        self.stats.max_health = self.max_health;
        self
    }

    #[must_use]
    pub fn with_max_stamina(mut self, max_stamina: i32) -> Self {
        self.max_stamina = max_stamina.max(0);
        self.stamina = self.max_stamina;
        self.stats.max_stamina = self.max_stamina;
        self
    }

    #[must_use]
    pub fn with_health(mut self, health: i32) -> Self {
        self.set_health(health);
        self
    }

    #[must_use]
    pub fn with_stamina(mut self, stamina: i32) -> Self {
        self.stamina = stamina.clamp(0, self.max_stamina);
        self
    }

    pub fn kind(&self) -> RoleKind {
        self.role.kind()
    }

    pub fn health(&self) -> i32 {
        self.health
    }

    pub fn max_health(&self) -> i32 {
        self.max_health
    }

    pub fn stamina(&self) -> i32 {
        self.stamina
    }

    pub fn max_stamina(&self) -> i32 {
        self.max_stamina
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn health_fraction(&self) -> f64 {
        self.health as f64 / self.max_health as f64
    }

    pub fn stamina_fraction(&self) -> f64 {
        if self.max_stamina == 0 {
            return 0.0;
        }
        self.stamina as f64 / self.max_stamina as f64
    }

    pub fn health_band(&self) -> HealthBand {
        HealthBand::from_fraction(self.health_fraction())
    }

    /// Sets health within `[0, max]`; reaching zero kills. Ignored once dead.
    pub fn set_health(&mut self, health: i32) {
        if !self.alive {
            return;
        }
        self.health = health.clamp(0, self.max_health);
        if self.health == 0 {
            self.alive = false;
        }
        self.refresh_phase();
    }

    pub fn take_damage(&mut self, amount: i32) -> DamageTaken {
        if !self.alive || amount <= 0 {
            return DamageTaken::default();
        }
        let before = self.health;
        self.health = (self.health - amount).max(0);
        let dealt = before - self.health;
        match &mut self.role {
            Role::Synthetic(synth) => {
                synth.damage_level = (synth.damage_level + dealt as f64 * 0.5).min(100.0);
            }
            Role::Boss(boss) => {
                boss.rage = (boss.rage + dealt as f64 * 0.5).min(100.0);
            }
            _ => {}
        }
        if self.health == 0 {
            self.alive = false;
        }
        let phase_flipped = self.refresh_phase();
        DamageTaken {
            amount: dealt,
            killed: !self.alive,
            phase_flipped,
        }
    }

    /// Returns the amount actually restored.
    pub fn heal(&mut self, amount: i32) -> i32 {
        if !self.alive || amount <= 0 {
            return 0;
        }
        let before = self.health;
        self.health = (self.health + amount).min(self.max_health);
        self.health - before
    }

    /// Deducts `cost` if affordable; otherwise leaves stamina untouched.
    pub fn spend_stamina(&mut self, cost: i32) -> bool {
        if cost > self.stamina {
            return false;
        }
        self.stamina -= cost.max(0);
        true
    }

    pub fn restore_stamina(&mut self, amount: i32) -> i32 {
        if !self.alive || amount <= 0 {
            return 0;
        }
        let before = self.stamina;
        self.stamina = (self.stamina + amount).min(self.max_stamina);
        self.stamina - before
    }

    /// One-way boss escalation at half health. Returns true on the flip.
    fn refresh_phase(&mut self) -> bool {
        let half = self.health * 2 <= self.max_health;
        if let Role::Boss(boss) = &mut self.role {
            if boss.phase == BossPhase::One && half {
                boss.phase = BossPhase::Two;
                boss.rage = (boss.rage + 25.0).min(100.0);
                return true;
            }
        }
        false
    }

    pub fn boss_phase(&self) -> Option<BossPhase> {
        match &self.role {
            Role::Boss(boss) => Some(boss.phase),
            _ => None,
        }
    }

    /// Multiplier on outgoing damage from phase and rage.
    pub fn damage_multiplier(&self) -> f64 {
        match &self.role {
            Role::Boss(boss) => {
                let phase = if boss.phase == BossPhase::Two { 2.0 } else { 1.0 };
                let rage = if boss.rage >= BOSS_RAGE_THRESHOLD {
                    1.25
                } else {
                    1.0
                };
                phase * rage
            }
            _ => 1.0,
        }
    }

    pub fn weapon_bonus(&self) -> i32 {
        match &self.role {
            Role::Protagonist(p) => 3 * p.weapons.len() as i32,
            _ => 0,
        }
    }

    pub fn sensor_radius(&self, weather: WeatherKind) -> i32 {
        let base = match self.boss_phase() {
            Some(BossPhase::Two) => BOSS_PHASE_TWO_SCAN,
            _ => self.stats.sensor_radius,
        };
        (base - weather.visibility_penalty()).max(1)
    }

    /// Whether the agent can take a step under its own power.
    pub fn can_move_independently(&self) -> bool {
        if self.carried_by.is_some() {
            return false;
        }
        match &self.role {
            Role::Synthetic(synth) => !synth.missing_limb && synth.damage_level < 60.0,
            _ => true,
        }
    }

    pub fn honour(&self) -> Option<&HonourRecord> {
        match &self.role {
            Role::Protagonist(p) => Some(&p.honour),
            _ => None,
        }
    }

    pub fn honour_mut(&mut self) -> Option<&mut HonourRecord> {
        match &mut self.role {
            Role::Protagonist(p) => Some(&mut p.honour),
            _ => None,
        }
    }

    pub fn loyalty(&self) -> Option<i32> {
        match &self.role {
            Role::Synthetic(synth) => Some(synth.loyalty),
            _ => None,
        }
    }

    pub fn adjust_loyalty(&mut self, delta: i32) {
        if let Role::Synthetic(synth) = &mut self.role {
            synth.loyalty = (synth.loyalty + delta).clamp(0, 100);
        }
    }

    pub fn rivalry(&self) -> Option<i32> {
        match &self.role {
            Role::Rival(rival) => Some(rival.rivalry),
            _ => None,
        }
    }

    /// Who this agent treats as a legitimate target.
    pub fn is_hostile_to(&self, other: &AgentState) -> bool {
        if self.id == other.id {
            return false;
        }
        match (self.kind(), other.kind()) {
            (RoleKind::Wildlife, RoleKind::Wildlife) => false,
            (RoleKind::Wildlife, _) => true,
            (RoleKind::Boss, RoleKind::Boss | RoleKind::Wildlife) => false,
            (RoleKind::Boss, _) => true,
            (_, RoleKind::Wildlife | RoleKind::Boss) => true,
            (RoleKind::Protagonist, RoleKind::Rival) => {
                other.rivalry().unwrap_or(0) >= HOSTILE_RIVALRY
            }
            (RoleKind::Rival, RoleKind::Protagonist) => {
                self.rivalry().unwrap_or(0) >= HOSTILE_RIVALRY
            }
            _ => false,
        }
    }
}
