//! Honour, rank, trophies, the elder's judgement and trials.
//!
//! Only the protagonist carries an honour record. Rank is a ratchet: it is the
//! maximum of its previous value and the rank the present honour earns.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agent::{AgentId, Role, RoleKind};
use crate::events::EventKind;
use crate::resolver::{Resolution, Strike};
use crate::rng::RngExt;
use crate::world::World;

pub const APPROVAL_THRESHOLD: f64 = 30.0;
pub const EXILE_THRESHOLD: f64 = -30.0;
/// Turns of unchanged opinion before the elder sets a trial.
pub const STALE_OPINION_TURNS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rank {
    Unblooded,
    YoungBlood,
    Blooded,
    Warrior,
    Elite,
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Rank::Unblooded => "Unblooded",
            Rank::YoungBlood => "Young Blood",
            Rank::Blooded => "Blooded",
            Rank::Warrior => "Warrior",
            Rank::Elite => "Elite",
        };
        f.write_str(label)
    }
}

fn default_young_blood() -> f64 {
    10.0
}

fn default_blooded() -> f64 {
    30.0
}

fn default_warrior() -> f64 {
    60.0
}

fn default_elite() -> f64 {
    100.0
}

fn default_kill_bonus() -> f64 {
    5.0
}

fn default_trial_bonus() -> f64 {
    20.0
}

fn default_trial_penalty() -> f64 {
    10.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HonourRules {
    #[serde(default = "default_young_blood")]
    pub young_blood: f64,
    #[serde(default = "default_blooded")]
    pub blooded: f64,
    #[serde(default = "default_warrior")]
    pub warrior: f64,
    #[serde(default = "default_elite")]
    pub elite: f64,
    #[serde(default = "default_kill_bonus")]
    pub kill_bonus: f64,
    #[serde(default = "default_trial_bonus")]
    pub trial_bonus: f64,
    #[serde(default = "default_trial_penalty")]
    pub trial_penalty: f64,
}

impl Default for HonourRules {
    fn default() -> Self {
        Self {
            young_blood: default_young_blood(),
            blooded: default_blooded(),
            warrior: default_warrior(),
            elite: default_elite(),
            kill_bonus: default_kill_bonus(),
            trial_bonus: default_trial_bonus(),
            trial_penalty: default_trial_penalty(),
        }
    }
}

impl HonourRules {
    /// Rank earned by `honour` alone. Without a first kill the ladder stops
    /// at Young Blood. Reaching a threshold exactly earns that rank.
    pub fn rank_for(&self, honour: f64, first_kill: bool) -> Rank {
        let rank = if honour >= self.elite {
            Rank::Elite
        } else if honour >= self.warrior {
            Rank::Warrior
        } else if honour >= self.blooded {
            Rank::Blooded
        } else if honour >= self.young_blood {
            Rank::YoungBlood
        } else {
            Rank::Unblooded
        };
        if first_kill {
            rank
        } else {
            rank.min(Rank::YoungBlood)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrophyKind {
    Claw,
    Skull,
    Spine,
    BossPart,
    Artifact,
}

impl TrophyKind {
    pub fn value(self) -> u32 {
        match self {
            TrophyKind::Claw => 2,
            TrophyKind::Skull => 3,
            TrophyKind::Spine => 4,
            TrophyKind::BossPart => 10,
            TrophyKind::Artifact => 15,
        }
    }

    pub fn multiplier(self) -> f64 {
        match self {
            TrophyKind::Claw => 1.0,
            TrophyKind::Skull => 2.0,
            TrophyKind::Spine => 1.5,
            TrophyKind::BossPart => 5.0,
            TrophyKind::Artifact => 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trophy {
    pub kind: TrophyKind,
    pub source: String,
    pub turn: u64,
}

impl Trophy {
    pub fn honour_value(&self) -> f64 {
        self.kind.value() as f64 * self.kind.multiplier()
    }
}

/// Whether a kill of this target proves anything.
pub fn is_worthy(kind: RoleKind, max_health: i32) -> bool {
    kind == RoleKind::Boss || max_health >= 30
}

/// Trophy taken from a worthy kill. The synthetic leaves nothing behind.
pub fn trophy_for<R: Rng + ?Sized>(
    kind: RoleKind,
    source: &str,
    turn: u64,
    rng: &mut R,
) -> Option<Trophy> {
    let kind = match kind {
        RoleKind::Wildlife => {
            if rng.chance(0.5) {
                TrophyKind::Claw
            } else {
                TrophyKind::Skull
            }
        }
        RoleKind::Boss => {
            if rng.chance(0.5) {
                TrophyKind::BossPart
            } else {
                TrophyKind::Artifact
            }
        }
        RoleKind::Synthetic => return None,
        RoleKind::Protagonist | RoleKind::Elder | RoleKind::Rival => TrophyKind::Spine,
    };
    Some(Trophy {
        kind,
        source: source.to_string(),
        turn,
    })
}

/// How impressive a target is in the elder's eyes.
pub fn target_strength(kind: RoleKind, max_health: i32) -> u8 {
    match kind {
        RoleKind::Boss => 5,
        RoleKind::Elder | RoleKind::Rival => 4,
        RoleKind::Protagonist => 3,
        RoleKind::Wildlife if max_health >= 40 => 2,
        RoleKind::Wildlife | RoleKind::Synthetic => 1,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Approve,
    Neutral,
    Exile,
}

impl Verdict {
    pub fn from_opinion(opinion: f64) -> Self {
        if opinion > APPROVAL_THRESHOLD {
            Verdict::Approve
        } else if opinion < EXILE_THRESHOLD {
            Verdict::Exile
        } else {
            Verdict::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Violation {
    HuntUnworthy,
    UnfairAdvantage,
    HarmInnocent,
}

impl Violation {
    pub fn penalty(self) -> f64 {
        match self {
            Violation::HuntUnworthy => 15.0,
            Violation::UnfairAdvantage => 10.0,
            Violation::HarmInnocent => 30.0,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Violation::HuntUnworthy => "hunting unworthy prey",
            Violation::UnfairAdvantage => "striking unseen",
            Violation::HarmInnocent => "harming the innocent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialKind {
    Combat,
    Survival,
    Hunt,
    Honour,
}

impl TrialKind {
    pub const ALL: [TrialKind; 4] = [
        TrialKind::Combat,
        TrialKind::Survival,
        TrialKind::Hunt,
        TrialKind::Honour,
    ];

    /// Goal and time limit: kills, turns survived, trophy value, or honour
    /// gained since the trial was set.
    pub fn terms(self) -> (u32, u32) {
        match self {
            TrialKind::Combat => (2, 40),
            TrialKind::Survival => (25, 25),
            TrialKind::Hunt => (8, 50),
            TrialKind::Honour => (12, 35),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub kind: TrialKind,
    pub goal: u32,
    pub progress: u32,
    pub turns_remaining: u32,
    /// Turn the trial was set. That turn is not counted against it.
    pub issued_turn: u64,
    pub honour_at_issue: f64,
}

impl Trial {
    pub fn new(kind: TrialKind, issued_turn: u64, honour_at_issue: f64) -> Self {
        let (goal, turns) = kind.terms();
        Self {
            kind,
            goal,
            progress: 0,
            turns_remaining: turns,
            issued_turn,
            honour_at_issue,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HonourRecord {
    pub honour: f64,
    pub rank: Rank,
    pub trophies: Vec<Trophy>,
    pub first_kill: bool,
    pub kills: u32,
    pub trial: Option<Trial>,
}

impl Default for HonourRecord {
    fn default() -> Self {
        Self {
            honour: 0.0,
            rank: Rank::Unblooded,
            trophies: Vec::new(),
            first_kill: false,
            kills: 0,
            trial: None,
        }
    }
}

impl HonourRecord {
    /// Applies an honour change and returns the new rank if it advanced.
    pub fn adjust(&mut self, delta: f64, rules: &HonourRules) -> Option<Rank> {
        self.honour += delta;
        self.ratchet(rules)
    }

    pub fn ratchet(&mut self, rules: &HonourRules) -> Option<Rank> {
        let earned = rules.rank_for(self.honour, self.first_kill);
        if earned > self.rank {
            self.rank = earned;
            Some(earned)
        } else {
            None
        }
    }

    pub fn trophy_value(&self) -> u32 {
        self.trophies.iter().map(|t| t.kind.value()).sum()
    }
}

/// Judges one resolved action. Only protagonist and rival actions carry
/// weight with the clan.
pub fn judge(world: &mut World, res: &Resolution) {
    let Some(kind) = world.agent(res.actor).map(|a| a.kind()) else {
        return;
    };
    match kind {
        RoleKind::Protagonist => judge_protagonist(world, res),
        RoleKind::Rival => {
            let kills = res.strikes.iter().filter(|s| s.killed).count() as i32;
            if kills > 0 {
                if let Some(Role::Rival(rival)) = world.agent_mut(res.actor).map(|a| &mut a.role) {
                    rival.kills += kills as u32;
                    rival.rivalry = (rival.rivalry - kills).max(0);
                }
            }
        }
        _ => {}
    }
}

fn judge_protagonist(world: &mut World, res: &Resolution) {
    if res.strikes.is_empty() {
        return;
    }
    let rules = world.honour_rules;
    let mut honour_delta = 0.0;
    let mut opinion_delta = 0.0;
    let mut rivalry_delta = 0;
    let mut violations = Vec::new();
    let mut notes = Vec::new();

    let Some(agent) = world.agent_mut(res.actor) else {
        return;
    };
    let name = agent.name.clone();
    let Some(record) = agent.honour_mut() else {
        return;
    };
    let mut promotions = Vec::new();

    for strike in &res.strikes {
        let strength = target_strength(strike.target_kind, strike.target_max_health);
        judge_strike(strike, &mut violations);
        if strike.killed {
            record.kills += 1;
            record.first_kill = true;
            honour_delta += rules.kill_bonus;
            rivalry_delta += strength as i32;
            opinion_delta += match strength {
                s if s >= 4 => 8.0,
                s if s >= 2 => 4.0,
                _ => -2.0,
            };
            if let Some(trial) = record.trial.as_mut() {
                if trial.kind == TrialKind::Combat {
                    trial.progress += 1;
                }
            }
            if let Some(trophy) = &strike.trophy {
                honour_delta += trophy.honour_value();
                rivalry_delta += 2;
                if let Some(trial) = record.trial.as_mut() {
                    if trial.kind == TrialKind::Hunt {
                        trial.progress += trophy.kind.value();
                    }
                }
                notes.push(format!(
                    "{name} claims a {:?} from {} (+{:.1} honour)",
                    trophy.kind, strike.target_name, trophy.honour_value()
                ));
                record.trophies.push(trophy.clone());
            }
        } else if strike.damage > 0 {
            opinion_delta += if strength >= 3 { 2.0 } else { 1.0 };
        }
    }

    for violation in &violations {
        honour_delta -= violation.penalty();
        opinion_delta -= 5.0;
        notes.push(format!(
            "{name} breaks the clan code: {} (-{:.0} honour)",
            violation.describe(),
            violation.penalty()
        ));
    }

    if let Some(rank) = record.adjust(honour_delta, &rules) {
        promotions.push(rank);
    }

    for note in notes {
        world.emit(EventKind::Honour, note);
    }
    for rank in promotions {
        world.emit(EventKind::Honour, format!("{name} rises to the rank of {rank}"));
    }
    world.ledger_mut(res.actor).honour_delta += honour_delta;
    adjust_opinion(world, opinion_delta);
    if rivalry_delta != 0 {
        if let Some(rival_id) = world.find_role(RoleKind::Rival) {
            if let Some(Role::Rival(rival)) = world.agent_mut(rival_id).map(|a| &mut a.role) {
                rival.rivalry += rivalry_delta;
            }
        }
    }
}

fn judge_strike(strike: &Strike, violations: &mut Vec<Violation>) {
    if strike.killed && !strike.worthy {
        violations.push(Violation::HuntUnworthy);
    }
    if strike.ambush && !strike.target_kind.detects_stealth() {
        violations.push(Violation::UnfairAdvantage);
    }
    if matches!(strike.target_kind, RoleKind::Synthetic | RoleKind::Elder) {
        violations.push(Violation::HarmInnocent);
    }
}

/// Moves the elder's opinion of the protagonist and announces verdict
/// changes. A zero delta leaves the staleness counter running.
pub fn adjust_opinion(world: &mut World, delta: f64) {
    if delta == 0.0 {
        return;
    }
    let Some(elder_id) = world.find_role(RoleKind::Elder) else {
        return;
    };
    let Some(elder) = world.agent_mut(elder_id) else {
        return;
    };
    if !elder.is_alive() {
        return;
    }
    let elder_name = elder.name.clone();
    let Role::Elder(state) = &mut elder.role else {
        return;
    };
    state.opinion += delta;
    state.stale_turns = 0;
    let verdict = Verdict::from_opinion(state.opinion);
    if verdict == state.verdict {
        return;
    }
    state.verdict = verdict;
    let message = match verdict {
        Verdict::Approve => format!("{elder_name} approves of the young hunter"),
        Verdict::Exile => format!("{elder_name} casts the young hunter out"),
        Verdict::Neutral => format!("{elder_name} withholds judgement"),
    };
    world.emit(EventKind::Honour, message);
}

/// Starts a trial on the protagonist. Fails when one is already running or
/// there is nobody to test.
pub fn issue_trial(world: &mut World, issuer: AgentId, kind: TrialKind) -> bool {
    let issuer_name = match world.agent(issuer) {
        Some(a) => a.name.clone(),
        None => return false,
    };
    let turn = world.clock();
    let Some(pid) = world.find_role(RoleKind::Protagonist) else {
        return false;
    };
    let Some(agent) = world.agent_mut(pid) else {
        return false;
    };
    if !agent.is_alive() {
        return false;
    }
    let Some(record) = agent.honour_mut() else {
        return false;
    };
    if record.trial.is_some() {
        return false;
    }
    let trial = Trial::new(kind, turn, record.honour);
    let message = format!(
        "{issuer_name} sets a {:?} trial: {} within {} turns",
        kind, trial.goal, trial.turns_remaining
    );
    record.trial = Some(trial);
    world.emit(EventKind::Honour, message);
    true
}

enum TrialStatus {
    Ongoing,
    Completed(TrialKind),
    Expired(TrialKind),
}

/// Advances the active trial by one turn and settles it when done.
pub fn evaluate_trial(world: &mut World) {
    let rules = world.honour_rules;
    let turn = world.clock();
    let Some(pid) = world.find_role(RoleKind::Protagonist) else {
        return;
    };
    let Some(agent) = world.agent_mut(pid) else {
        return;
    };
    if !agent.is_alive() {
        return;
    }
    let name = agent.name.clone();
    let Some(record) = agent.honour_mut() else {
        return;
    };
    let honour = record.honour;
    let status = match record.trial.as_mut() {
        None => return,
        Some(trial) if trial.issued_turn >= turn => return,
        Some(trial) => {
            match trial.kind {
                TrialKind::Survival => trial.progress += 1,
                TrialKind::Honour => {
                    trial.progress = (honour - trial.honour_at_issue).max(0.0).floor() as u32;
                }
                TrialKind::Combat | TrialKind::Hunt => {}
            }
            trial.turns_remaining = trial.turns_remaining.saturating_sub(1);
            if trial.progress >= trial.goal {
                TrialStatus::Completed(trial.kind)
            } else if trial.turns_remaining == 0 {
                TrialStatus::Expired(trial.kind)
            } else {
                TrialStatus::Ongoing
            }
        }
    };
    match status {
        TrialStatus::Ongoing => {}
        TrialStatus::Completed(kind) => {
            record.trial = None;
            let promoted = record.adjust(rules.trial_bonus, &rules);
            world.ledger_mut(pid).honour_delta += rules.trial_bonus;
            world.emit(
                EventKind::Honour,
                format!("{name} completes the {kind:?} trial (+{:.0} honour)", rules.trial_bonus),
            );
            if let Some(rank) = promoted {
                world.emit(EventKind::Honour, format!("{name} rises to the rank of {rank}"));
            }
            adjust_opinion(world, 10.0);
        }
        TrialStatus::Expired(kind) => {
            record.trial = None;
            record.adjust(-rules.trial_penalty, &rules);
            world.ledger_mut(pid).honour_delta -= rules.trial_penalty;
            world.emit(
                EventKind::Honour,
                format!("{name} fails the {kind:?} trial (-{:.0} honour)", rules.trial_penalty),
            );
            adjust_opinion(world, -5.0);
        }
    }
}

/// Lets the elder's patience run down by one turn.
pub fn age_opinion(world: &mut World) {
    if let Some(elder_id) = world.find_role(RoleKind::Elder) {
        if let Some(Role::Elder(state)) = world.agent_mut(elder_id).map(|a| &mut a.role) {
            state.stale_turns += 1;
        }
    }
}
