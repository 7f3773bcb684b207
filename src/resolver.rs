//! Action resolution and combat.
//!
//! An intent that fails a precondition is not an error: it degrades to a
//! rest for the turn and the reason is kept on the [`Resolution`].

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agent::{AgentId, BossPhase, Role, RoleKind};
use crate::coordination::ScanReport;
use crate::events::EventKind;
use crate::grid::{Pos, Terrain};
use crate::honour::{self, Trophy};
use crate::items::Item;
use crate::rng::RngExt;
use crate::strategy::boss as boss_rules;
use crate::strategy::{Intent, Special};
use crate::world::World;

const AMBUSH_COST: i32 = 25;
const AMBUSH_MULTIPLIER: f64 = 1.5;
const HEAL_ALLY_COST: i32 = 10;
const HEAL_ALLY_AMOUNT: i32 = 12;
const EARTHQUAKE_DAMAGE: i32 = 12;
const REGENERATE_AMOUNT: i32 = 25;
const REGENERATE_RAGE_RELIEF: f64 = 20.0;
const SCAN_COST: i32 = 5;
const SCAN_RADIUS: i32 = 4;
const SCAN_REFRESH: i32 = 5;
const SOCIAL_RANGE: i32 = 3;
const SHARE_LOYALTY: i32 = 20;
const ALLIANCE_LOYALTY: i32 = 50;
const CARRIER_BOOST_LOYALTY: i32 = 60;
const WEAKNESS_BONUS: i32 = 5;
const ROLL_MAX: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Degraded {
    InsufficientStamina,
    OutOfRange,
    TargetDead,
    Carried,
    Immobile,
    Snared,
    NoUsableItem,
    NotPermitted,
    InvalidTarget,
}

/// One hit landed during an action.
#[derive(Debug, Clone, PartialEq)]
pub struct Strike {
    pub target: AgentId,
    pub target_kind: RoleKind,
    pub target_name: String,
    pub target_max_health: i32,
    pub damage: i32,
    pub killed: bool,
    pub worthy: bool,
    pub ambush: bool,
    pub trophy: Option<Trophy>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub actor: AgentId,
    /// Position before the action.
    pub origin: Pos,
    pub requested: Intent,
    pub performed: Intent,
    pub degraded: Option<Degraded>,
    pub strikes: Vec<Strike>,
    pub healed: i32,
    /// Outcome of a social intent, if one was attempted.
    pub social: Option<bool>,
    pub moved: bool,
}

impl Resolution {
    fn new(actor: AgentId, origin: Pos, intent: Intent) -> Self {
        Self {
            actor,
            origin,
            requested: intent,
            performed: intent,
            degraded: None,
            strikes: Vec::new(),
            healed: 0,
            social: None,
            moved: false,
        }
    }

    pub fn kills(&self) -> impl Iterator<Item = &Strike> {
        self.strikes.iter().filter(|s| s.killed)
    }
}

type Outcome = Result<(), Degraded>;

/// Validates and applies one intent for `id`.
pub fn resolve<R: Rng + ?Sized>(world: &mut World, id: AgentId, intent: Intent, rng: &mut R) -> Resolution {
    let origin = world.agent(id).map(|a| a.pos).unwrap_or_default();
    let mut res = Resolution::new(id, origin, intent);
    if !world.agent(id).is_some_and(|a| a.is_alive()) {
        res.performed = Intent::Rest;
        res.degraded = Some(Degraded::InvalidTarget);
        return res;
    }

    let outcome = match intent {
        Intent::Move { dx, dy } => step(world, id, dx, dy, rng, &mut res),
        Intent::Rest => {
            rest(world, id);
            Ok(())
        }
        Intent::Attack { target } => attack(world, id, target, false, rng, &mut res),
        Intent::UseItem => use_item(world, id),
        Intent::Special(special) => match special {
            Special::Ambush { target } => {
                if world.agent(id).map(|a| a.kind()) != Some(RoleKind::Protagonist) {
                    Err(Degraded::NotPermitted)
                } else {
                    attack(world, id, target, true, rng, &mut res)
                }
            }
            Special::HealAlly { target } => heal_ally(world, id, target, &mut res),
            Special::Earthquake => earthquake(world, id, rng, &mut res),
            Special::Regenerate => regenerate(world, id, &mut res),
            Special::IssueTrial { kind } => issue_trial(world, id, kind),
        },
        Intent::Carry { target } => carry(world, id, target),
        Intent::Drop { target } => drop_carried(world, id, target),
        Intent::Scan => scan(world, id),
        Intent::RequestInfo { target }
        | Intent::ShareInfo { target }
        | Intent::FormAlliance { target } => social(world, id, target, intent, &mut res),
    };

    if let Err(reason) = outcome {
        tracing::debug!(
            agent = id.raw(),
            intent = intent.label(),
            ?reason,
            "intent degraded to rest"
        );
        res.performed = Intent::Rest;
        res.degraded = Some(reason);
        rest(world, id);
    }
    res
}

fn rest(world: &mut World, id: AgentId) {
    if let Some(agent) = world.agent_mut(id) {
        let stamina = agent.stats.rest_stamina;
        let heal = agent.stats.rest_heal;
        agent.restore_stamina(stamina);
        agent.heal(heal);
    }
}

fn step<R: Rng + ?Sized>(
    world: &mut World,
    id: AgentId,
    dx: i32,
    dy: i32,
    rng: &mut R,
    res: &mut Resolution,
) -> Outcome {
    let (dx, dy) = (dx.clamp(-1, 1), dy.clamp(-1, 1));
    if dx == 0 && dy == 0 {
        rest(world, id);
        res.performed = Intent::Rest;
        return Ok(());
    }
    let turn = world.clock();
    let multiplier = world.weather().kind.move_multiplier();
    let dims = world.grid().dims();
    let agent = world.agent(id).ok_or(Degraded::InvalidTarget)?;
    if agent.carried_by.is_some() {
        return Err(Degraded::Carried);
    }
    if !agent.can_move_independently() {
        return Err(Degraded::Immobile);
    }
    if agent.snared_turn == Some(turn) {
        return Err(Degraded::Snared);
    }
    let dest = dims.offset(agent.pos, dx, dy);
    let cell = world.grid().cell(dest);
    let mut cost = cell.movement_cost(multiplier);
    if agent.carrying.is_some() {
        cost *= 2;
    }
    let terrain = cell.terrain;
    let entry_damage = cell.entry_damage();

    let agent = world.agent_mut(id).ok_or(Degraded::InvalidTarget)?;
    if !agent.spend_stamina(cost) {
        return Err(Degraded::InsufficientStamina);
    }
    agent.pos = dest;
    res.moved = true;
    let name = agent.name.clone();

    if entry_damage > 0 {
        let taken = world.damage(id, entry_damage);
        world.emit(
            EventKind::Combat,
            format!("{name} takes {} damage from {:?} ground", taken.amount, terrain),
        );
        if taken.killed {
            world.emit(EventKind::Combat, format!("{name} dies on {:?} ground", terrain));
        }
    }
    let alive = world.agent(id).is_some_and(|a| a.is_alive());
    if alive {
        match terrain {
            Terrain::Trap => {
                if let Some(agent) = world.agent_mut(id) {
                    agent.snared_turn = Some(turn);
                }
                world.emit(EventKind::System, format!("{name} is caught in a trap"));
            }
            Terrain::Teleport => {
                let target = world.grid().random_cell(rng);
                if let Some(agent) = world.agent_mut(id) {
                    agent.pos = target;
                }
                world.emit(
                    EventKind::System,
                    format!("{name} is flung to ({}, {})", target.x, target.y),
                );
            }
            _ => {}
        }
    }
    world.sync_carried(id);
    Ok(())
}

fn attack<R: Rng + ?Sized>(
    world: &mut World,
    id: AgentId,
    target: AgentId,
    ambush: bool,
    rng: &mut R,
    res: &mut Resolution,
) -> Outcome {
    if target == id {
        return Err(Degraded::InvalidTarget);
    }
    let dims = world.grid().dims();
    let attacker = world.agent(id).ok_or(Degraded::InvalidTarget)?;
    let victim = world.agent(target).ok_or(Degraded::InvalidTarget)?;
    if !victim.is_alive() {
        return Err(Degraded::TargetDead);
    }
    let range = if ambush { 1 } else { attacker.stats.attack_range };
    if dims.distance(attacker.pos, victim.pos) > range {
        return Err(Degraded::OutOfRange);
    }
    let cost = if ambush {
        AMBUSH_COST
    } else {
        attacker.stats.attack_cost
    };
    if attacker.stamina() < cost {
        return Err(Degraded::InsufficientStamina);
    }

    let knows_weakness = matches!(&attacker.role, Role::Protagonist(p) if p.knows_boss_weakness);
    let mut raw = attacker.stats.base_damage + attacker.weapon_bonus() + rng.roll(0, ROLL_MAX);
    if knows_weakness && victim.kind() == RoleKind::Boss {
        raw += WEAKNESS_BONUS;
    }
    let mut multiplier = attacker.damage_multiplier();
    if ambush {
        multiplier *= AMBUSH_MULTIPLIER;
    }
    let damage = (raw as f64 * multiplier).round() as i32;

    if let Some(agent) = world.agent_mut(id) {
        agent.spend_stamina(cost);
    }
    let strike = land_hit(world, id, target, damage, ambush, rng);
    res.strikes.extend(strike);
    Ok(())
}

/// Applies `damage` from `attacker` to `target`, reporting the outcome and
/// crediting the attacker's ledger.
fn land_hit<R: Rng + ?Sized>(
    world: &mut World,
    attacker: AgentId,
    target: AgentId,
    damage: i32,
    ambush: bool,
    rng: &mut R,
) -> Option<Strike> {
    let turn = world.clock();
    let (attacker_name, attacker_kind) = world.agent(attacker).map(|a| (a.name.clone(), a.kind()))?;
    let (target_name, target_kind, target_max) = world
        .agent(target)
        .map(|a| (a.name.clone(), a.kind(), a.max_health()))?;

    let taken = world.damage(target, damage);
    let ledger = world.ledger_mut(attacker);
    ledger.damage_dealt += taken.amount;

    let verb = if ambush { "ambushes" } else { "hits" };
    let left = world.agent(target).map_or(0, |a| a.health());
    world.emit(
        EventKind::Combat,
        format!("{attacker_name} {verb} {target_name} for {} ({left} left)", taken.amount),
    );

    let worthy = honour::is_worthy(target_kind, target_max);
    let mut trophy = None;
    if taken.killed {
        let ledger = world.ledger_mut(attacker);
        match target_kind {
            RoleKind::Wildlife => ledger.wildlife_kills += 1,
            RoleKind::Boss => ledger.boss_kills += 1,
            _ => {}
        }
        world.emit(EventKind::Combat, format!("{attacker_name} kills {target_name}"));
        if worthy && attacker_kind.takes_trophies() {
            trophy = honour::trophy_for(target_kind, &target_name, turn, rng);
        }
    }
    Some(Strike {
        target,
        target_kind,
        target_name,
        target_max_health: target_max,
        damage: taken.amount,
        killed: taken.killed,
        worthy,
        ambush,
        trophy,
    })
}

fn use_item(world: &mut World, id: AgentId) -> Outcome {
    let agent = world.agent_mut(id).ok_or(Degraded::InvalidTarget)?;
    let slot = agent
        .pack
        .iter()
        .position(|item| item.applies_to(agent))
        .ok_or(Degraded::NoUsableItem)?;
    let item = agent.pack.remove(slot);
    item.apply(agent);
    let name = agent.name.clone();
    world.emit(EventKind::Item, format!("{name} uses a {}", item.label()));
    Ok(())
}

fn heal_ally(world: &mut World, id: AgentId, target: AgentId, res: &mut Resolution) -> Outcome {
    let dims = world.grid().dims();
    let healer = world.agent(id).ok_or(Degraded::InvalidTarget)?;
    if healer.kind() != RoleKind::Synthetic {
        return Err(Degraded::NotPermitted);
    }
    if target == id {
        return Err(Degraded::InvalidTarget);
    }
    let patient = world.agent(target).ok_or(Degraded::InvalidTarget)?;
    if !patient.is_alive() {
        return Err(Degraded::TargetDead);
    }
    if dims.distance(healer.pos, patient.pos) > 1 {
        return Err(Degraded::OutOfRange);
    }
    if healer.stamina() < HEAL_ALLY_COST {
        return Err(Degraded::InsufficientStamina);
    }
    let healer_name = healer.name.clone();
    if let Some(agent) = world.agent_mut(id) {
        agent.spend_stamina(HEAL_ALLY_COST);
    }
    let (healed, patient_name) = match world.agent_mut(target) {
        Some(p) => (p.heal(HEAL_ALLY_AMOUNT), p.name.clone()),
        None => return Err(Degraded::InvalidTarget),
    };
    res.healed = healed;
    if healed > 0 {
        world.ledger_mut(id).healed_ally = true;
    }
    world.emit(
        EventKind::System,
        format!("{healer_name} patches up {patient_name} (+{healed})"),
    );
    Ok(())
}

fn earthquake<R: Rng + ?Sized>(
    world: &mut World,
    id: AgentId,
    rng: &mut R,
    res: &mut Resolution,
) -> Outcome {
    let dims = world.grid().dims();
    let boss = world.agent(id).ok_or(Degraded::InvalidTarget)?;
    let phase = boss.boss_phase().ok_or(Degraded::NotPermitted)?;
    if boss.stamina() < boss_rules::earthquake_cost() {
        return Err(Degraded::InsufficientStamina);
    }
    let radius = boss_rules::earthquake_radius(phase);
    let center = boss.pos;
    let multiplier = boss.damage_multiplier();
    let name = boss.name.clone();
    let targets: Vec<AgentId> = world
        .agents()
        .iter()
        .filter(|a| a.is_alive() && a.id != id)
        .filter(|a| !matches!(a.kind(), RoleKind::Boss | RoleKind::Wildlife))
        .filter(|a| dims.distance(center, a.pos) <= radius)
        .map(|a| a.id)
        .collect();

    if let Some(agent) = world.agent_mut(id) {
        agent.spend_stamina(boss_rules::earthquake_cost());
    }
    let label = if phase == BossPhase::Two { " violently" } else { "" };
    world.emit(EventKind::Combat, format!("{name} shakes the ground{label}"));
    for target in targets {
        let raw = EARTHQUAKE_DAMAGE + rng.roll(0, ROLL_MAX);
        let damage = (raw as f64 * multiplier).round() as i32;
        res.strikes.extend(land_hit(world, id, target, damage, false, rng));
    }
    Ok(())
}

fn regenerate(world: &mut World, id: AgentId, res: &mut Resolution) -> Outcome {
    let boss = world.agent_mut(id).ok_or(Degraded::InvalidTarget)?;
    if boss.kind() != RoleKind::Boss || boss.health() >= boss.max_health() {
        return Err(Degraded::NotPermitted);
    }
    if !boss.spend_stamina(boss_rules::regenerate_cost()) {
        return Err(Degraded::InsufficientStamina);
    }
    let healed = boss.heal(REGENERATE_AMOUNT);
    if let Role::Boss(state) = &mut boss.role {
        state.rage = (state.rage - REGENERATE_RAGE_RELIEF).max(0.0);
    }
    let name = boss.name.clone();
    res.healed = healed;
    world.emit(EventKind::Combat, format!("{name} regenerates (+{healed})"));
    Ok(())
}

fn issue_trial(world: &mut World, id: AgentId, kind: honour::TrialKind) -> Outcome {
    let weather = world.weather().kind;
    let dims = world.grid().dims();
    let elder = world.agent(id).ok_or(Degraded::InvalidTarget)?;
    if elder.kind() != RoleKind::Elder {
        return Err(Degraded::NotPermitted);
    }
    let protagonist = world
        .find_role(RoleKind::Protagonist)
        .and_then(|pid| world.agent(pid))
        .filter(|p| p.is_alive())
        .ok_or(Degraded::InvalidTarget)?;
    if dims.distance(elder.pos, protagonist.pos) > elder.sensor_radius(weather) {
        return Err(Degraded::OutOfRange);
    }
    if honour::issue_trial(world, id, kind) {
        Ok(())
    } else {
        Err(Degraded::NotPermitted)
    }
}

fn carry(world: &mut World, id: AgentId, target: AgentId) -> Outcome {
    let dims = world.grid().dims();
    let carrier = world.agent(id).ok_or(Degraded::InvalidTarget)?;
    if carrier.kind() != RoleKind::Protagonist || carrier.carrying.is_some() {
        return Err(Degraded::NotPermitted);
    }
    let load = world.agent(target).ok_or(Degraded::InvalidTarget)?;
    if load.kind() != RoleKind::Synthetic || load.carried_by.is_some() {
        return Err(Degraded::InvalidTarget);
    }
    if !load.is_alive() {
        return Err(Degraded::TargetDead);
    }
    if dims.distance(carrier.pos, load.pos) > 1 {
        return Err(Degraded::OutOfRange);
    }
    let (carrier_name, pos) = (carrier.name.clone(), carrier.pos);
    let load_name = load.name.clone();
    if let Some(agent) = world.agent_mut(id) {
        agent.carrying = Some(target);
    }
    if let Some(agent) = world.agent_mut(target) {
        agent.carried_by = Some(id);
        agent.pos = pos;
    }
    world.emit(EventKind::System, format!("{carrier_name} shoulders {load_name}"));
    Ok(())
}

fn drop_carried(world: &mut World, id: AgentId, target: AgentId) -> Outcome {
    let carrier = world.agent(id).ok_or(Degraded::InvalidTarget)?;
    if carrier.carrying != Some(target) {
        return Err(Degraded::InvalidTarget);
    }
    let carrier_name = carrier.name.clone();
    if let Some(agent) = world.agent_mut(id) {
        agent.carrying = None;
    }
    let load_name = match world.agent_mut(target) {
        Some(agent) => {
            agent.carried_by = None;
            agent.name.clone()
        }
        None => return Err(Degraded::InvalidTarget),
    };
    world.emit(EventKind::System, format!("{carrier_name} sets {load_name} down"));
    Ok(())
}

fn scan(world: &mut World, id: AgentId) -> Outcome {
    let turn = world.clock();
    let dims = world.grid().dims();
    let scanner = world.agent(id).ok_or(Degraded::InvalidTarget)?;
    if scanner.kind() != RoleKind::Synthetic {
        return Err(Degraded::NotPermitted);
    }
    if scanner.stamina() < SCAN_COST {
        return Err(Degraded::InsufficientStamina);
    }
    let hostiles = world
        .agents()
        .iter()
        .filter(|a| a.is_alive() && scanner.is_hostile_to(a))
        .filter(|a| dims.distance(scanner.pos, a.pos) <= SCAN_RADIUS)
        .count() as u32;
    let hazards = world
        .grid()
        .neighbors(scanner.pos, SCAN_RADIUS)
        .into_iter()
        .chain(std::iter::once(scanner.pos))
        .filter(|pos| world.grid().cell(*pos).is_hazardous())
        .count() as u32;
    let carrier = scanner.carried_by;
    let loyal = scanner.loyalty().unwrap_or(0) >= CARRIER_BOOST_LOYALTY;
    let name = scanner.name.clone();

    if let Some(agent) = world.agent_mut(id) {
        agent.spend_stamina(SCAN_COST);
    }
    world.coordination_mut().intel.last_scan = Some(ScanReport {
        turn,
        hostiles,
        hazards,
    });
    world.emit(
        EventKind::System,
        format!("{name} scans: {hostiles} hostiles, {hazards} hazards"),
    );
    if let Some(carrier) = carrier {
        if loyal && hazards > 0 {
            if let Some(agent) = world.agent_mut(carrier) {
                agent.restore_stamina(SCAN_REFRESH);
            }
        }
    }
    Ok(())
}

fn social(
    world: &mut World,
    id: AgentId,
    target: AgentId,
    intent: Intent,
    res: &mut Resolution,
) -> Outcome {
    let dims = world.grid().dims();
    let actor = world.agent(id).ok_or(Degraded::InvalidTarget)?;
    let other = world.agent(target).ok_or(Degraded::InvalidTarget)?;
    let synthetic = match (actor.kind(), other.kind()) {
        (RoleKind::Protagonist, RoleKind::Synthetic) => target,
        (RoleKind::Synthetic, RoleKind::Protagonist) => id,
        _ => return Err(Degraded::InvalidTarget),
    };
    if !other.is_alive() {
        return Err(Degraded::TargetDead);
    }
    if dims.distance(actor.pos, other.pos) > SOCIAL_RANGE {
        return Err(Degraded::OutOfRange);
    }
    let actor_kind = actor.kind();
    let names = (actor.name.clone(), other.name.clone());
    let loyalty = world
        .agent(synthetic)
        .and_then(|a| a.loyalty())
        .unwrap_or(0);

    let (success, delta, message) = match intent {
        Intent::RequestInfo { .. } => {
            if loyalty >= SHARE_LOYALTY {
                if actor_kind == RoleKind::Protagonist {
                    if let Some(Role::Protagonist(p)) = world.agent_mut(id).map(|a| &mut a.role) {
                        p.knows_boss_weakness = true;
                    }
                    world.coordination_mut().intel.boss_weakness = true;
                }
                (true, 1, format!("{} learns the boss's weakness from {}", names.0, names.1))
            } else {
                (false, 0, format!("{} refuses to answer {}", names.1, names.0))
            }
        }
        Intent::ShareInfo { .. } => {
            if loyalty >= SHARE_LOYALTY {
                (true, 2, format!("{} and {} compare notes", names.0, names.1))
            } else {
                (false, 0, format!("{} ignores {}", names.1, names.0))
            }
        }
        Intent::FormAlliance { .. } => {
            if loyalty >= ALLIANCE_LOYALTY {
                world.coordination_mut().alliance = true;
                (true, 5, format!("{} and {} fight as one", names.0, names.1))
            } else {
                (false, -2, format!("{} rebuffs {}", names.1, names.0))
            }
        }
        _ => return Err(Degraded::InvalidTarget),
    };
    if let Some(agent) = world.agent_mut(synthetic) {
        agent.adjust_loyalty(delta);
    }
    res.social = Some(success);
    world.emit(EventKind::System, message);
    Ok(())
}

/// Resolves item pickup on the agent's cell. Items with an immediate effect
/// are applied; otherwise the protagonist or the synthetic stashes them.
pub fn pickup(world: &mut World, id: AgentId) -> Option<Item> {
    let agent = world.agent(id).filter(|a| a.is_alive())?;
    if !Item::collectable_by(agent.kind()) {
        return None;
    }
    let pos = agent.pos;
    let item = world.grid().cell(pos).item?;
    let can_stash = matches!(agent.kind(), RoleKind::Protagonist | RoleKind::Synthetic)
        && agent.pack.len() < crate::agent::PACK_CAPACITY;
    let applies = item.applies_to(agent);
    if !applies && !can_stash {
        return None;
    }
    world.grid_mut().remove_item(pos);
    let agent = world.agent_mut(id)?;
    let verb = if applies {
        item.apply(agent);
        "uses"
    } else {
        agent.pack.push(item);
        "stashes"
    };
    let name = agent.name.clone();
    world.ledger_mut(id).items_collected += 1;
    world.emit(EventKind::Item, format!("{name} picks up and {verb} a {}", item.label()));
    Some(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentState;
    use crate::grid::{Dims, Grid, Hazard};
    use crate::strategy::{BucketConfig, LearningParams, Strategy};
    use crate::weather::{WeatherKind, WeatherState};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn world() -> World {
        World::new(Grid::filled(Dims::new(20, 20).unwrap(), Terrain::Empty))
    }

    fn add(world: &mut World, state: AgentState) -> AgentId {
        let strategy = Strategy::for_role(
            &state.role,
            LearningParams::protagonist(),
            BucketConfig::default(),
            false,
        );
        world.spawn(state, strategy)
    }

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(11)
    }

    #[test]
    fn attack_kills_and_takes_a_trophy() {
        let mut w = world();
        let dek = add(&mut w, AgentState::new("Dek", Pos::new(5, 5), Role::protagonist()));
        let beast = add(
            &mut w,
            AgentState::new("beast", Pos::new(6, 5), Role::wildlife(Pos::new(6, 5), 0.5)).with_health(10),
        );
        let res = resolve(&mut w, dek, Intent::Attack { target: beast }, &mut rng());
        assert!(res.degraded.is_none());
        let strike = &res.strikes[0];
        assert!(strike.killed && strike.worthy);
        assert!(strike.trophy.is_some());
        assert!(!w.agent(beast).unwrap().is_alive());
        assert_eq!(w.agent(dek).unwrap().stamina(), 85);
    }

    #[test]
    fn out_of_range_attacks_degrade_to_rest() {
        let mut w = world();
        let dek = add(&mut w, AgentState::new("Dek", Pos::new(5, 5), Role::protagonist()).with_stamina(50));
        let beast = add(&mut w, AgentState::new("beast", Pos::new(9, 5), Role::wildlife(Pos::new(9, 5), 0.5)));
        let res = resolve(&mut w, dek, Intent::Attack { target: beast }, &mut rng());
        assert_eq!(res.performed, Intent::Rest);
        assert_eq!(res.degraded, Some(Degraded::OutOfRange));
        assert_eq!(w.agent(dek).unwrap().stamina(), 70);
    }

    #[test]
    fn moves_wrap_and_pay_weather_costs() {
        let mut w = world();
        w.set_weather(WeatherState::new(WeatherKind::Sandstorm));
        let dek = add(&mut w, AgentState::new("Dek", Pos::new(19, 0), Role::protagonist()));
        let res = resolve(&mut w, dek, Intent::Move { dx: 1, dy: 0 }, &mut rng());
        assert!(res.moved);
        let dek = w.agent(dek).unwrap();
        assert_eq!(dek.pos, Pos::new(0, 0));
        assert_eq!(dek.stamina(), 98);
    }

    #[test]
    fn traps_snare_and_hurt() {
        let mut specs = vec![crate::grid::CellSpec::plain(Terrain::Empty); 400];
        specs[5 * 20 + 6] = crate::grid::CellSpec::plain(Terrain::Trap);
        let mut w = World::new(Grid::from_specs(Dims::new(20, 20).unwrap(), specs).unwrap());
        let dek = add(&mut w, AgentState::new("Dek", Pos::new(5, 5), Role::protagonist()));
        resolve(&mut w, dek, Intent::Move { dx: 1, dy: 0 }, &mut rng());
        assert_eq!(w.agent(dek).unwrap().health(), 105);
        let res = resolve(&mut w, dek, Intent::Move { dx: 1, dy: 0 }, &mut rng());
        assert_eq!(res.degraded, Some(Degraded::Snared));
    }

    #[test]
    fn hazard_markers_add_entry_damage() {
        let mut w = world();
        w.grid_mut().apply_hazard(Pos::new(6, 5), Some(Hazard { damage: 7 }));
        let dek = add(&mut w, AgentState::new("Dek", Pos::new(5, 5), Role::protagonist()));
        resolve(&mut w, dek, Intent::Move { dx: 1, dy: 0 }, &mut rng());
        assert_eq!(w.agent(dek).unwrap().health(), 113);
    }

    #[test]
    fn carried_synthetic_follows_and_cannot_walk() {
        let mut w = world();
        let dek = add(&mut w, AgentState::new("Dek", Pos::new(5, 5), Role::protagonist()));
        let thia = add(&mut w, AgentState::new("Thia", Pos::new(5, 6), Role::synthetic()));
        let res = resolve(&mut w, dek, Intent::Carry { target: thia }, &mut rng());
        assert!(res.degraded.is_none());
        resolve(&mut w, dek, Intent::Move { dx: 0, dy: -1 }, &mut rng());
        assert_eq!(w.agent(thia).unwrap().pos, Pos::new(5, 4));
        assert_eq!(w.agent(dek).unwrap().stamina(), 98);
        let res = resolve(&mut w, thia, Intent::Move { dx: 1, dy: 0 }, &mut rng());
        assert_eq!(res.degraded, Some(Degraded::Carried));
        resolve(&mut w, dek, Intent::Drop { target: thia }, &mut rng());
        assert!(w.agent(thia).unwrap().carried_by.is_none());
    }

    #[test]
    fn earthquake_spares_wildlife() {
        let mut w = world();
        let dek = add(&mut w, AgentState::new("Dek", Pos::new(5, 5), Role::protagonist()));
        let beast = add(&mut w, AgentState::new("beast", Pos::new(7, 7), Role::wildlife(Pos::new(7, 7), 0.5)));
        let boss = add(&mut w, AgentState::new("Adversary", Pos::new(6, 6), Role::boss(Pos::new(6, 6))));
        let res = resolve(&mut w, boss, Intent::Special(Special::Earthquake), &mut rng());
        assert_eq!(res.strikes.len(), 1);
        assert_eq!(res.strikes[0].target, dek);
        let hp = w.agent(dek).unwrap().health();
        assert!((120 - 17..=120 - 12).contains(&hp));
        assert_eq!(w.agent(beast).unwrap().health(), 50);
        assert_eq!(w.agent(boss).unwrap().stamina(), 270);
    }

    #[test]
    fn loyalty_gates_the_alliance() {
        let mut w = world();
        let dek = add(&mut w, AgentState::new("Dek", Pos::new(5, 5), Role::protagonist()));
        let thia = add(&mut w, AgentState::new("Thia", Pos::new(6, 5), Role::synthetic()));
        let res = resolve(&mut w, dek, Intent::FormAlliance { target: thia }, &mut rng());
        assert_eq!(res.social, Some(false));
        assert_eq!(w.agent(thia).unwrap().loyalty(), Some(28));
        let res = resolve(&mut w, dek, Intent::RequestInfo { target: thia }, &mut rng());
        assert_eq!(res.social, Some(true));
        assert!(w.coordination().intel.boss_weakness);
        w.agent_mut(thia).unwrap().adjust_loyalty(40);
        resolve(&mut w, thia, Intent::FormAlliance { target: dek }, &mut rng());
        assert!(w.coordination().alliance);
    }

    #[test]
    fn pickup_applies_or_stashes() {
        let mut w = world();
        let dek = add(&mut w, AgentState::new("Dek", Pos::new(5, 5), Role::protagonist()));
        w.grid_mut().place_item(Pos::new(5, 5), Item::Medkit { value: 20 });
        assert!(pickup(&mut w, dek).is_some());
        assert_eq!(w.agent(dek).unwrap().pack.len(), 1);
        w.agent_mut(dek).unwrap().set_health(90);
        let res = resolve(&mut w, dek, Intent::UseItem, &mut rng());
        assert!(res.degraded.is_none());
        assert_eq!(w.agent(dek).unwrap().health(), 110);
        assert!(w.grid().cell(Pos::new(5, 5)).item.is_none());
    }
}
