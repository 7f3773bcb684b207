//! Pickups scattered across the badlands.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::agent::{AgentState, Role, RoleKind};
use crate::rng::RngExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponKind {
    NetGun,
    PlasmaCaster,
    Combistick,
}

impl WeaponKind {
    pub const ALL: [WeaponKind; 3] = [
        WeaponKind::NetGun,
        WeaponKind::PlasmaCaster,
        WeaponKind::Combistick,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Item {
    Medkit { value: i32 },
    EnergyPack { value: i32 },
    RepairKit { value: i32 },
    Weapon { weapon: WeaponKind },
}

impl Item {
    pub fn label(&self) -> &'static str {
        match self {
            Item::Medkit { .. } => "medkit",
            Item::EnergyPack { .. } => "energy pack",
            Item::RepairKit { .. } => "repair kit",
            Item::Weapon { .. } => "weapon",
        }
    }

    /// Whether applying the item to `agent` right now would change anything.
    pub fn applies_to(&self, agent: &AgentState) -> bool {
        if !agent.is_alive() {
            return false;
        }
        match (self, &agent.role) {
            (Item::Medkit { .. }, _) => agent.health() < agent.max_health(),
            (Item::EnergyPack { .. }, _) => agent.stamina() < agent.max_stamina(),
            (Item::RepairKit { .. }, Role::Synthetic(synth)) => {
                synth.damage_level > 0.0 || agent.health() < agent.max_health()
            }
            (Item::RepairKit { .. }, _) => false,
            (Item::Weapon { weapon }, Role::Protagonist(p)) => !p.weapons.contains(weapon),
            (Item::Weapon { .. }, _) => false,
        }
    }

    /// Applies the effect, returning false (and leaving the agent untouched)
    /// when the item does not apply.
    pub fn apply(&self, agent: &mut AgentState) -> bool {
        if !self.applies_to(agent) {
            return false;
        }
        match *self {
            Item::Medkit { value } => {
                agent.heal(value);
            }
            Item::EnergyPack { value } => {
                agent.restore_stamina(value);
            }
            Item::RepairKit { value } => {
                if let Role::Synthetic(synth) = &mut agent.role {
                    synth.damage_level = (synth.damage_level - value as f64).max(0.0);
                }
                agent.heal(value / 2);
            }
            Item::Weapon { weapon } => {
                if let Role::Protagonist(p) = &mut agent.role {
                    p.weapons.push(weapon);
                }
            }
        }
        true
    }

    /// Only hunters and the synthetic bother with pickups.
    pub fn collectable_by(kind: RoleKind) -> bool {
        matches!(
            kind,
            RoleKind::Protagonist | RoleKind::Synthetic | RoleKind::Elder | RoleKind::Rival
        )
    }
}

/// Draws a pickup with the badlands loot table.
pub fn random_item<R: Rng + ?Sized>(rng: &mut R) -> Item {
    let roll: f64 = rng.gen();
    if roll < 0.35 {
        Item::Medkit {
            value: rng.roll(15, 35),
        }
    } else if roll < 0.70 {
        Item::EnergyPack {
            value: rng.roll(20, 40),
        }
    } else if roll < 0.90 {
        Item::RepairKit {
            value: rng.roll(15, 30),
        }
    } else {
        let weapon = WeaponKind::ALL[rng.gen_range(0..WeaponKind::ALL.len())];
        Item::Weapon { weapon }
    }
}
