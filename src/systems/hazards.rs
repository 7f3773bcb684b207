use anyhow::Result;

use crate::{
    engine::{System, SystemContext},
    events::EventKind,
    rng::SystemRng,
    world::World,
};

/// Global weather damage, applied after every action and pickup of the turn.
pub struct HazardSystem;

impl HazardSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HazardSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for HazardSystem {
    fn name(&self) -> &str {
        "hazards"
    }

    fn run(
        &mut self,
        _ctx: &SystemContext,
        world: &mut World,
        _rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        let weather = world.weather().kind;
        let damage = weather.damage();
        if damage <= 0 {
            return Ok(());
        }
        let exposed: Vec<_> = world
            .agents()
            .iter()
            .filter(|a| a.is_alive())
            .map(|a| (a.id, a.name.clone()))
            .collect();
        for (id, name) in exposed {
            if world.damage(id, damage).killed {
                world.emit(
                    EventKind::Combat,
                    format!("{name} succumbs to the {}", weather.label()),
                );
            }
        }
        Ok(())
    }
}
