use anyhow::Result;

use crate::{
    engine::{System, SystemContext},
    honour,
    rng::SystemRng,
    world::World,
};

/// Ticks the protagonist's active trial and the elder's patience.
pub struct TrialSystem;

impl TrialSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TrialSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for TrialSystem {
    fn name(&self) -> &str {
        "trials"
    }

    fn run(
        &mut self,
        _ctx: &SystemContext,
        world: &mut World,
        _rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        honour::evaluate_trial(world);
        honour::age_opinion(world);
        Ok(())
    }
}
