use anyhow::Result;
use tracing::debug;

use crate::{
    coordination,
    engine::{System, SystemContext},
    events::EventKind,
    rng::SystemRng,
    world::World,
};

/// Recomputes the shared goal and roles before anyone decides.
pub struct CoordinationSystem;

impl CoordinationSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CoordinationSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for CoordinationSystem {
    fn name(&self) -> &str {
        "coordination"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        _rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        if !world.coordination_enabled() {
            return Ok(());
        }
        let plan = coordination::assess(world);
        let label = plan.as_ref().map(|p| p.goal.label());
        if world.set_plan(plan) {
            if let Some(label) = label {
                debug!(turn = ctx.turn, goal = label, "shared goal changed");
                world.emit(EventKind::System, format!("Shared goal is now {label}"));
            }
        }
        Ok(())
    }
}
