use anyhow::Result;
use tracing::trace;

use crate::{
    coordination,
    engine::{System, SystemContext},
    honour, resolver,
    rng::SystemRng,
    strategy::{Intent, Observation},
    world::World,
};

/// Asks every living agent for an intent, in priority order, and applies it
/// before the next agent looks at the world.
pub struct ActionSystem;

impl ActionSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ActionSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for ActionSystem {
    fn name(&self) -> &str {
        "actions"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        for id in world.priority_order() {
            // Earlier agents may have killed this one already.
            let Some(obs) = Observation::build(world, id).filter(|o| o.me.is_alive()) else {
                continue;
            };
            let intent = world
                .policy_mut(id)
                .map_or(Intent::Rest, |policy| policy.decide(&obs, rng));

            let res = resolver::resolve(world, id, intent, rng);
            if let Some(reason) = res.degraded {
                trace!(turn = ctx.turn, agent = id.raw(), ?intent, ?reason, "intent degraded");
            }
            honour::judge(world, &res);
            resolver::pickup(world, id);

            let plan = world.coordination().plan.clone();
            if let Some(plan) = plan {
                if coordination::served_goal(world, &res, &plan) {
                    world.ledger_mut(id).served_goal = true;
                    world.coordination_mut().score.goal_actions += 1;
                }
            }
        }
        Ok(())
    }
}
