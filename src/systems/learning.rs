use anyhow::Result;
use tracing::debug;

use crate::{
    agent::{AgentId, RoleKind},
    engine::{System, SystemContext},
    rng::SystemRng,
    strategy::{reward_for, Observation, RewardInputs},
    world::World,
};

/// Feeds each learner the reward for the action it chose this turn.
pub struct LearningSystem;

impl LearningSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LearningSystem {
    fn default() -> Self {
        Self::new()
    }
}

fn partner_of(world: &World, kind: RoleKind) -> Option<AgentId> {
    match kind {
        RoleKind::Protagonist => world.find_role(RoleKind::Synthetic),
        RoleKind::Synthetic => world.find_role(RoleKind::Protagonist),
        _ => None,
    }
}

fn inputs_for(world: &World, id: AgentId) -> Option<RewardInputs> {
    let agent = world.agent(id)?;
    let ledger = world.ledger(id).cloned().unwrap_or_default();
    let ally_died = partner_of(world, agent.kind())
        .and_then(|ally| world.ledger(ally))
        .is_some_and(|l| l.died);
    let dims = world.grid().dims();
    let enemy_adjacent = world
        .agents()
        .iter()
        .any(|o| o.is_alive() && agent.is_hostile_to(o) && dims.distance(agent.pos, o.pos) <= 1);
    let action = world
        .policy(id)
        .and_then(|p| p.learner())
        .and_then(|l| l.pending())
        .map(|(_, action)| action);

    Some(RewardInputs {
        action,
        died: ledger.died,
        ally_died,
        health_fraction_before: ledger.health_fraction_before,
        health_fraction: agent.health_fraction(),
        damage_dealt: ledger.damage_dealt,
        damage_taken: ledger.damage_taken,
        wildlife_kills: ledger.wildlife_kills,
        boss_kills: ledger.boss_kills,
        healed_ally: ledger.healed_ally,
        items_collected: ledger.items_collected,
        honour_gained: ledger.honour_delta,
        served_goal: ledger.served_goal,
        enemy_adjacent,
    })
}

impl System for LearningSystem {
    fn name(&self) -> &str {
        "learning"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        _rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        let learners: Vec<AgentId> = world
            .agents()
            .iter()
            .filter(|a| world.policy(a.id).is_some_and(|p| p.learner().is_some()))
            .map(|a| a.id)
            .collect();

        for id in learners {
            let Some(inputs) = inputs_for(world, id) else {
                continue;
            };
            let alive = world.agent(id).is_some_and(|a| a.is_alive());
            if !alive && !inputs.died {
                if let Some(learner) = world.policy_mut(id).and_then(|p| p.learner_mut()) {
                    learner.forget();
                }
                continue;
            }

            let reward = reward_for(&inputs);
            let next = match (Observation::build(world, id), world.policy(id).and_then(|p| p.learner())) {
                (Some(obs), Some(learner)) if alive => Some(learner.discretize(&obs)),
                // A death ends the episode; bootstrap from the state it was in.
                (_, Some(learner)) => learner.pending().map(|(state, _)| state),
                _ => None,
            };
            let Some(next) = next else {
                continue;
            };
            if let Some(learner) = world.policy_mut(id).and_then(|p| p.learner_mut()) {
                if learner.learn(reward, next) {
                    debug!(
                        turn = ctx.turn,
                        agent = id.raw(),
                        reward,
                        epsilon = learner.epsilon(),
                        "q-value updated"
                    );
                }
            }
        }
        Ok(())
    }
}
