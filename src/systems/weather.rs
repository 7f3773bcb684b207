use anyhow::Result;
use tracing::info;

use crate::{
    engine::{System, SystemContext},
    events::EventKind,
    rng::SystemRng,
    world::World,
};

/// Rolls the per-turn weather transition.
pub struct WeatherSystem;

impl WeatherSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WeatherSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl System for WeatherSystem {
    fn name(&self) -> &str {
        "weather"
    }

    fn run(
        &mut self,
        ctx: &SystemContext,
        world: &mut World,
        rng: &mut SystemRng<'_>,
    ) -> Result<()> {
        let table = world.weather_table;
        let mut weather = world.weather;
        let changed = weather.step(&table, rng);
        world.set_weather(weather);
        if let Some(kind) = changed {
            info!(turn = ctx.turn, weather = kind.label(), "weather changed");
            world.emit(
                EventKind::Weather,
                format!("The weather turns to {}", kind.label()),
            );
        }
        Ok(())
    }
}
