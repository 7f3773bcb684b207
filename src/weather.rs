use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::rng::RngExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherKind {
    Calm,
    Sandstorm,
    AcidRain,
    ElectricalStorm,
}

impl WeatherKind {
    /// Damage dealt to every living agent at the end of a turn.
    pub fn damage(self) -> i32 {
        match self {
            WeatherKind::Calm => 0,
            WeatherKind::Sandstorm => 2,
            WeatherKind::AcidRain => 5,
            WeatherKind::ElectricalStorm => 3,
        }
    }

    pub fn move_multiplier(self) -> f64 {
        match self {
            WeatherKind::Calm => 1.0,
            WeatherKind::Sandstorm => 1.3,
            WeatherKind::AcidRain => 1.1,
            WeatherKind::ElectricalStorm => 1.2,
        }
    }

    pub fn visibility_penalty(self) -> i32 {
        match self {
            WeatherKind::Sandstorm => 2,
            WeatherKind::ElectricalStorm => 1,
            _ => 0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            WeatherKind::Calm => "calm",
            WeatherKind::Sandstorm => "sandstorm",
            WeatherKind::AcidRain => "acid rain",
            WeatherKind::ElectricalStorm => "electrical storm",
        }
    }
}

fn default_transition_chance() -> f64 {
    0.10
}

fn default_calm_weight() -> f64 {
    0.5
}

fn default_initial() -> WeatherKind {
    WeatherKind::Calm
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct WeatherTable {
    #[serde(default = "default_transition_chance")]
    pub transition_chance: f64,
    /// Probability that a transition lands on Calm; the rest is split evenly.
    #[serde(default = "default_calm_weight")]
    pub calm_weight: f64,
    #[serde(default = "default_initial")]
    pub initial: WeatherKind,
}

impl Default for WeatherTable {
    fn default() -> Self {
        Self {
            transition_chance: default_transition_chance(),
            calm_weight: default_calm_weight(),
            initial: default_initial(),
        }
    }
}

impl WeatherTable {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, p) in [
            ("transition_chance", self.transition_chance),
            ("calm_weight", self.calm_weight),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(ConfigError::InvalidWeather(format!(
                    "{name} must be within [0, 1], got {p}"
                )));
            }
        }
        Ok(())
    }

    fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> WeatherKind {
        if rng.gen::<f64>() < self.calm_weight {
            return WeatherKind::Calm;
        }
        match rng.gen_range(0..3) {
            0 => WeatherKind::Sandstorm,
            1 => WeatherKind::AcidRain,
            _ => WeatherKind::ElectricalStorm,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherState {
    pub kind: WeatherKind,
    pub turns_in_state: u32,
}

impl WeatherState {
    pub fn new(kind: WeatherKind) -> Self {
        Self {
            kind,
            turns_in_state: 0,
        }
    }

    /// Rolls the per-turn transition. Returns the new kind only when it
    /// actually changed.
    pub fn step<R: Rng + ?Sized>(&mut self, table: &WeatherTable, rng: &mut R) -> Option<WeatherKind> {
        self.turns_in_state += 1;
        if !rng.chance(table.transition_chance) {
            return None;
        }
        let next = table.draw(rng);
        if next == self.kind {
            return None;
        }
        self.kind = next;
        self.turns_in_state = 0;
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn damage_table_matches_kinds() {
        assert_eq!(WeatherKind::Calm.damage(), 0);
        assert_eq!(WeatherKind::Sandstorm.damage(), 2);
        assert_eq!(WeatherKind::AcidRain.damage(), 5);
        assert_eq!(WeatherKind::ElectricalStorm.damage(), 3);
    }

    #[test]
    fn zero_chance_never_transitions() {
        let table = WeatherTable {
            transition_chance: 0.0,
            ..WeatherTable::default()
        };
        let mut state = WeatherState::new(WeatherKind::Sandstorm);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..100 {
            assert_eq!(state.step(&table, &mut rng), None);
        }
        assert_eq!(state.turns_in_state, 100);
    }

    #[test]
    fn transitions_favour_calm() {
        let table = WeatherTable {
            transition_chance: 1.0,
            ..WeatherTable::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let calm = (0..2000)
            .filter(|_| table.draw(&mut rng) == WeatherKind::Calm)
            .count();
        assert!((850..1150).contains(&calm), "calm drawn {calm} times");
    }

    #[test]
    fn out_of_range_probabilities_are_rejected() {
        let table = WeatherTable {
            calm_weight: 1.5,
            ..WeatherTable::default()
        };
        assert!(table.validate().is_err());
    }
}
