mod actions;
mod coordination;
mod hazards;
mod learning;
mod trials;
mod weather;

pub use actions::ActionSystem;
pub use coordination::CoordinationSystem;
pub use hazards::HazardSystem;
pub use learning::LearningSystem;
pub use trials::TrialSystem;
pub use weather::WeatherSystem;
