pub mod advanced_health;
pub mod cycles;
pub mod stats;
