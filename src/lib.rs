pub mod agents;
pub mod config;
pub mod engine;
pub mod graph;
pub mod log;
pub mod rng;
pub mod scenario;
pub mod scheduler;
pub mod units;
pub mod web;
pub mod world;

pub use config::SimConfig;
pub use engine::{Engine, EngineBuilder};
pub use scenario::ScenarioKind;
pub use scheduler::{CycleError, CycleResult};
pub use world::{Phase, TriggerError, WorldSnapshot};
