//! Engine - the thread-safe boundary around one scheduler

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::config::SimConfig;
use crate::graph::WorldGraph;
use crate::log::{Message, MessageLog};
use crate::scenario::ScenarioKind;
use crate::scheduler::{CycleError, CycleResult, Scheduler};
use crate::units::UnitPosition;
use crate::world::{check_intensity, Allocation, TriggerError, World, WorldSnapshot};

pub struct EngineBuilder {
    config: SimConfig,
    graph: Option<WorldGraph>,
}

impl EngineBuilder {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            graph: None,
        }
    }

    /// Use an already loaded map instead of the one named in the config.
    pub fn with_graph(mut self, graph: WorldGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.random_seed = seed;
        self
    }

    pub fn build(self) -> Result<Engine> {
        let graph = match self.graph {
            Some(graph) => graph,
            None => self.config.load_graph()?,
        };
        info!(
            name = %self.config.name,
            map = graph.name(),
            nodes = graph.nodes().len(),
            edges = graph.edges().len(),
            seed = self.config.random_seed,
            "engine ready"
        );
        let scheduler = Scheduler::new(
            World::new(graph, self.config.world.clone()),
            MessageLog::new(self.config.message_retention),
            &self.config.agents,
            self.config.random_seed,
            self.config.scheduler.clone(),
        );
        Ok(Engine {
            name: Arc::from(self.config.name.as_str()),
            scheduler: Arc::new(Mutex::new(scheduler)),
            cycle_gate: Arc::new(Mutex::new(())),
        })
    }
}

/// Cheap to clone; every clone drives the same simulation.
///
/// The scheduler lock is held for one step at a time (one agent, one snapshot), while
/// the cycle gate keeps whole cycles, triggers and resets from overlapping.
#[derive(Clone)]
pub struct Engine {
    name: Arc<str>,
    scheduler: Arc<Mutex<Scheduler>>,
    cycle_gate: Arc<Mutex<()>>,
}

impl Engine {
    pub fn from_config(config: &SimConfig) -> Result<Self> {
        EngineBuilder::new(config.clone()).build()
    }

    fn lock(&self) -> MutexGuard<'_, Scheduler> {
        self.scheduler.lock().expect("scheduler lock poisoned")
    }

    fn gate(&self) -> MutexGuard<'_, ()> {
        self.cycle_gate.lock().expect("cycle gate lock poisoned")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Starts a disaster by name. A running simulation is reset first.
    pub fn trigger_disaster(
        &self,
        scenario: &str,
        intensity: f64,
        overrides: Option<Allocation>,
    ) -> Result<(), TriggerError> {
        let kind: ScenarioKind = scenario.parse()?;
        check_intensity(intensity)?;

        let _gate = self.gate();
        self.lock().trigger_disaster(kind, intensity, overrides.as_ref())?;
        info!(scenario = %kind, intensity, "disaster triggered");
        Ok(())
    }

    pub fn run_cycle(&self) -> Result<CycleResult, CycleError> {
        let _gate = self.gate();
        let started = self.lock().begin_cycle()?;
        let Some(active) = started else {
            return Ok(self.lock().paused_result());
        };
        for kind in active {
            self.lock().run_agent(kind)?;
        }
        self.lock().finish_cycle()
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        self.lock().snapshot()
    }

    pub fn reset(&self) {
        let _gate = self.gate();
        self.lock().reset();
    }

    /// Takes effect at the next cycle boundary.
    pub fn pause(&self) -> bool {
        self.lock().pause()
    }

    pub fn resume(&self) -> bool {
        self.lock().resume()
    }

    pub fn is_paused(&self) -> bool {
        self.lock().is_paused()
    }

    pub fn read_messages(&self, consumer: &str, clear: bool) -> Vec<Message> {
        self.lock().log_mut().read_all(consumer, clear)
    }

    pub fn read_recent(&self, count: usize) -> Vec<Message> {
        self.lock().log().read_recent(count)
    }

    pub fn unit_positions(&self) -> Vec<UnitPosition> {
        self.lock().unit_positions()
    }

    pub fn cycle_count(&self) -> u64 {
        self.lock().cycle_count()
    }

    pub fn average_cycle_time(&self) -> Option<Duration> {
        self.lock().average_cycle_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        EngineBuilder::new(SimConfig::karachi())
            .with_seed(11)
            .build()
            .unwrap()
    }

    #[test]
    fn rejected_trigger_leaves_state_alone() {
        let engine = engine();
        engine.trigger_disaster("flood", 0.4, None).unwrap();
        engine.run_cycle().unwrap();
        let before = engine.snapshot();

        assert_eq!(
            engine.trigger_disaster("tsunami", 0.5, None),
            Err(TriggerError::InvalidScenario("tsunami".to_string()))
        );
        assert_eq!(
            engine.trigger_disaster("flood", 1.5, None),
            Err(TriggerError::InvalidIntensity(1.5))
        );
        let after = engine.snapshot();
        assert_eq!(after.time_step, before.time_step);
        assert_eq!(after.victims, before.victims);
        assert_eq!(engine.cycle_count(), 1);
    }

    #[test]
    fn trigger_on_running_world_starts_over() {
        let engine = engine();
        engine.trigger_disaster("earthquake", 0.8, None).unwrap();
        engine.run_cycle().unwrap();
        engine.run_cycle().unwrap();

        engine.trigger_disaster("wildfire", 0.3, None).unwrap();
        let snapshot = engine.snapshot();
        assert_eq!(snapshot.scenario, Some(ScenarioKind::Wildfire));
        assert_eq!(snapshot.episode, 1);
        assert_eq!(engine.cycle_count(), 0);
    }

    #[test]
    fn overrides_replace_sampled_stock() {
        let engine = engine();
        let overrides = Allocation::from([(crate::world::ResourceKind::Ambulance, 12)]);
        engine
            .trigger_disaster("earthquake", 0.5, Some(overrides))
            .unwrap();
        let snapshot = engine.snapshot();
        assert_eq!(
            snapshot.resources[&crate::world::ResourceKind::Ambulance],
            12
        );
    }

    #[test]
    fn consumers_read_independently() {
        let engine = engine();
        engine.trigger_disaster("earthquake", 0.9, None).unwrap();
        engine.run_cycle().unwrap();

        let first = engine.read_messages("ui", false);
        assert!(!first.is_empty());
        assert!(engine.read_messages("ui", false).is_empty());
        assert_eq!(engine.read_messages("audit", false).len(), first.len());
        assert_eq!(engine.read_recent(2).len(), 2);
    }

    #[test]
    fn clones_share_one_simulation() {
        let engine = engine();
        let other = engine.clone();
        engine.trigger_disaster("flood", 0.6, None).unwrap();
        other.run_cycle().unwrap();
        assert_eq!(engine.cycle_count(), 1);
        assert!(other.pause());
        assert!(engine.run_cycle().unwrap().paused);
    }
}
