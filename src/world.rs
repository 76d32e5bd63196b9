//! World state machine - phase, disaster, victims, resources and road damage

mod resources;

use std::{collections::BTreeSet, fmt};

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::{Edge, EdgeKind, Node, NodeId, WorldGraph};
use crate::scenario::{AffectedArea, ScenarioKind};

pub use resources::{baseline_allocation, Allocation, ResourceKind, ResourceLedger};

/// Lowest and highest accepted disaster intensity.
pub const INTENSITY_RANGE: (f64, f64) = (0.1, 1.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Response,
    Rebuild,
    Recovered,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Response => "response",
            Phase::Rebuild => "rebuild",
            Phase::Recovered => "recovered",
        }
    }

    /// Whether a cycle may move the world from `self` to `next`.
    pub fn can_become(self, next: Phase) -> bool {
        self == next
            || matches!(
                (self, next),
                (Phase::Idle, Phase::Response)
                    | (Phase::Response, Phase::Rebuild)
                    | (Phase::Rebuild, Phase::Recovered)
                    | (Phase::Recovered, Phase::Response)
            )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TriggerError {
    #[error("unknown scenario '{0}' (expected earthquake, flood or wildfire)")]
    InvalidScenario(String),
    #[error("intensity {0} outside [0.1, 1.0]")]
    InvalidIntensity(f64),
}

/// Rejects intensities outside `INTENSITY_RANGE`, NaN included.
pub fn check_intensity(intensity: f64) -> Result<(), TriggerError> {
    let (low, high) = INTENSITY_RANGE;
    if (low..=high).contains(&intensity) {
        Ok(())
    } else {
        Err(TriggerError::InvalidIntensity(intensity))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvariantViolation {
    #[error("{kind} stock {available} exceeds initial allocation {initial}")]
    ResourceOverflow {
        kind: ResourceKind,
        available: u32,
        initial: u32,
    },
    #[error("rebuild progress {0} outside [0, 100]")]
    ProgressOutOfRange(f64),
    #[error("seismic level {0} outside [0, 1]")]
    SeismicOutOfRange(f64),
    #[error("victims saved dropped from {before} to {after}")]
    SavedDecreased { before: u64, after: u64 },
    #[error("illegal phase transition {from} -> {to}")]
    IllegalTransition { from: Phase, to: Phase },
}

fn default_victim_rate() -> f64 {
    0.01
}

fn default_min_victims() -> u64 {
    10
}

fn default_seismic_decay() -> f64 {
    0.05
}

fn default_aftershock_factor() -> f64 {
    0.3
}

fn default_aftershock_victims() -> f64 {
    10.0
}

fn default_aftershock_reblock() -> f64 {
    0.1
}

fn default_rebuild_per_crew() -> f64 {
    2.0
}

fn default_rebuild_per_drone() -> f64 {
    0.15
}

fn default_rebuild_required() -> f64 {
    100.0
}

fn default_crew_fatigue_chance() -> f64 {
    0.15
}

fn default_cooldown_min() -> u32 {
    2
}

fn default_cooldown_max() -> u32 {
    6
}

/// Tunable constants of the disaster model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldParams {
    /// Share of an affected node's population that becomes victims at intensity 1.
    #[serde(default = "default_victim_rate")]
    pub victim_rate: f64,
    #[serde(default = "default_min_victims")]
    pub min_victims: u64,
    #[serde(default = "default_seismic_decay")]
    pub seismic_decay: f64,
    #[serde(default = "default_aftershock_factor")]
    pub aftershock_factor: f64,
    /// Upper bound of new victims per aftershock at seismic level 0.5.
    #[serde(default = "default_aftershock_victims")]
    pub aftershock_victims: f64,
    #[serde(default = "default_aftershock_reblock")]
    pub aftershock_reblock: f64,
    #[serde(default = "default_rebuild_per_crew")]
    pub rebuild_per_crew: f64,
    #[serde(default = "default_rebuild_per_drone")]
    pub rebuild_per_drone: f64,
    #[serde(default = "default_rebuild_required")]
    pub rebuild_required: f64,
    #[serde(default = "default_crew_fatigue_chance")]
    pub crew_fatigue_chance: f64,
    #[serde(default = "default_cooldown_min")]
    pub cooldown_min: u32,
    #[serde(default = "default_cooldown_max")]
    pub cooldown_max: u32,
}

impl Default for WorldParams {
    fn default() -> Self {
        Self {
            victim_rate: default_victim_rate(),
            min_victims: default_min_victims(),
            seismic_decay: default_seismic_decay(),
            aftershock_factor: default_aftershock_factor(),
            aftershock_victims: default_aftershock_victims(),
            aftershock_reblock: default_aftershock_reblock(),
            rebuild_per_crew: default_rebuild_per_crew(),
            rebuild_per_drone: default_rebuild_per_drone(),
            rebuild_required: default_rebuild_required(),
            crew_fatigue_chance: default_crew_fatigue_chance(),
            cooldown_min: default_cooldown_min(),
            cooldown_max: default_cooldown_max(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldStats {
    pub total_victims_initial: u64,
    /// Victims added by aftershocks during the current episode.
    pub secondary_victims: u64,
    /// Saved across every episode since the last reset.
    pub total_victims_saved: u64,
    pub disasters_completed: u64,
    pub total_time_steps: u64,
}

/// What one `update` call did, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepReport {
    pub aftershock: bool,
    pub new_victims: u64,
    pub edges_blocked: usize,
    pub edges_cleared: usize,
    pub crew_fatigued: bool,
    pub auto_triggered: Option<(ScenarioKind, f64)>,
}

/// Deep, serialisable copy of the world handed to agents and clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub phase: Phase,
    pub scenario: Option<ScenarioKind>,
    pub episode: u64,
    pub time_step: u64,
    pub intensity: f64,
    pub seismic_level: f64,
    pub aftershock: bool,
    pub victims: u64,
    pub victims_saved: u64,
    pub rebuild_progress: f64,
    pub cooldown: u32,
    pub roads_blocked: bool,
    pub resources: Allocation,
    pub initial_resources: Allocation,
    pub resources_used: Allocation,
    pub command_center: NodeId,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub affected_nodes: Vec<NodeId>,
    pub isolated_nodes: Vec<NodeId>,
    pub stats: WorldStats,
}

pub struct World {
    graph: WorldGraph,
    params: WorldParams,
    phase: Phase,
    scenario: Option<ScenarioKind>,
    intensity: f64,
    seismic_level: f64,
    aftershock: bool,
    victims: u64,
    victims_saved: u64,
    rebuild_progress: f64,
    resources: ResourceLedger,
    affected: BTreeSet<NodeId>,
    blocked_at_rebuild_start: usize,
    cooldown: u32,
    time_step: u64,
    episode: u64,
    stats: WorldStats,
}

impl World {
    pub fn new(graph: WorldGraph, params: WorldParams) -> Self {
        let mut world = Self {
            graph,
            params,
            phase: Phase::Idle,
            scenario: None,
            intensity: 0.0,
            seismic_level: 0.0,
            aftershock: false,
            victims: 0,
            victims_saved: 0,
            rebuild_progress: 0.0,
            resources: ResourceLedger::default(),
            affected: BTreeSet::new(),
            blocked_at_rebuild_start: 0,
            cooldown: 0,
            time_step: 0,
            episode: 0,
            stats: WorldStats::default(),
        };
        world.reset();
        world
    }

    pub fn graph(&self) -> &WorldGraph {
        &self.graph
    }

    pub fn params(&self) -> &WorldParams {
        &self.params
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn scenario(&self) -> Option<ScenarioKind> {
        self.scenario
    }

    pub fn seismic_level(&self) -> f64 {
        self.seismic_level
    }

    pub fn aftershock(&self) -> bool {
        self.aftershock
    }

    pub fn victims(&self) -> u64 {
        self.victims
    }

    pub fn victims_saved(&self) -> u64 {
        self.victims_saved
    }

    pub fn rebuild_progress(&self) -> f64 {
        self.rebuild_progress
    }

    pub fn resources(&self) -> &ResourceLedger {
        &self.resources
    }

    pub fn available(&self, kind: ResourceKind) -> u32 {
        self.resources.available(kind)
    }

    pub fn affected(&self) -> &BTreeSet<NodeId> {
        &self.affected
    }

    pub fn cooldown(&self) -> u32 {
        self.cooldown
    }

    pub fn time_step(&self) -> u64 {
        self.time_step
    }

    /// Incremented on every trigger; agents use it to drop per-disaster state.
    pub fn episode(&self) -> u64 {
        self.episode
    }

    pub fn stats(&self) -> &WorldStats {
        &self.stats
    }

    /// Starts a disaster. Rejected triggers leave the world untouched.
    pub fn trigger_disaster<R: Rng + ?Sized>(
        &mut self,
        scenario: ScenarioKind,
        intensity: f64,
        overrides: Option<&Allocation>,
        rng: &mut R,
    ) -> Result<(), TriggerError> {
        check_intensity(intensity)?;
        self.start_disaster(scenario, intensity, overrides, rng);
        Ok(())
    }

    fn start_disaster<R: Rng + ?Sized>(
        &mut self,
        scenario: ScenarioKind,
        intensity: f64,
        overrides: Option<&Allocation>,
        rng: &mut R,
    ) {
        let profile = scenario.profile();

        self.phase = Phase::Response;
        self.scenario = Some(scenario);
        self.intensity = intensity;
        self.seismic_level = intensity;
        self.aftershock = false;
        self.rebuild_progress = 0.0;
        self.blocked_at_rebuild_start = 0;
        self.cooldown = 0;
        self.time_step = 0;
        self.victims_saved = 0;
        self.episode += 1;
        self.stats.secondary_victims = 0;

        self.affected = match profile.area {
            AffectedArea::Everywhere => self.graph.node_ids().collect(),
            AffectedArea::Hotspots { ids, spread_chance } => self
                .graph
                .node_ids()
                .filter(|id| ids.contains(&id.0) || rng.gen::<f64>() < spread_chance)
                .collect(),
        };

        self.graph.unblock_all();
        for index in self.graph.edges_touching(&self.affected) {
            let base = match self.graph.edges()[index].kind {
                EdgeKind::Road => profile.road_block_chance,
                EdgeKind::Highway => profile.highway_block_chance,
            };
            if rng.gen::<f64>() < base * intensity {
                self.graph.set_blocked(index, true);
            }
        }

        let raw: u64 = self
            .affected
            .iter()
            .filter_map(|id| self.graph.node(*id))
            .map(|node| {
                let exposure = node.population as f64
                    * self.params.victim_rate
                    * intensity
                    * node.vulnerability(scenario);
                exposure.round() as u64
            })
            .sum();
        self.victims = raw.max(self.params.min_victims);
        self.stats.total_victims_initial = self.victims;

        // Missing override kinds fall back to the scenario range.
        let mut allocation = profile.sample_resources(rng);
        if let Some(overrides) = overrides {
            for (kind, amount) in overrides {
                allocation.insert(*kind, *amount);
            }
        }
        self.resources = ResourceLedger::new(allocation);

        tracing::info!(
            scenario = %scenario,
            intensity,
            victims = self.victims,
            affected = self.affected.len(),
            blocked = self.graph.blocked_count(),
            "disaster triggered"
        );
    }

    /// Advances one step of the current phase.
    pub fn update<R: Rng + ?Sized>(&mut self, rng: &mut R) -> StepReport {
        let mut report = StepReport::default();
        if self.phase == Phase::Idle {
            return report;
        }
        self.time_step += 1;
        self.stats.total_time_steps += 1;

        match self.phase {
            Phase::Idle => {}
            Phase::Response => self.step_response(rng, &mut report),
            Phase::Rebuild => self.step_rebuild(rng, &mut report),
            Phase::Recovered => self.step_recovered(rng, &mut report),
        }
        report
    }

    fn step_response<R: Rng + ?Sized>(&mut self, rng: &mut R, report: &mut StepReport) {
        self.seismic_level = (self.seismic_level - self.params.seismic_decay).max(0.0);
        let agitation = 0.5 + self.seismic_level;

        self.aftershock = rng.gen::<f64>() < self.params.aftershock_factor * agitation;
        if self.aftershock {
            let ceiling = (self.params.aftershock_victims * agitation).ceil().max(1.0) as u64;
            let added = rng.gen_range(1..=ceiling);
            self.victims += added;
            self.stats.secondary_victims += added;
            report.new_victims = added;

            let reblock = self.params.aftershock_reblock * agitation;
            for index in self.graph.edges_touching(&self.affected) {
                if !self.graph.edges()[index].blocked && rng.gen::<f64>() < reblock {
                    self.graph.set_blocked(index, true);
                    report.edges_blocked += 1;
                }
            }
            tracing::debug!(added, blocked = report.edges_blocked, "aftershock");
        }
        report.aftershock = self.aftershock;

        if self.victims == 0 && !self.aftershock {
            self.phase = Phase::Rebuild;
            self.rebuild_progress = 0.0;
            self.blocked_at_rebuild_start = self.graph.blocked_count();
        }
    }

    fn step_rebuild<R: Rng + ?Sized>(&mut self, rng: &mut R, report: &mut StepReport) {
        self.aftershock = false;
        let crews = self.resources.available(ResourceKind::RepairCrew) as f64;
        let drones = self.resources.available(ResourceKind::Drone) as f64;
        let increment =
            crews * self.params.rebuild_per_crew + drones * self.params.rebuild_per_drone;
        let required = self.params.rebuild_required;
        self.rebuild_progress = (self.rebuild_progress + increment).min(required);

        // Always draw so the stream advances the same way whatever the crew count.
        let fatigue_roll = rng.gen::<f64>();
        if fatigue_roll < self.params.crew_fatigue_chance
            && self.resources.available(ResourceKind::RepairCrew) > 1
        {
            self.resources.take(ResourceKind::RepairCrew, 1);
            report.crew_fatigued = true;
        }

        let remaining = (required - self.rebuild_progress) / required;
        let allowed = (self.blocked_at_rebuild_start as f64 * remaining).ceil() as usize;
        let mut blocked = self.graph.blocked_edges();
        while blocked.len() > allowed {
            let pick = rng.gen_range(0..blocked.len());
            let edge = blocked.swap_remove(pick);
            self.graph.set_blocked(edge, false);
            report.edges_cleared += 1;
        }

        if self.rebuild_progress >= required {
            self.phase = Phase::Recovered;
            self.graph.unblock_all();
            self.affected.clear();
            self.seismic_level = 0.0;
            self.resources.restore();
            let (min, max) = (
                self.params.cooldown_min,
                self.params.cooldown_max.max(self.params.cooldown_min),
            );
            self.cooldown = rng.gen_range(min..=max);
            self.stats.disasters_completed += 1;
            tracing::info!(
                cooldown = self.cooldown,
                completed = self.stats.disasters_completed,
                "rebuild complete"
            );
        }
    }

    fn step_recovered<R: Rng + ?Sized>(&mut self, rng: &mut R, report: &mut StepReport) {
        self.cooldown = self.cooldown.saturating_sub(1);
        if self.cooldown > 0 {
            return;
        }
        let scenario = ScenarioKind::ALL[rng.gen_range(0..ScenarioKind::ALL.len())];
        let (low, high) = INTENSITY_RANGE;
        let intensity = ((rng.gen_range(low..=high) * 100.0).round() / 100.0).clamp(low, high);
        self.start_disaster(scenario, intensity, None, rng);
        report.auto_triggered = Some((scenario, intensity));
    }

    /// Records rescued victims, clamped to those still waiting. Returns the applied count.
    pub fn save_victims(&mut self, count: u64) -> u64 {
        let saved = count.min(self.victims);
        self.victims -= saved;
        self.victims_saved += saved;
        self.stats.total_victims_saved += saved;
        saved
    }

    /// Consumes up to `amount` units. Returns the amount consumed.
    pub fn use_resource(&mut self, kind: ResourceKind, amount: u32) -> u32 {
        self.resources.take(kind, amount)
    }

    /// Returns fleet units after a dispatch. Returns the amount put back.
    pub fn release_resource(&mut self, kind: ResourceKind, amount: u32) -> u32 {
        self.resources.give_back(kind, amount)
    }

    /// Trades `food_cost` food packs for one temporary repair crew.
    ///
    /// Temporary crews count toward the crew allocation, so a start with no crews
    /// can still rebuild.
    pub fn recruit_crew(&mut self, food_cost: u32) -> bool {
        if self.resources.available(ResourceKind::FoodPack) < food_cost {
            return false;
        }
        self.resources.take(ResourceKind::FoodPack, food_cost);
        self.resources.enlist(ResourceKind::RepairCrew, 1);
        true
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            phase: self.phase,
            scenario: self.scenario,
            episode: self.episode,
            time_step: self.time_step,
            intensity: self.intensity,
            seismic_level: self.seismic_level,
            aftershock: self.aftershock,
            victims: self.victims,
            victims_saved: self.victims_saved,
            rebuild_progress: self.rebuild_progress,
            cooldown: self.cooldown,
            roads_blocked: self.graph.blocked_count() > 0,
            resources: self.resources.available_all().clone(),
            initial_resources: self.resources.initial_all().clone(),
            resources_used: self.resources.used_all().clone(),
            command_center: self.graph.command_center(),
            nodes: self.graph.nodes().to_vec(),
            edges: self.graph.edges().to_vec(),
            affected_nodes: self.affected.iter().copied().collect(),
            isolated_nodes: self.graph.isolated_nodes(),
            stats: self.stats.clone(),
        }
    }

    /// Back to idle with the baseline stock and an open map.
    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.scenario = None;
        self.intensity = 0.0;
        self.seismic_level = 0.0;
        self.aftershock = false;
        self.victims = 0;
        self.victims_saved = 0;
        self.rebuild_progress = 0.0;
        self.resources = ResourceLedger::new(baseline_allocation());
        self.affected.clear();
        self.blocked_at_rebuild_start = 0;
        self.cooldown = 0;
        self.time_step = 0;
        self.episode = 0;
        self.stats = WorldStats::default();
        self.graph.unblock_all();
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        for kind in ResourceKind::ALL {
            let available = self.resources.available(kind);
            let initial = self.resources.initial(kind);
            if available > initial {
                return Err(InvariantViolation::ResourceOverflow {
                    kind,
                    available,
                    initial,
                });
            }
        }
        if !(0.0..=self.params.rebuild_required).contains(&self.rebuild_progress) {
            return Err(InvariantViolation::ProgressOutOfRange(self.rebuild_progress));
        }
        if !(0.0..=1.0).contains(&self.seismic_level) {
            return Err(InvariantViolation::SeismicOutOfRange(self.seismic_level));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn world() -> World {
        World::new(WorldGraph::karachi().unwrap(), WorldParams::default())
    }

    fn rng(seed: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(seed)
    }

    #[test]
    fn new_world_is_idle_at_baseline() {
        let world = world();
        assert_eq!(world.phase(), Phase::Idle);
        assert_eq!(world.resources().available_all(), &baseline_allocation());
        assert!(world.check_invariants().is_ok());
    }

    #[test]
    fn idle_update_is_a_no_op() {
        let mut world = world();
        let report = world.update(&mut rng(1));
        assert_eq!(report, StepReport::default());
        assert_eq!(world.time_step(), 0);
    }

    #[test]
    fn earthquake_victims_follow_population_formula() {
        let mut world = world();
        world
            .trigger_disaster(ScenarioKind::Earthquake, 0.8, None, &mut rng(2))
            .unwrap();

        let expected: u64 = world
            .graph()
            .nodes()
            .iter()
            .map(|n| {
                (n.population as f64 * 0.01 * 0.8 * n.vulnerability(ScenarioKind::Earthquake))
                    .round() as u64
            })
            .sum();
        assert_eq!(world.victims(), expected.max(10));
        assert_eq!(world.affected().len(), 27);
        assert_eq!(world.phase(), Phase::Response);
        assert_eq!(world.episode(), 1);
    }

    #[test]
    fn flood_always_hits_coastal_nodes() {
        let mut world = world();
        world
            .trigger_disaster(ScenarioKind::Flood, 0.5, None, &mut rng(3))
            .unwrap();
        for id in [3, 4, 6, 8, 9, 11, 19] {
            assert!(world.affected().contains(&NodeId(id)), "node {id} not flooded");
        }
    }

    #[test]
    fn rejects_out_of_range_intensity() {
        let mut world = world();
        for bad in [0.05, 1.2, f64::NAN] {
            let err = world
                .trigger_disaster(ScenarioKind::Wildfire, bad, None, &mut rng(4))
                .unwrap_err();
            assert!(matches!(err, TriggerError::InvalidIntensity(_)));
        }
        assert_eq!(world.phase(), Phase::Idle, "state unchanged after rejection");
        assert_eq!(world.episode(), 0);
    }

    #[test]
    fn overrides_replace_sampled_kinds_only() {
        let mut world = world();
        let overrides = BTreeMap::from([(ResourceKind::Ambulance, 12)]);
        world
            .trigger_disaster(ScenarioKind::Earthquake, 0.3, Some(&overrides), &mut rng(5))
            .unwrap();
        assert_eq!(world.available(ResourceKind::Ambulance), 12);
        assert!(ScenarioKind::Earthquake
            .profile()
            .medical_kits
            .contains(&world.available(ResourceKind::MedicalKit)));
    }

    #[test]
    fn save_victims_clamps_and_accumulates() {
        let mut world = world();
        world
            .trigger_disaster(ScenarioKind::Wildfire, 0.1, None, &mut rng(6))
            .unwrap();
        let victims = world.victims();
        assert_eq!(world.save_victims(victims + 100), victims);
        assert_eq!(world.victims(), 0);
        assert_eq!(world.victims_saved(), victims);
        assert_eq!(world.save_victims(5), 0);
    }

    #[test]
    fn response_moves_to_rebuild_once_victims_are_cleared() {
        let mut world = world();
        let mut rng = rng(7);
        world
            .trigger_disaster(ScenarioKind::Flood, 0.2, None, &mut rng)
            .unwrap();
        for _ in 0..500 {
            let victims = world.victims();
            world.save_victims(victims);
            let report = world.update(&mut rng);
            if world.phase() == Phase::Rebuild {
                assert!(!report.aftershock);
                assert_eq!(world.victims(), 0);
                return;
            }
        }
        panic!("never left response");
    }

    #[test]
    fn rebuild_completes_and_restores_resources() {
        let mut world = world();
        let mut rng = rng(8);
        world
            .trigger_disaster(ScenarioKind::Earthquake, 1.0, None, &mut rng)
            .unwrap();
        let initial = world.resources().initial_all().clone();
        world.use_resource(ResourceKind::MedicalKit, 10);

        let mut steps = 0;
        while world.phase() != Phase::Recovered {
            let victims = world.victims();
            world.save_victims(victims);
            world.update(&mut rng);
            assert!(world.check_invariants().is_ok());
            if world.phase() == Phase::Rebuild {
                assert!(world.available(ResourceKind::RepairCrew) >= 1);
            }
            steps += 1;
            assert!(steps < 500, "rebuild never completed");
        }

        assert_eq!(world.resources().available_all(), &initial);
        assert_eq!(world.graph().blocked_count(), 0);
        assert!((2..=6).contains(&world.cooldown()));
        assert_eq!(world.stats().disasters_completed, 1);
    }

    #[test]
    fn rebuild_clears_roads_in_proportion_to_progress() {
        let mut world = world();
        let mut rng = rng(9);
        world
            .trigger_disaster(ScenarioKind::Earthquake, 1.0, None, &mut rng)
            .unwrap();
        while world.phase() == Phase::Response {
            let victims = world.victims();
            world.save_victims(victims);
            world.update(&mut rng);
        }
        let start = world.blocked_at_rebuild_start as f64;
        while world.phase() == Phase::Rebuild {
            let allowed = (start * (100.0 - world.rebuild_progress()) / 100.0).ceil() as usize;
            assert!(world.graph().blocked_count() <= allowed);
            world.update(&mut rng);
        }
    }

    #[test]
    fn recovered_auto_triggers_after_cooldown() {
        let mut world = world();
        let mut rng = rng(10);
        world
            .trigger_disaster(ScenarioKind::Wildfire, 0.4, None, &mut rng)
            .unwrap();
        while world.phase() != Phase::Recovered {
            let victims = world.victims();
            world.save_victims(victims);
            world.update(&mut rng);
        }
        let cooldown = world.cooldown();
        let mut report = StepReport::default();
        for _ in 0..cooldown {
            report = world.update(&mut rng);
        }
        let (_, intensity) = report.auto_triggered.expect("new disaster after cooldown");
        assert_eq!(world.phase(), Phase::Response);
        assert_eq!(world.episode(), 2);
        assert!((0.1..=1.0).contains(&intensity));
        assert_eq!((intensity * 100.0).round() / 100.0, intensity);
    }

    #[test]
    fn release_is_capped_at_initial_allocation() {
        let mut world = world();
        assert_eq!(world.use_resource(ResourceKind::Ambulance, 2), 2);
        assert_eq!(world.release_resource(ResourceKind::Ambulance, 4), 2);
        assert_eq!(world.available(ResourceKind::Ambulance), 5);
    }

    #[test]
    fn recruit_crew_trades_food_for_a_crew() {
        let mut world = world();
        world.use_resource(ResourceKind::RepairCrew, 1);
        assert!(world.recruit_crew(5));
        assert_eq!(world.available(ResourceKind::RepairCrew), 2);
        assert_eq!(world.available(ResourceKind::FoodPack), 45);
        assert_eq!(world.resources().initial(ResourceKind::RepairCrew), 2);

        world.use_resource(ResourceKind::FoodPack, 41);
        assert!(!world.recruit_crew(5), "no food left");
        assert_eq!(world.available(ResourceKind::RepairCrew), 2);
    }

    #[test]
    fn recruiting_from_zero_crews_keeps_the_bound() {
        let mut world = world();
        let overrides =
            BTreeMap::from([(ResourceKind::RepairCrew, 0), (ResourceKind::FoodPack, 20)]);
        world
            .trigger_disaster(ScenarioKind::Flood, 0.4, Some(&overrides), &mut rng(4))
            .unwrap();
        assert_eq!(world.available(ResourceKind::RepairCrew), 0);

        assert!(world.recruit_crew(5));
        assert!(world.recruit_crew(5));
        assert_eq!(world.available(ResourceKind::RepairCrew), 2);
        assert_eq!(world.resources().initial(ResourceKind::RepairCrew), 2);
        assert_eq!(world.available(ResourceKind::FoodPack), 10);
        assert!(world.check_invariants().is_ok());
    }

    #[test]
    fn reset_returns_to_baseline() {
        let mut world = world();
        let mut rng = rng(11);
        world
            .trigger_disaster(ScenarioKind::Earthquake, 0.9, None, &mut rng)
            .unwrap();
        world.save_victims(100);
        world.reset();

        let snapshot = world.snapshot();
        assert_eq!(snapshot.phase, Phase::Idle);
        assert_eq!(snapshot.victims_saved, 0);
        assert!(!snapshot.roads_blocked);
        assert!(snapshot.isolated_nodes.is_empty());
        assert_eq!(snapshot.resources, baseline_allocation());
    }

    #[test]
    fn phase_transitions_follow_the_cycle() {
        assert!(Phase::Idle.can_become(Phase::Response));
        assert!(Phase::Recovered.can_become(Phase::Response));
        assert!(Phase::Rebuild.can_become(Phase::Rebuild));
        assert!(!Phase::Response.can_become(Phase::Recovered));
        assert!(!Phase::Rebuild.can_become(Phase::Response));
        assert!(!Phase::Idle.can_become(Phase::Rebuild));
    }
}
