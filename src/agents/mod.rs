//! Agents - sense, decide, act against the shared world and message log

mod alert;
mod allocation;
mod rebuild;
mod recon;
mod route;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::log::{MessageBody, MessageLog};
use crate::world::{Phase, ResourceKind, World};

pub use alert::{AlertAgent, AlertObservation};
pub use allocation::{AllocationAgent, AllocationObservation, Effectiveness};
pub use rebuild::{RebuildAgent, RebuildObservation, MILESTONES};
pub use recon::{ReconAgent, ReconObservation};
pub use route::{priority_score, RouteAgent, RouteObservation};

/// One effect an agent wants applied after deciding.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Emit { body: MessageBody, priority: u8 },
    UseResource { kind: ResourceKind, amount: u32 },
    ReleaseResource { kind: ResourceKind, amount: u32 },
    SaveVictims { count: u64 },
    RecruitCrew { food_cost: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Alert,
    Recon,
    Route,
    Allocation,
    Rebuild,
}

impl AgentKind {
    /// Execution order inside a cycle.
    pub const ORDER: [AgentKind; 5] = [
        AgentKind::Alert,
        AgentKind::Recon,
        AgentKind::Route,
        AgentKind::Allocation,
        AgentKind::Rebuild,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AgentKind::Alert => "alert",
            AgentKind::Recon => "recon",
            AgentKind::Route => "route",
            AgentKind::Allocation => "allocation",
            AgentKind::Rebuild => "rebuild",
        }
    }

    pub fn active_in(self, phase: Phase) -> bool {
        match phase {
            Phase::Response => !matches!(self, AgentKind::Rebuild),
            Phase::Rebuild => matches!(self, AgentKind::Rebuild),
            Phase::Idle | Phase::Recovered => false,
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Observe is a pure read; all internal bookkeeping happens in `decide`.
pub trait Agent {
    type Observation;

    fn kind(&self) -> AgentKind;
    fn observe(&self, world: &World, log: &MessageLog) -> Self::Observation;
    fn decide(&mut self, observation: Self::Observation) -> Vec<Action>;
    /// Forgets everything learned so far.
    fn reset(&mut self);

    fn act(&mut self, world: &World, log: &MessageLog) -> Vec<Action> {
        let observation = self.observe(world, log);
        self.decide(observation)
    }
}

fn default_alert_threshold() -> f64 {
    alert::DEFAULT_THRESHOLD
}

fn default_scan_radius() -> u32 {
    recon::SCAN_RADIUS
}

fn default_victims_per_scan() -> u64 {
    recon::VICTIMS_PER_SCAN
}

fn default_medical_kit_cap() -> u32 {
    allocation::MEDICAL_KIT_CAP
}

fn default_food_pack_cap() -> u32 {
    allocation::FOOD_PACK_CAP
}

fn default_crew_food_cost() -> u32 {
    rebuild::FOOD_COST_PER_CREW
}

fn default_min_crews() -> u32 {
    rebuild::MIN_CREWS_FOR_REBUILD
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,
    /// Nodes each drone scans per cycle.
    #[serde(default = "default_scan_radius")]
    pub scan_radius: u32,
    #[serde(default = "default_victims_per_scan")]
    pub victims_per_scan: u64,
    #[serde(default = "default_medical_kit_cap")]
    pub medical_kit_cap: u32,
    #[serde(default = "default_food_pack_cap")]
    pub food_pack_cap: u32,
    #[serde(default = "default_crew_food_cost")]
    pub crew_food_cost: u32,
    #[serde(default = "default_min_crews")]
    pub min_crews: u32,
    #[serde(default)]
    pub effectiveness: Effectiveness,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            alert_threshold: default_alert_threshold(),
            scan_radius: default_scan_radius(),
            victims_per_scan: default_victims_per_scan(),
            medical_kit_cap: default_medical_kit_cap(),
            food_pack_cap: default_food_pack_cap(),
            crew_food_cost: default_crew_food_cost(),
            min_crews: default_min_crews(),
            effectiveness: Effectiveness::default(),
        }
    }
}

/// Closed set of agents, dispatched by tag in `AgentKind::ORDER`.
#[derive(Debug, Clone)]
pub enum AgentSlot {
    Alert(AlertAgent),
    Recon(ReconAgent),
    Route(RouteAgent),
    Allocation(AllocationAgent),
    Rebuild(RebuildAgent),
}

impl AgentSlot {
    /// One agent of each kind in execution order.
    pub fn roster(config: &AgentConfig) -> Vec<AgentSlot> {
        AgentKind::ORDER
            .iter()
            .map(|kind| AgentSlot::new(*kind, config))
            .collect()
    }

    pub fn new(kind: AgentKind, config: &AgentConfig) -> Self {
        match kind {
            AgentKind::Alert => AgentSlot::Alert(AlertAgent::new(config.alert_threshold)),
            AgentKind::Recon => AgentSlot::Recon(ReconAgent::new(
                config.scan_radius,
                config.victims_per_scan,
            )),
            AgentKind::Route => AgentSlot::Route(RouteAgent::new()),
            AgentKind::Allocation => AgentSlot::Allocation(AllocationAgent::new(
                config.effectiveness,
                config.medical_kit_cap,
                config.food_pack_cap,
            )),
            AgentKind::Rebuild => AgentSlot::Rebuild(RebuildAgent::new(
                config.crew_food_cost,
                config.min_crews,
            )),
        }
    }

    pub fn kind(&self) -> AgentKind {
        match self {
            AgentSlot::Alert(agent) => agent.kind(),
            AgentSlot::Recon(agent) => agent.kind(),
            AgentSlot::Route(agent) => agent.kind(),
            AgentSlot::Allocation(agent) => agent.kind(),
            AgentSlot::Rebuild(agent) => agent.kind(),
        }
    }

    pub fn act(&mut self, world: &World, log: &MessageLog) -> Vec<Action> {
        match self {
            AgentSlot::Alert(agent) => agent.act(world, log),
            AgentSlot::Recon(agent) => agent.act(world, log),
            AgentSlot::Route(agent) => agent.act(world, log),
            AgentSlot::Allocation(agent) => agent.act(world, log),
            AgentSlot::Rebuild(agent) => agent.act(world, log),
        }
    }

    pub fn reset(&mut self) {
        match self {
            AgentSlot::Alert(agent) => agent.reset(),
            AgentSlot::Recon(agent) => agent.reset(),
            AgentSlot::Route(agent) => agent.reset(),
            AgentSlot::Allocation(agent) => agent.reset(),
            AgentSlot::Rebuild(agent) => agent.reset(),
        }
    }
}
