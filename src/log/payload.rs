use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::graph::NodeId;
use crate::scenario::ScenarioKind;
use crate::world::{Allocation, Phase, ResourceKind};

/// Victims covered per resource kind.
pub type Coverage = BTreeMap<ResourceKind, u64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn priority(self) -> u8 {
        match self {
            Severity::Critical => 10,
            Severity::High => 8,
            Severity::Medium => 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub severity: Severity,
    pub scenario: Option<ScenarioKind>,
    pub seismic_level: f64,
    pub threshold: f64,
    pub aftershock: bool,
    pub affected_areas: usize,
    pub time_step: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconPayload {
    pub nodes_scanned: Vec<NodeId>,
    pub drones_active: u32,
    pub victims_identified: u64,
    pub remaining_areas: usize,
    pub time_step: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconCompletePayload {
    pub total_scanned: usize,
    pub recon_duration: u64,
    pub time_step: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Clear,
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedRoute {
    pub target: NodeId,
    pub target_name: String,
    pub path: Vec<NodeId>,
    pub path_names: Vec<String>,
    /// Route length in km; `None` when the target is cut off.
    pub distance: Option<f64>,
    pub status: RouteStatus,
    pub priority_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanPayload {
    pub routes: Vec<PlannedRoute>,
    pub command_center: NodeId,
    pub victims_remaining: u64,
    pub blocked_edges: usize,
    pub time_step: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocPayload {
    pub allocation: Allocation,
    /// Victims covered per resource kind, in allocation order.
    pub breakdown: Coverage,
    pub victims_addressed: u64,
    pub victims_remaining: u64,
    pub utility_score: f64,
    pub time_step: u64,
}

/// Rebuild cycles left at the current repair rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepEstimate {
    Steps(u64),
    /// Nothing is repairing, so no estimate exists.
    Indeterminate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairStatusPayload {
    pub rebuild_progress: f64,
    pub available_crews: u32,
    pub available_drones: u32,
    pub estimated_steps_remaining: StepEstimate,
    pub blocked_edges: usize,
    pub time_step: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairAllocPayload {
    pub added_crews: u32,
    pub food_used: u32,
    pub crews_now: u32,
    pub time_step: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestonePayload {
    pub milestone: u8,
    pub rebuild_progress: f64,
    pub time_step: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseChangePayload {
    pub from: Phase,
    pub to: Phase,
    pub cycle: u64,
    pub episode: u64,
}
