use serde::{Deserialize, Serialize};

use crate::log::{AllocPayload, Coverage, MessageBody, MessageLog};
use crate::world::{Allocation, Phase, ResourceKind, World};

use super::{Action, Agent, AgentKind};

pub(super) const MEDICAL_KIT_CAP: u32 = 5;
pub(super) const FOOD_PACK_CAP: u32 = 3;
const ALLOC_PRIORITY: u8 = 5;

/// Victims one unit addresses per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Effectiveness {
    pub ambulance: u64,
    pub drone: u64,
    pub medical_kit: u64,
    pub food_pack: u64,
}

impl Default for Effectiveness {
    fn default() -> Self {
        Self {
            ambulance: 500,
            drone: 200,
            medical_kit: 50,
            food_pack: 30,
        }
    }
}

/// Relative cost of committing one unit, used in the utility score.
fn unit_cost(kind: ResourceKind) -> f64 {
    match kind {
        ResourceKind::Ambulance => 5.0,
        ResourceKind::Drone => 2.0,
        ResourceKind::MedicalKit => 1.0,
        ResourceKind::FoodPack => 0.5,
        ResourceKind::RepairCrew => 0.0,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationObservation {
    pub phase: Phase,
    pub victims: u64,
    pub ambulances: u32,
    pub drones: u32,
    pub medical_kits: u32,
    pub food_packs: u32,
    pub time_step: u64,
}

/// Result of the greedy pass over resource kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationPlan {
    pub allocation: Allocation,
    pub coverage: Coverage,
    pub addressed: u64,
    pub remaining: u64,
    pub utility_score: f64,
}

/// Utility agent: commits resources greedily in a fixed order and rescues what they cover.
#[derive(Debug, Clone)]
pub struct AllocationAgent {
    effectiveness: Effectiveness,
    medical_kit_cap: u32,
    food_pack_cap: u32,
}

impl AllocationAgent {
    pub fn new(effectiveness: Effectiveness, medical_kit_cap: u32, food_pack_cap: u32) -> Self {
        Self {
            effectiveness,
            medical_kit_cap,
            food_pack_cap,
        }
    }

    /// Ambulances first, then drones, then capped kits and food, each sized to what is left.
    pub fn plan(&self, obs: &AllocationObservation) -> AllocationPlan {
        let steps = [
            (ResourceKind::Ambulance, obs.ambulances, self.effectiveness.ambulance),
            (ResourceKind::Drone, obs.drones, self.effectiveness.drone),
            (
                ResourceKind::MedicalKit,
                obs.medical_kits.min(self.medical_kit_cap),
                self.effectiveness.medical_kit,
            ),
            (
                ResourceKind::FoodPack,
                obs.food_packs.min(self.food_pack_cap),
                self.effectiveness.food_pack,
            ),
        ];

        let mut remaining = obs.victims;
        let mut allocation = Allocation::new();
        let mut coverage = Coverage::new();
        let mut cost = 0.0;
        for (kind, stock, per_unit) in steps {
            let units = if per_unit == 0 {
                0
            } else {
                u64::from(stock).min(remaining.div_ceil(per_unit)) as u32
            };
            let covered = (u64::from(units) * per_unit).min(remaining);
            remaining -= covered;
            cost += f64::from(units) * unit_cost(kind);
            allocation.insert(kind, units);
            coverage.insert(kind, covered);
        }

        let addressed = obs.victims - remaining;
        AllocationPlan {
            allocation,
            coverage,
            addressed,
            remaining,
            utility_score: addressed as f64 * 10.0 - cost,
        }
    }
}

impl Default for AllocationAgent {
    fn default() -> Self {
        Self::new(Effectiveness::default(), MEDICAL_KIT_CAP, FOOD_PACK_CAP)
    }
}

impl Agent for AllocationAgent {
    type Observation = AllocationObservation;

    fn kind(&self) -> AgentKind {
        AgentKind::Allocation
    }

    fn observe(&self, world: &World, _log: &MessageLog) -> AllocationObservation {
        AllocationObservation {
            phase: world.phase(),
            victims: world.victims(),
            ambulances: world.available(ResourceKind::Ambulance),
            drones: world.available(ResourceKind::Drone),
            medical_kits: world.available(ResourceKind::MedicalKit),
            food_packs: world.available(ResourceKind::FoodPack),
            time_step: world.time_step(),
        }
    }

    fn decide(&mut self, obs: AllocationObservation) -> Vec<Action> {
        if obs.phase != Phase::Response || obs.victims == 0 {
            return Vec::new();
        }
        let plan = self.plan(&obs);

        let mut actions: Vec<Action> = plan
            .allocation
            .iter()
            .filter(|(_, amount)| **amount > 0)
            .map(|(kind, amount)| Action::UseResource {
                kind: *kind,
                amount: *amount,
            })
            .collect();
        actions.push(Action::SaveVictims {
            count: plan.addressed,
        });
        // Fleets return to base once the rescue round is over.
        actions.extend(
            plan.allocation
                .iter()
                .filter(|(kind, amount)| kind.is_reusable() && **amount > 0)
                .map(|(kind, amount)| Action::ReleaseResource {
                    kind: *kind,
                    amount: *amount,
                }),
        );
        actions.push(Action::Emit {
            body: MessageBody::Alloc(AllocPayload {
                allocation: plan.allocation,
                breakdown: plan.coverage,
                victims_addressed: plan.addressed,
                victims_remaining: plan.remaining,
                utility_score: plan.utility_score,
                time_step: obs.time_step,
            }),
            priority: ALLOC_PRIORITY,
        });
        actions
    }

    fn reset(&mut self) {}
}
