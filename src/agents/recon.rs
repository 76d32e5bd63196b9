use std::collections::BTreeSet;

use crate::graph::NodeId;
use crate::log::{MessageBody, MessageLog, ReconCompletePayload, ReconPayload};
use crate::world::{Phase, ResourceKind, World};

use super::{Action, Agent, AgentKind};

pub(super) const SCAN_RADIUS: u32 = 2;
pub(super) const VICTIMS_PER_SCAN: u64 = 3;
const RECON_PRIORITY: u8 = 7;
const COMPLETE_PRIORITY: u8 = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct ReconObservation {
    pub phase: Phase,
    pub episode: u64,
    pub drones: u32,
    pub affected: BTreeSet<NodeId>,
    pub time_step: u64,
}

/// Drone sweep over affected nodes in ascending id order.
#[derive(Debug, Clone)]
pub struct ReconAgent {
    scan_radius: u32,
    victims_per_scan: u64,
    episode: u64,
    scanned: BTreeSet<NodeId>,
    started_at: Option<u64>,
    complete: bool,
}

impl ReconAgent {
    pub fn new(scan_radius: u32, victims_per_scan: u64) -> Self {
        Self {
            scan_radius,
            victims_per_scan,
            episode: 0,
            scanned: BTreeSet::new(),
            started_at: None,
            complete: false,
        }
    }

    pub fn scanned(&self) -> &BTreeSet<NodeId> {
        &self.scanned
    }
}

impl Default for ReconAgent {
    fn default() -> Self {
        Self::new(SCAN_RADIUS, VICTIMS_PER_SCAN)
    }
}

impl Agent for ReconAgent {
    type Observation = ReconObservation;

    fn kind(&self) -> AgentKind {
        AgentKind::Recon
    }

    fn observe(&self, world: &World, _log: &MessageLog) -> ReconObservation {
        ReconObservation {
            phase: world.phase(),
            episode: world.episode(),
            drones: world.available(ResourceKind::Drone),
            affected: world.affected().clone(),
            time_step: world.time_step(),
        }
    }

    fn decide(&mut self, obs: ReconObservation) -> Vec<Action> {
        if obs.episode != self.episode {
            self.reset();
            self.episode = obs.episode;
        }
        if obs.phase != Phase::Response || obs.drones == 0 {
            return Vec::new();
        }
        let started_at = *self.started_at.get_or_insert(obs.time_step);

        let unscanned: Vec<NodeId> = obs.affected.difference(&self.scanned).copied().collect();
        if unscanned.is_empty() {
            if obs.affected.is_empty() || self.complete {
                return Vec::new();
            }
            self.complete = true;
            return vec![Action::Emit {
                body: MessageBody::ReconComplete(ReconCompletePayload {
                    total_scanned: self.scanned.len(),
                    recon_duration: obs.time_step.saturating_sub(started_at),
                    time_step: obs.time_step,
                }),
                priority: COMPLETE_PRIORITY,
            }];
        }

        let capacity = (obs.drones as usize).saturating_mul(self.scan_radius as usize);
        let batch: Vec<NodeId> = unscanned.iter().take(capacity).copied().collect();
        self.scanned.extend(batch.iter().copied());

        vec![Action::Emit {
            body: MessageBody::Recon(ReconPayload {
                victims_identified: batch.len() as u64 * self.victims_per_scan,
                remaining_areas: unscanned.len() - batch.len(),
                nodes_scanned: batch,
                drones_active: obs.drones,
                time_step: obs.time_step,
            }),
            priority: RECON_PRIORITY,
        }]
    }

    fn reset(&mut self) {
        self.episode = 0;
        self.scanned.clear();
        self.started_at = None;
        self.complete = false;
    }
}
