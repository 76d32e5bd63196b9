use std::collections::BTreeSet;

use crate::log::{
    MessageBody, MessageLog, MilestonePayload, RepairAllocPayload, RepairStatusPayload,
    StepEstimate,
};
use crate::world::{Phase, ResourceKind, World};

use super::{Action, Agent, AgentKind};

pub(super) const FOOD_COST_PER_CREW: u32 = 5;
pub(super) const MIN_CREWS_FOR_REBUILD: u32 = 2;
pub const MILESTONES: [u8; 4] = [25, 50, 75, 90];

const STATUS_PRIORITY: u8 = 6;
const RECRUIT_PRIORITY: u8 = 8;
const MILESTONE_PRIORITY: u8 = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct RebuildObservation {
    pub phase: Phase,
    pub episode: u64,
    pub progress: f64,
    pub required: f64,
    pub crews: u32,
    pub drones: u32,
    pub food_packs: u32,
    pub per_crew: f64,
    pub per_drone: f64,
    pub blocked_edges: usize,
    pub time_step: u64,
}

impl RebuildObservation {
    pub fn estimated_steps(&self) -> StepEstimate {
        let rate = f64::from(self.crews) * self.per_crew + f64::from(self.drones) * self.per_drone;
        if rate <= 0.0 {
            return StepEstimate::Indeterminate;
        }
        StepEstimate::Steps(((self.required - self.progress).max(0.0) / rate).ceil() as u64)
    }
}

/// Coordinates repair crews once the response is over.
#[derive(Debug, Clone)]
pub struct RebuildAgent {
    crew_food_cost: u32,
    min_crews: u32,
    episode: u64,
    reached: BTreeSet<u8>,
}

impl RebuildAgent {
    pub fn new(crew_food_cost: u32, min_crews: u32) -> Self {
        Self {
            crew_food_cost,
            min_crews,
            episode: 0,
            reached: BTreeSet::new(),
        }
    }

    fn can_recruit(&self, obs: &RebuildObservation) -> bool {
        obs.crews < self.min_crews && obs.food_packs >= self.crew_food_cost
    }
}

impl Default for RebuildAgent {
    fn default() -> Self {
        Self::new(FOOD_COST_PER_CREW, MIN_CREWS_FOR_REBUILD)
    }
}

impl Agent for RebuildAgent {
    type Observation = RebuildObservation;

    fn kind(&self) -> AgentKind {
        AgentKind::Rebuild
    }

    fn observe(&self, world: &World, _log: &MessageLog) -> RebuildObservation {
        let params = world.params();
        RebuildObservation {
            phase: world.phase(),
            episode: world.episode(),
            progress: world.rebuild_progress(),
            required: params.rebuild_required,
            crews: world.available(ResourceKind::RepairCrew),
            drones: world.available(ResourceKind::Drone),
            food_packs: world.available(ResourceKind::FoodPack),
            per_crew: params.rebuild_per_crew,
            per_drone: params.rebuild_per_drone,
            blocked_edges: world.graph().blocked_count(),
            time_step: world.time_step(),
        }
    }

    fn decide(&mut self, obs: RebuildObservation) -> Vec<Action> {
        if obs.episode != self.episode {
            self.reached.clear();
            self.episode = obs.episode;
        }
        if obs.phase != Phase::Rebuild {
            return Vec::new();
        }

        let mut actions = vec![Action::Emit {
            body: MessageBody::RepairStatus(RepairStatusPayload {
                rebuild_progress: obs.progress,
                available_crews: obs.crews,
                available_drones: obs.drones,
                estimated_steps_remaining: obs.estimated_steps(),
                blocked_edges: obs.blocked_edges,
                time_step: obs.time_step,
            }),
            priority: STATUS_PRIORITY,
        }];

        if self.can_recruit(&obs) {
            actions.push(Action::RecruitCrew {
                food_cost: self.crew_food_cost,
            });
            actions.push(Action::Emit {
                body: MessageBody::RepairAlloc(RepairAllocPayload {
                    added_crews: 1,
                    food_used: self.crew_food_cost,
                    crews_now: obs.crews + 1,
                    time_step: obs.time_step,
                }),
                priority: RECRUIT_PRIORITY,
            });
        }

        for milestone in MILESTONES {
            if obs.progress >= f64::from(milestone) && self.reached.insert(milestone) {
                actions.push(Action::Emit {
                    body: MessageBody::Milestone(MilestonePayload {
                        milestone,
                        rebuild_progress: obs.progress,
                        time_step: obs.time_step,
                    }),
                    priority: MILESTONE_PRIORITY,
                });
            }
        }
        actions
    }

    fn reset(&mut self) {
        self.episode = 0;
        self.reached.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(progress: f64, crews: u32, drones: u32, food: u32) -> RebuildObservation {
        RebuildObservation {
            phase: Phase::Rebuild,
            episode: 1,
            progress,
            required: 100.0,
            crews,
            drones,
            food_packs: food,
            per_crew: 2.0,
            per_drone: 0.15,
            blocked_edges: 4,
            time_step: 10,
        }
    }

    fn milestones(actions: &[Action]) -> Vec<u8> {
        actions
            .iter()
            .filter_map(|action| match action {
                Action::Emit {
                    body: MessageBody::Milestone(payload),
                    ..
                } => Some(payload.milestone),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn estimate_rounds_up() {
        // 90 remaining at 2 * 2.0 + 2 * 0.15 = 4.3 per step
        assert_eq!(obs(10.0, 2, 2, 0).estimated_steps(), StepEstimate::Steps(21));
        assert_eq!(obs(10.0, 0, 0, 0).estimated_steps(), StepEstimate::Indeterminate);
    }

    #[test]
    fn recruits_when_short_of_crews() {
        let mut agent = RebuildAgent::default();
        let actions = agent.decide(obs(0.0, 1, 0, 12));
        assert!(actions.contains(&Action::RecruitCrew { food_cost: 5 }));
    }

    #[test]
    fn recruits_with_no_crews_at_all() {
        let mut agent = RebuildAgent::default();
        let actions = agent.decide(obs(0.0, 0, 0, 5));
        assert!(actions.contains(&Action::RecruitCrew { food_cost: 5 }));
        assert_eq!(obs(0.0, 0, 0, 5).estimated_steps(), StepEstimate::Indeterminate);
    }

    #[test]
    fn no_recruit_without_food() {
        let mut agent = RebuildAgent::default();
        let actions = agent.decide(obs(0.0, 1, 0, 4));
        assert!(!actions
            .iter()
            .any(|a| matches!(a, Action::RecruitCrew { .. })));
    }

    #[test]
    fn milestones_fire_once_each() {
        let mut agent = RebuildAgent::default();
        assert_eq!(milestones(&agent.decide(obs(20.0, 2, 0, 0))), Vec::<u8>::new());
        assert_eq!(milestones(&agent.decide(obs(52.0, 2, 0, 0))), vec![25, 50]);
        assert_eq!(milestones(&agent.decide(obs(60.0, 2, 0, 0))), Vec::<u8>::new());
        assert_eq!(milestones(&agent.decide(obs(91.0, 2, 0, 0))), vec![75, 90]);
    }

    #[test]
    fn milestones_rearm_on_new_episode() {
        let mut agent = RebuildAgent::default();
        agent.decide(obs(30.0, 2, 0, 0));
        let mut next = obs(30.0, 2, 0, 0);
        next.episode = 2;
        assert_eq!(milestones(&agent.decide(next)), vec![25]);
    }

    #[test]
    fn silent_outside_rebuild() {
        let mut agent = RebuildAgent::default();
        let mut response = obs(0.0, 1, 0, 50);
        response.phase = Phase::Response;
        assert!(agent.decide(response).is_empty());
    }
}
