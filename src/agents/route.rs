use std::collections::BTreeSet;

use crate::graph::{shortest_paths, Node, NodeCategory, NodeId, WorldGraph};
use crate::log::{MessageBody, MessageId, MessageLog, PlanPayload, PlannedRoute, RouteStatus};
use crate::scenario::ScenarioKind;
use crate::world::{Phase, World};

use super::{Action, Agent, AgentKind};

const CLEAR_PRIORITY: u8 = 6;
const BLOCKED_PRIORITY: u8 = 8;
const POPULATION_SCALE: f64 = 100_000.0;
const CATEGORY_BOOST: f64 = 1.5;

/// Rescue urgency of a node: exposure times population, boosted for homes and services.
pub fn priority_score(node: &Node, scenario: Option<ScenarioKind>) -> f64 {
    let vulnerability = scenario.map_or(1.0, |kind| node.vulnerability(kind));
    let base = vulnerability * (node.population as f64 / POPULATION_SCALE);
    match node.category {
        NodeCategory::Residential | NodeCategory::PublicService => base * CATEGORY_BOOST,
        _ => base,
    }
}

#[derive(Debug, Clone)]
pub struct RouteObservation {
    pub phase: Phase,
    pub episode: u64,
    pub scenario: Option<ScenarioKind>,
    pub victims: u64,
    pub graph: WorldGraph,
    pub affected: BTreeSet<NodeId>,
    /// Nodes reported by recon since the last observation.
    pub reported: Vec<NodeId>,
    pub head: MessageId,
    pub time_step: u64,
}

/// Goal-based planner: ranks scanned targets and routes to them from the command center.
///
/// Targets come from `recon` messages in the log rather than from the recon agent itself.
#[derive(Debug, Clone, Default)]
pub struct RouteAgent {
    episode: u64,
    last_seen: MessageId,
    known: BTreeSet<NodeId>,
}

impl RouteAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn known_targets(&self) -> &BTreeSet<NodeId> {
        &self.known
    }

    fn plan(&self, obs: &RouteObservation) -> Vec<PlannedRoute> {
        let graph = &obs.graph;
        let center = graph.command_center();
        let Some(paths) = shortest_paths(graph, center) else {
            return Vec::new();
        };

        let mut routes: Vec<PlannedRoute> = self
            .known
            .iter()
            .filter(|id| **id != center && obs.affected.contains(*id))
            .filter_map(|id| graph.node(*id))
            .map(|node| {
                let path = paths.path_to(node.id).unwrap_or_default();
                let path_names = path
                    .iter()
                    .filter_map(|id| graph.node(*id))
                    .map(|hop| hop.name.clone())
                    .collect();
                let distance = paths.cost_to(node.id);
                PlannedRoute {
                    target: node.id,
                    target_name: node.name.clone(),
                    status: if distance.is_some() {
                        RouteStatus::Clear
                    } else {
                        RouteStatus::Blocked
                    },
                    path,
                    path_names,
                    distance,
                    priority_score: priority_score(node, obs.scenario),
                }
            })
            .collect();

        routes.sort_by(|a, b| {
            b.priority_score
                .total_cmp(&a.priority_score)
                .then(a.target.cmp(&b.target))
        });
        routes
    }
}

impl Agent for RouteAgent {
    type Observation = RouteObservation;

    fn kind(&self) -> AgentKind {
        AgentKind::Route
    }

    fn observe(&self, world: &World, log: &MessageLog) -> RouteObservation {
        let reported = log
            .since(self.last_seen)
            .filter_map(|message| match &message.body {
                MessageBody::Recon(payload) => Some(payload.nodes_scanned.iter().copied()),
                _ => None,
            })
            .flatten()
            .collect();
        RouteObservation {
            phase: world.phase(),
            episode: world.episode(),
            scenario: world.scenario(),
            victims: world.victims(),
            graph: world.graph().clone(),
            affected: world.affected().clone(),
            reported,
            head: log.head_id(),
            time_step: world.time_step(),
        }
    }

    fn decide(&mut self, obs: RouteObservation) -> Vec<Action> {
        if obs.episode != self.episode {
            self.known.clear();
            self.episode = obs.episode;
        }
        self.known.extend(obs.reported.iter().copied());
        self.last_seen = obs.head;

        if obs.phase != Phase::Response || obs.victims == 0 {
            return Vec::new();
        }

        let routes = self.plan(&obs);
        let any_blocked = routes
            .iter()
            .any(|route| route.status == RouteStatus::Blocked);
        vec![Action::Emit {
            body: MessageBody::Plan(PlanPayload {
                routes,
                command_center: obs.graph.command_center(),
                victims_remaining: obs.victims,
                blocked_edges: obs.graph.blocked_count(),
                time_step: obs.time_step,
            }),
            priority: if any_blocked {
                BLOCKED_PRIORITY
            } else {
                CLEAR_PRIORITY
            },
        }]
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}
