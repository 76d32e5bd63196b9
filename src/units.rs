//! Response units - animated dispatch tokens for the map feed
//!
//! Units never change the simulation; they only mirror what the agents are doing
//! so a client has something to draw.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::graph::{shortest_paths, Coordinates, NodeId, WorldGraph};
use crate::world::{Phase, ResourceKind, World};

/// Cycles a unit stays on scene before heading back.
const ON_SCENE_CYCLES: u32 = 2;
/// Kits needed to field one medical team.
const KITS_PER_TEAM: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Ambulance,
    Drone,
    MedicalTeam,
    RepairCrew,
}

impl UnitKind {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitKind::Ambulance => "ambulance",
            UnitKind::Drone => "drone",
            UnitKind::MedicalTeam => "medical_team",
            UnitKind::RepairCrew => "repair_crew",
        }
    }

    /// Spawn every `cadence` cycles.
    fn cadence(self) -> u64 {
        match self {
            UnitKind::Ambulance => 2,
            UnitKind::Drone => 3,
            UnitKind::MedicalTeam => 4,
            UnitKind::RepairCrew => 3,
        }
    }
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Dispatched,
    Responding,
    Returning,
}

#[derive(Debug, Clone)]
pub struct ResponseUnit {
    id: u64,
    kind: UnitKind,
    path: Vec<NodeId>,
    hop: usize,
    state: UnitState,
    on_scene: u32,
    target: NodeId,
    spawned_at: u64,
}

impl ResponseUnit {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn node(&self) -> NodeId {
        self.path[self.hop]
    }

    /// Share of the current leg already travelled.
    pub fn progress(&self) -> f64 {
        let legs = self.path.len().saturating_sub(1);
        match self.state {
            UnitState::Responding => 1.0,
            _ if legs == 0 => 1.0,
            _ => self.hop as f64 / legs as f64,
        }
    }

    /// Moves one hop or ticks the on-scene timer. Returns false once the unit is home.
    fn advance(&mut self) -> bool {
        let last = self.path.len() - 1;
        match self.state {
            UnitState::Dispatched => {
                self.hop = (self.hop + 1).min(last);
                if self.hop == last {
                    self.state = UnitState::Responding;
                    self.on_scene = ON_SCENE_CYCLES;
                }
                true
            }
            UnitState::Responding => {
                self.on_scene = self.on_scene.saturating_sub(1);
                if self.on_scene == 0 {
                    self.state = UnitState::Returning;
                    self.path.reverse();
                    self.hop = 0;
                }
                true
            }
            UnitState::Returning => {
                self.hop = (self.hop + 1).min(last);
                self.hop < last
            }
        }
    }
}

/// Serialisable view of one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitPosition {
    pub id: u64,
    pub kind: UnitKind,
    pub state: UnitState,
    pub node: NodeId,
    pub position: Coordinates,
    pub target: NodeId,
    pub target_name: String,
    pub path: Vec<NodeId>,
    pub progress: f64,
    pub spawned_at: u64,
}

#[derive(Debug, Default)]
pub struct UnitFleet {
    units: Vec<ResponseUnit>,
    next_id: u64,
}

impl UnitFleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn units(&self) -> &[ResponseUnit] {
        &self.units
    }

    pub fn clear(&mut self) {
        self.units.clear();
        self.next_id = 0;
    }

    fn active(&self, kind: UnitKind) -> usize {
        self.units.iter().filter(|unit| unit.kind == kind).count()
    }

    /// Spawns on cadence for the current phase, then moves every unit one step.
    pub fn step<R: Rng + ?Sized>(&mut self, world: &World, cycle: u64, rng: &mut R) {
        if world.phase() == Phase::Idle {
            self.clear();
            return;
        }
        self.spawn(world, cycle, rng);
        self.units.retain_mut(ResponseUnit::advance);
    }

    fn spawn<R: Rng + ?Sized>(&mut self, world: &World, cycle: u64, rng: &mut R) {
        let graph = world.graph();
        let center = graph.command_center();
        let Some(paths) = shortest_paths(graph, center) else {
            return;
        };

        match world.phase() {
            Phase::Response => {
                let targets: Vec<NodeId> = world
                    .affected()
                    .iter()
                    .copied()
                    .filter(|id| *id != center)
                    .collect();
                if targets.is_empty() {
                    return;
                }

                let ambulances = world.available(ResourceKind::Ambulance).min(3) as usize;
                if self.due(UnitKind::Ambulance, cycle, ambulances) {
                    let target = targets[rng.gen_range(0..targets.len())];
                    if let Some(path) = paths.path_to(target) {
                        self.push(UnitKind::Ambulance, path, cycle);
                    }
                }

                let drones = world.available(ResourceKind::Drone).min(4) as usize;
                if self.due(UnitKind::Drone, cycle, drones) {
                    let target = targets[rng.gen_range(0..targets.len())];
                    self.push(UnitKind::Drone, vec![center, target], cycle);
                }

                let teams =
                    (world.available(ResourceKind::MedicalKit) / KITS_PER_TEAM).min(2) as usize;
                if self.due(UnitKind::MedicalTeam, cycle, teams) {
                    let busiest = targets
                        .iter()
                        .filter_map(|id| graph.node(*id))
                        .max_by(|a, b| a.population.cmp(&b.population).then(b.id.cmp(&a.id)));
                    if let Some(path) = busiest.and_then(|node| paths.path_to(node.id)) {
                        self.push(UnitKind::MedicalTeam, path, cycle);
                    }
                }
            }
            Phase::Rebuild => {
                let blocked = graph.blocked_edges();
                let cap = (world.available(ResourceKind::RepairCrew) as usize).min(blocked.len());
                if !self.due(UnitKind::RepairCrew, cycle, cap) {
                    return;
                }
                let edge = &graph.edges()[blocked[rng.gen_range(0..blocked.len())]];
                let site = [edge.from, edge.to]
                    .into_iter()
                    .find(|end| *end != center && paths.reachable(*end));
                if let Some(path) = site.and_then(|end| paths.path_to(end)) {
                    self.push(UnitKind::RepairCrew, path, cycle);
                }
            }
            Phase::Idle | Phase::Recovered => {}
        }
    }

    fn due(&self, kind: UnitKind, cycle: u64, cap: usize) -> bool {
        cycle % kind.cadence() == 0 && self.active(kind) < cap
    }

    fn push(&mut self, kind: UnitKind, path: Vec<NodeId>, cycle: u64) {
        let Some(&target) = path.last() else {
            return;
        };
        if path.len() < 2 {
            return;
        }
        self.next_id += 1;
        self.units.push(ResponseUnit {
            id: self.next_id,
            kind,
            path,
            hop: 0,
            state: UnitState::Dispatched,
            on_scene: 0,
            target,
            spawned_at: cycle,
        });
    }

    pub fn positions(&self, graph: &WorldGraph) -> Vec<UnitPosition> {
        self.units
            .iter()
            .filter_map(|unit| {
                let here = graph.node(unit.node())?;
                let target = graph.node(unit.target)?;
                Some(UnitPosition {
                    id: unit.id,
                    kind: unit.kind,
                    state: unit.state,
                    node: here.id,
                    position: here.position,
                    target: target.id,
                    target_name: target.name.clone(),
                    path: unit.path.clone(),
                    progress: unit.progress(),
                    spawned_at: unit.spawned_at,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;
    use crate::scenario::ScenarioKind;
    use crate::world::WorldParams;

    fn responding_world(rng: &mut ChaCha8Rng) -> World {
        let mut world = World::new(
            crate::graph::WorldGraph::karachi().unwrap(),
            WorldParams::default(),
        );
        world
            .trigger_disaster(ScenarioKind::Earthquake, 0.2, None, rng)
            .unwrap();
        world
    }

    #[test]
    fn unit_walks_out_waits_and_returns() {
        let mut unit = ResponseUnit {
            id: 1,
            kind: UnitKind::Ambulance,
            path: vec![NodeId(26), NodeId(0), NodeId(3)],
            hop: 0,
            state: UnitState::Dispatched,
            on_scene: 0,
            target: NodeId(3),
            spawned_at: 2,
        };
        assert!(unit.advance());
        assert_eq!(unit.node(), NodeId(0));
        assert!(unit.advance());
        assert_eq!(unit.state(), UnitState::Responding);
        assert!(unit.advance());
        assert!(unit.advance());
        assert_eq!(unit.state(), UnitState::Returning);
        assert_eq!(unit.node(), NodeId(3));
        assert!(unit.advance());
        assert_eq!(unit.node(), NodeId(0));
        assert!(!unit.advance(), "retired at the command center");
    }

    #[test]
    fn spawns_follow_cadence_and_caps() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let world = responding_world(&mut rng);
        let mut fleet = UnitFleet::new();

        fleet.step(&world, 1, &mut rng);
        assert!(fleet.is_empty(), "nothing due on cycle 1");

        fleet.step(&world, 2, &mut rng);
        assert!(fleet.len() <= 1);
        assert!(fleet.units().iter().all(|u| u.kind() == UnitKind::Ambulance));

        let mut busiest = 0;
        for cycle in 3..=40 {
            fleet.step(&world, cycle, &mut rng);
            assert!(fleet.active(UnitKind::Ambulance) <= 3);
            assert!(fleet.active(UnitKind::Drone) <= 4);
            assert!(fleet.active(UnitKind::MedicalTeam) <= 2);
            assert_eq!(fleet.active(UnitKind::RepairCrew), 0);
            busiest = busiest.max(fleet.len());
        }
        assert!(busiest > 1);
    }

    #[test]
    fn units_start_from_the_command_center() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let world = responding_world(&mut rng);
        let mut fleet = UnitFleet::new();
        fleet.step(&world, 12, &mut rng);

        let positions = fleet.positions(world.graph());
        assert!(!positions.is_empty());
        for position in positions {
            assert_eq!(position.path.first(), Some(&NodeId(26)));
            assert_ne!(position.target, NodeId(26));
            assert_ne!(position.state, UnitState::Returning);
        }
    }

    #[test]
    fn idle_world_clears_units() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut world = responding_world(&mut rng);
        let mut fleet = UnitFleet::new();
        fleet.step(&world, 12, &mut rng);
        assert!(!fleet.is_empty());

        world.reset();
        fleet.step(&world, 13, &mut rng);
        assert!(fleet.is_empty());
    }
}
