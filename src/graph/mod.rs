//! Map graph - districts, landmarks and services joined by roads

mod route;

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    fmt, fs,
    path::Path,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scenario::ScenarioKind;

pub use route::{shortest_paths, ShortestPaths};

const KARACHI_MAP: &str = include_str!("karachi.yaml");

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    DistrictCenter,
    Residential,
    Commercial,
    Landmark,
    PublicService,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Road,
    Highway,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub category: NodeCategory,
    pub position: Coordinates,
    pub population: u64,
    pub infrastructure: f64,
    pub vulnerability: BTreeMap<ScenarioKind, f64>,
}

impl Node {
    /// Exposure to a scenario; a missing entry counts as fully exposed.
    pub fn vulnerability(&self, scenario: ScenarioKind) -> f64 {
        self.vulnerability.get(&scenario).copied().unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub distance: f64,
    pub kind: EdgeKind,
    pub blocked: bool,
}

impl Edge {
    pub fn touches(&self, id: NodeId) -> bool {
        self.from == id || self.to == id
    }
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("failed to read map file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse map: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("node id {0} defined more than once")]
    DuplicateNode(NodeId),
    #[error("edge {index} references unknown node {node}")]
    UnknownNode { index: usize, node: NodeId },
    #[error("edge {index} connects node {node} to itself")]
    SelfLoop { index: usize, node: NodeId },
    #[error("edge {index} has invalid distance {distance}")]
    InvalidDistance { index: usize, distance: f64 },
    #[error("node {node} has {field} {value} outside [0, 1]")]
    AttributeOutOfRange {
        node: NodeId,
        field: &'static str,
        value: f64,
    },
    #[error("command center {0} is not a node on the map")]
    UnknownCommandCenter(NodeId),
    #[error("map must define at least one node")]
    Empty,
}

#[derive(Debug, Deserialize)]
struct MapFile {
    name: String,
    command_center: u32,
    nodes: Vec<NodeSpec>,
    edges: Vec<EdgeSpec>,
}

#[derive(Debug, Deserialize)]
struct NodeSpec {
    id: u32,
    name: String,
    category: NodeCategory,
    lat: f64,
    lng: f64,
    #[serde(default)]
    population: u64,
    infrastructure: f64,
    #[serde(default)]
    vulnerability: BTreeMap<ScenarioKind, f64>,
}

#[derive(Debug, Deserialize)]
struct EdgeSpec {
    from: u32,
    to: u32,
    distance: f64,
    kind: EdgeKind,
}

/// Nodes sorted by id plus undirected edges. Only edge blockage changes after load.
#[derive(Debug, Clone)]
pub struct WorldGraph {
    name: String,
    command_center: NodeId,
    nodes: Vec<Node>,
    index: BTreeMap<NodeId, usize>,
    edges: Vec<Edge>,
}

impl WorldGraph {
    /// The built-in Karachi map with the PDMA office as command center.
    pub fn karachi() -> Result<Self, GraphError> {
        Self::from_yaml_str(KARACHI_MAP)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, GraphError> {
        let file: MapFile = serde_yaml::from_str(text)?;
        let nodes = file
            .nodes
            .into_iter()
            .map(|spec| Node {
                id: NodeId(spec.id),
                name: spec.name,
                category: spec.category,
                position: Coordinates {
                    lat: spec.lat,
                    lng: spec.lng,
                },
                population: spec.population,
                infrastructure: spec.infrastructure,
                vulnerability: spec.vulnerability,
            })
            .collect();
        let edges = file
            .edges
            .into_iter()
            .map(|spec| Edge {
                from: NodeId(spec.from),
                to: NodeId(spec.to),
                distance: spec.distance,
                kind: spec.kind,
                blocked: false,
            })
            .collect();
        Self::new(file.name, NodeId(file.command_center), nodes, edges)
    }

    pub fn new(
        name: impl Into<String>,
        command_center: NodeId,
        mut nodes: Vec<Node>,
        edges: Vec<Edge>,
    ) -> Result<Self, GraphError> {
        if nodes.is_empty() {
            return Err(GraphError::Empty);
        }
        nodes.sort_by_key(|node| node.id);

        let mut index = BTreeMap::new();
        for (position, node) in nodes.iter().enumerate() {
            if index.insert(node.id, position).is_some() {
                return Err(GraphError::DuplicateNode(node.id));
            }
            check_unit_range(node.id, "infrastructure", node.infrastructure)?;
            for value in node.vulnerability.values() {
                check_unit_range(node.id, "vulnerability", *value)?;
            }
        }

        for (i, edge) in edges.iter().enumerate() {
            for endpoint in [edge.from, edge.to] {
                if !index.contains_key(&endpoint) {
                    return Err(GraphError::UnknownNode {
                        index: i,
                        node: endpoint,
                    });
                }
            }
            if edge.from == edge.to {
                return Err(GraphError::SelfLoop {
                    index: i,
                    node: edge.from,
                });
            }
            if !(edge.distance.is_finite() && edge.distance > 0.0) {
                return Err(GraphError::InvalidDistance {
                    index: i,
                    distance: edge.distance,
                });
            }
        }

        if !index.contains_key(&command_center) {
            return Err(GraphError::UnknownCommandCenter(command_center));
        }

        Ok(Self {
            name: name.into(),
            command_center,
            nodes,
            index,
            edges,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command_center(&self) -> NodeId {
        self.command_center
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(|node| node.id)
    }

    pub(crate) fn index_of(&self, id: NodeId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn set_blocked(&mut self, edge: usize, blocked: bool) {
        if let Some(edge) = self.edges.get_mut(edge) {
            edge.blocked = blocked;
        }
    }

    pub fn unblock_all(&mut self) {
        for edge in &mut self.edges {
            edge.blocked = false;
        }
    }

    pub fn blocked_edges(&self) -> Vec<usize> {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, edge)| edge.blocked)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn blocked_count(&self) -> usize {
        self.edges.iter().filter(|edge| edge.blocked).count()
    }

    /// Indices of edges with at least one endpoint in `nodes`.
    pub fn edges_touching(&self, nodes: &BTreeSet<NodeId>) -> Vec<usize> {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, edge)| nodes.contains(&edge.from) || nodes.contains(&edge.to))
            .map(|(i, _)| i)
            .collect()
    }

    /// Adjacency over node indices, blocked edges left out.
    pub(crate) fn open_adjacency(&self) -> Vec<Vec<(usize, f64)>> {
        let mut adjacency = vec![Vec::new(); self.nodes.len()];
        for edge in self.edges.iter().filter(|edge| !edge.blocked) {
            let from = self.index[&edge.from];
            let to = self.index[&edge.to];
            adjacency[from].push((to, edge.distance));
            adjacency[to].push((from, edge.distance));
        }
        adjacency
    }

    /// Nodes with no open route from the command center.
    pub fn isolated_nodes(&self) -> Vec<NodeId> {
        let adjacency = self.open_adjacency();
        let start = self.index[&self.command_center];
        let mut seen = HashSet::from([start]);
        let mut stack = vec![start];
        while let Some(current) = stack.pop() {
            for &(next, _) in &adjacency[current] {
                if seen.insert(next) {
                    stack.push(next);
                }
            }
        }
        self.nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| !seen.contains(i))
            .map(|(_, node)| node.id)
            .collect()
    }
}

fn check_unit_range(node: NodeId, field: &'static str, value: f64) -> Result<(), GraphError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(GraphError::AttributeOutOfRange { node, field, value })
    }
}
