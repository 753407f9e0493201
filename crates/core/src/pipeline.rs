//! Static catalog of the solver pipeline: its nodes, their display groups,
//! and the directed edges between them.
//!
//! The set is fixed at compile time. Widgets hold per-node state keyed by
//! these ids and never add or remove nodes at runtime.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum NodeGroup {
    Parsing,
    Planning,
    Calculation,
    Generation,
    Explanation,
}

impl NodeGroup {
    pub const ALL: [NodeGroup; 5] = [
        NodeGroup::Parsing,
        NodeGroup::Planning,
        NodeGroup::Calculation,
        NodeGroup::Generation,
        NodeGroup::Explanation,
    ];

    /// Column index used when laying the graph out left to right.
    pub fn column(&self) -> usize {
        match self {
            Self::Parsing => 0,
            Self::Planning => 1,
            Self::Calculation => 2,
            Self::Generation => 3,
            Self::Explanation => 4,
        }
    }
}

impl fmt::Display for NodeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parsing => write!(f, "parsing"),
            Self::Planning => write!(f, "planning"),
            Self::Calculation => write!(f, "calculation"),
            Self::Generation => write!(f, "generation"),
            Self::Explanation => write!(f, "explanation"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineNode {
    pub id: &'static str,
    pub name: &'static str,
    pub group: NodeGroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub from: &'static str,
    pub to: &'static str,
}

const fn node(id: &'static str, name: &'static str, group: NodeGroup) -> PipelineNode {
    PipelineNode { id, name, group }
}

const fn edge(from: &'static str, to: &'static str) -> Edge {
    Edge { from, to }
}

/// Pipeline nodes in execution order.
pub const NODES: &[PipelineNode] = &[
    node("parsing_agent", "Problem parsing", NodeGroup::Parsing),
    node("planner_agent", "Solution planning", NodeGroup::Planning),
    node("calculation_manager_agent", "Calculation manager", NodeGroup::Calculation),
    node("calculation_router_agent", "Calculation router", NodeGroup::Calculation),
    node("triangle_calculation_agent", "Triangle calculation", NodeGroup::Calculation),
    node("circle_calculation_agent", "Circle calculation", NodeGroup::Calculation),
    node("angle_calculation_agent", "Angle calculation", NodeGroup::Calculation),
    node("length_calculation_agent", "Length calculation", NodeGroup::Calculation),
    node("area_calculation_agent", "Area calculation", NodeGroup::Calculation),
    node("coordinate_calculation_agent", "Coordinate calculation", NodeGroup::Calculation),
    node("calculation_result_merger_agent", "Result merging", NodeGroup::Calculation),
    node("command_retrieval_agent", "Command retrieval", NodeGroup::Generation),
    node("command_generation_agent", "Command generation", NodeGroup::Generation),
    node("validation_agent", "Command validation", NodeGroup::Generation),
    node("command_regeneration_agent", "Command regeneration", NodeGroup::Generation),
    node("explanation_agent", "Explanation", NodeGroup::Explanation),
];

/// Directed pipeline edges. The router fans out to the calculators and each
/// calculator reports back, so the graph is cyclic.
pub const EDGES: &[Edge] = &[
    edge("parsing_agent", "planner_agent"),
    edge("planner_agent", "calculation_manager_agent"),
    edge("planner_agent", "command_retrieval_agent"),
    edge("calculation_manager_agent", "calculation_router_agent"),
    edge("calculation_router_agent", "triangle_calculation_agent"),
    edge("calculation_router_agent", "circle_calculation_agent"),
    edge("calculation_router_agent", "angle_calculation_agent"),
    edge("calculation_router_agent", "length_calculation_agent"),
    edge("calculation_router_agent", "area_calculation_agent"),
    edge("calculation_router_agent", "coordinate_calculation_agent"),
    edge("calculation_router_agent", "calculation_result_merger_agent"),
    edge("triangle_calculation_agent", "calculation_router_agent"),
    edge("circle_calculation_agent", "calculation_router_agent"),
    edge("angle_calculation_agent", "calculation_router_agent"),
    edge("length_calculation_agent", "calculation_router_agent"),
    edge("area_calculation_agent", "calculation_router_agent"),
    edge("coordinate_calculation_agent", "calculation_router_agent"),
    edge("calculation_result_merger_agent", "command_retrieval_agent"),
    edge("command_retrieval_agent", "command_generation_agent"),
    edge("command_generation_agent", "validation_agent"),
    edge("validation_agent", "explanation_agent"),
    edge("validation_agent", "command_regeneration_agent"),
    edge("command_regeneration_agent", "explanation_agent"),
    edge("command_regeneration_agent", "validation_agent"),
];

pub fn node_by_id(id: &str) -> Option<&'static PipelineNode> {
    NODES.iter().find(|n| n.id == id)
}

pub fn is_known(id: &str) -> bool {
    node_by_id(id).is_some()
}

/// Human-readable name, falling back to the raw id.
pub fn display_name(id: &str) -> &str {
    node_by_id(id).map(|n| n.name).unwrap_or(id)
}

pub fn group_nodes(group: NodeGroup) -> impl Iterator<Item = &'static PipelineNode> {
    NODES.iter().filter(move |n| n.group == group)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_sizes() {
        assert_eq!(NODES.len(), 16);
        assert_eq!(EDGES.len(), 24);
    }

    #[test]
    fn test_edges_reference_known_nodes() {
        for e in EDGES {
            assert!(is_known(e.from), "unknown edge source {}", e.from);
            assert!(is_known(e.to), "unknown edge target {}", e.to);
        }
    }

    #[test]
    fn test_node_ids_unique() {
        let mut ids: Vec<_> = NODES.iter().map(|n| n.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), NODES.len());
    }

    #[test]
    fn test_groups_cover_all_nodes() {
        let total: usize = NodeGroup::ALL.iter().map(|g| group_nodes(*g).count()).sum();
        assert_eq!(total, NODES.len());
        assert_eq!(group_nodes(NodeGroup::Calculation).count(), 9);
    }

    #[test]
    fn test_display_name_fallback() {
        assert_eq!(display_name("planner_agent"), "Solution planning");
        assert_eq!(display_name("mystery_agent"), "mystery_agent");
    }
}
