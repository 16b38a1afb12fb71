// assemble.rs
//
// Graph Assembler: joins surviving edges back to node metadata and emits
// the final D3-friendly {nodes, links} payload. Accepts raw or aggregated
// edge tables and aggregates raw input itself.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;

use crate::filtering::aggregate_edges;
use crate::models::{BipartiteGraph, EdgeTable, NodeRecord};

/// Label sentinel for nodes with no usable display field.
const UNKNOWN_LABEL: &str = "Unknown";

fn clean_str(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() || t.eq_ignore_ascii_case("nan") {
        None
    } else {
        Some(t.to_string())
    }
}

/// Resolve a node's display label: existing label, else name, else
/// mep_name, else the identifier itself (and Unknown as a last resort).
fn resolve_label(node: &NodeRecord) -> String {
    for candidate in [
        Some(node.label.as_str()),
        node.name.as_deref(),
        node.mep_name.as_deref(),
        Some(node.id.as_str()),
    ]
    .into_iter()
    .flatten()
    {
        if let Some(label) = clean_str(candidate) {
            return label;
        }
    }
    UNKNOWN_LABEL.to_string()
}

/// Build the final graph from the node table and the filtered edge table.
///
/// With keep_isolates=false, nodes absent from every surviving edge are
/// dropped. Nodes are deduplicated by id (first occurrence wins) so the
/// output satisfies the id-uniqueness invariant even when the mode union
/// repeats an id. Placeholder synthesis for edge endpoints missing from
/// the node table is the pipeline's job, not the assembler's.
pub fn build_graph(
    nodes: Vec<NodeRecord>,
    edges: EdgeTable,
    keep_isolates: bool,
) -> BipartiteGraph {
    let links = aggregate_edges(edges);

    let used: HashSet<&str> = links
        .iter()
        .flat_map(|l| [l.source.as_str(), l.target.as_str()])
        .collect();

    let mut seen: HashSet<String> = HashSet::new();
    let mut out_nodes: Vec<NodeRecord> = Vec::new();
    for mut node in nodes {
        if !keep_isolates && !used.contains(node.id.as_str()) {
            continue;
        }
        if !seen.insert(node.id.clone()) {
            continue;
        }
        node.label = resolve_label(&node);
        if node.node_type.trim().is_empty() {
            node.node_type = "unknown".to_string();
        }
        out_nodes.push(node);
    }

    info!(
        "Assembled graph: {} nodes | {} links",
        out_nodes.len(),
        links.len()
    );

    BipartiteGraph {
        nodes: out_nodes,
        links,
    }
}

/// Write the graph artifact as pretty-printed JSON.
pub fn save_json(graph: &BipartiteGraph, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory {}", parent.display()))?;
        }
    }
    let rendered =
        serde_json::to_string_pretty(graph).context("Failed to serialize graph to JSON")?;
    fs::write(path, rendered)
        .with_context(|| format!("Failed to write graph JSON to {}", path.display()))?;
    info!("Saved: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AggregatedEdge, EdgeRow};

    fn edge(source: &str, target: &str, weight: u64) -> AggregatedEdge {
        AggregatedEdge {
            source: source.to_string(),
            target: target.to_string(),
            weight,
            timestamps: vec![],
        }
    }

    fn node(id: &str, node_type: &str) -> NodeRecord {
        NodeRecord::new(id, node_type)
    }

    #[test]
    fn isolates_dropped_by_default() {
        let nodes = vec![node("a", "mep"), node("x", "org"), node("lonely", "org")];
        let edges = EdgeTable::Aggregated(vec![edge("a", "x", 1)]);
        let graph = build_graph(nodes, edges, false);
        let ids: Vec<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "x"]);
    }

    #[test]
    fn isolates_kept_on_request() {
        let nodes = vec![node("a", "mep"), node("x", "org"), node("lonely", "org")];
        let edges = EdgeTable::Aggregated(vec![edge("a", "x", 1)]);
        let graph = build_graph(nodes, edges, true);
        assert_eq!(graph.nodes.len(), 3);
    }

    #[test]
    fn raw_edges_are_aggregated_on_the_way_in() {
        let nodes = vec![node("a", "mep"), node("x", "org")];
        let edges = EdgeTable::Raw(vec![EdgeRow::new("a", "x"), EdgeRow::new("a", "x")]);
        let graph = build_graph(nodes, edges, false);
        assert_eq!(graph.links.len(), 1);
        assert_eq!(graph.links[0].weight, 2);
    }

    #[test]
    fn label_fallback_chain() {
        let mut labeled = node("n1", "org");
        labeled.label = "Shown".to_string();
        let mut named = node("n2", "org");
        named.name = Some("Named".to_string());
        let mut mep = node("n3", "mep");
        mep.mep_name = Some("Mep Name".to_string());
        let bare = node("n4", "org");
        let mut nan_label = node("n5", "org");
        nan_label.label = "nan".to_string();

        let graph = build_graph(vec![labeled, named, mep, bare, nan_label], EdgeTable::Aggregated(vec![]), true);
        let labels: Vec<&str> = graph.nodes.iter().map(|n| n.label.as_str()).collect();
        assert_eq!(labels, vec!["Shown", "Named", "Mep Name", "n4", "n5"]);
    }

    #[test]
    fn duplicate_ids_first_occurrence_wins() {
        let mut first = node("dup", "org");
        first.name = Some("First".to_string());
        let mut second = node("dup", "commission_employee");
        second.name = Some("Second".to_string());
        let graph = build_graph(vec![first, second], EdgeTable::Aggregated(vec![]), true);
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].name.as_deref(), Some("First"));
    }

    #[test]
    fn absent_attributes_are_omitted_from_json() {
        let graph = build_graph(vec![node("a", "mep")], EdgeTable::Aggregated(vec![]), true);
        let value = serde_json::to_value(&graph).unwrap();
        let first = &value["nodes"][0];
        assert_eq!(first["id"], "a");
        assert_eq!(first["type"], "mep");
        assert!(first.get("party").is_none());
        assert!(first.get("register_id").is_none());
    }
}
