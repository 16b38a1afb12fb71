// graph_build.rs
//
// Mode-parameterized pipeline: load the source tables, assemble the node
// union and canonical (source, target, timestamp) edge rows for the
// requested bipartition, then run the structural filters in order —
// degree filter, k-core pruner, weight filter — and hand the result to
// the assembler. The same pipeline serves every mode; only the column
// roles differ.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use log::info;

use crate::assemble;
use crate::data_load;
use crate::filtering;
use crate::models::{BipartiteGraph, EdgeRow, EdgeTable, FilterParams, Mode, NodeRecord};
use crate::name_match::{attach_party_country, JaroWinklerMatcher};

/// Build the filtered bipartite graph for one mode. Pure function of the
/// source tables and parameters; every invocation reloads and recomputes.
pub fn build_graph_for_mode(
    mode: Mode,
    params: &FilterParams,
    data_dir: &Path,
) -> Result<BipartiteGraph> {
    info!("Building graph: mode={}, params={:?}", mode.as_str(), params);

    let org_nodes = data_load::load_orgs_table(data_dir)?;

    let mut nodes: Vec<NodeRecord> = Vec::new();
    let mut edges: Vec<EdgeRow> = Vec::new();
    let actor_label;

    match mode {
        Mode::Mep => {
            let meetings = data_load::load_meetings(data_dir)?;
            let mut mep_nodes = meetings.mep_nodes;
            let lookup = data_load::load_ep_lookup(data_dir)?;
            attach_party_country(&mut mep_nodes, &lookup, &JaroWinklerMatcher::default());

            nodes.extend(org_nodes);
            nodes.extend(mep_nodes);
            edges.extend(meetings.edges);
            actor_label = "MEP";
        }
        Mode::Commission => {
            let commission = data_load::load_commission(data_dir)?;
            let master_ids: HashSet<String> = org_nodes.iter().map(|n| n.id.clone()).collect();
            let inferred = data_load::infer_unmatched_org_nodes(&commission, &master_ids);
            if !inferred.is_empty() {
                info!("Inferred {} org nodes missing from the master table.", inferred.len());
            }

            nodes.extend(org_nodes);
            nodes.extend(inferred);
            nodes.extend(commission.host_nodes());
            edges.extend(commission.edges());
            actor_label = "Commission";
        }
        Mode::Full => {
            let meetings = data_load::load_meetings(data_dir)?;
            let mut mep_nodes = meetings.mep_nodes;
            let lookup = data_load::load_ep_lookup(data_dir)?;
            attach_party_country(&mut mep_nodes, &lookup, &JaroWinklerMatcher::default());

            let commission = data_load::load_commission(data_dir)?;
            let master_ids: HashSet<String> = org_nodes.iter().map(|n| n.id.clone()).collect();
            let inferred = data_load::infer_unmatched_org_nodes(&commission, &master_ids);
            if !inferred.is_empty() {
                info!("Inferred {} org nodes missing from the master table.", inferred.len());
            }

            nodes.extend(org_nodes);
            nodes.extend(inferred);
            nodes.extend(mep_nodes);
            nodes.extend(commission.host_nodes());
            edges.extend(meetings.edges);
            edges.extend(commission.edges());
            actor_label = "Actor";
        }
    }

    info!("Edge rows (pre-filter): {}", edges.len());

    // Structural filtering, identical across modes: one-pass degree
    // thresholds, then the iterative k-core, then weight pruning on the
    // already-pruned row set.
    let edges = filtering::filter_by_degree(
        edges,
        params.org_min_degree,
        params.actor_min_degree,
        actor_label,
    );
    let edges = filtering::k_core_prune(edges, params.bipartite_k_core, actor_label);
    let table = filtering::filter_by_weight(EdgeTable::Raw(edges), params.min_edge_weight);
    info!("Edge table (post-filter): {} rows", table.len());

    let mut graph = assemble::build_graph(nodes, table, params.keep_isolates);
    repair_missing_endpoints(&mut graph);

    Ok(graph)
}

/// Post-assembly consistency repair: any edge endpoint absent from the
/// node table gets a placeholder org node, so every link resolves.
fn repair_missing_endpoints(graph: &mut BipartiteGraph) {
    let node_ids: HashSet<String> = graph.nodes.iter().map(|n| n.id.clone()).collect();
    let mut missing: Vec<&str> = graph
        .links
        .iter()
        .flat_map(|l| [l.source.as_str(), l.target.as_str()])
        .filter(|id| !node_ids.contains(*id))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    missing.sort_unstable();

    if missing.is_empty() {
        return;
    }
    info!("Synthesizing {} placeholder nodes for unmatched edge endpoints.", missing.len());
    let placeholders: Vec<NodeRecord> = missing
        .into_iter()
        .map(NodeRecord::placeholder_org)
        .collect();
    graph.nodes.extend(placeholders);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AggregatedEdge;
    use std::fs;

    fn fixture_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(data_load::ORG_FILE_JSON),
            r#"[
                {"id": "o1", "name": "Acme Lobby", "eu_transparency_register_id": "TR-1"},
                {"id": "o2", "name": "Roundtable"},
                {"id": "o9", "name": "Unconnected Org"}
            ]"#,
        )
        .unwrap();
        fs::write(
            dir.path().join(data_load::MEETINGS_FILE),
            r#"[
                {"mep_id": "m1", "organization_id": "o1",
                 "source_data": {"mep_name": "Anna Garcia"}, "meeting_date": "2023-01-10"},
                {"mep_id": "m1", "organization_id": "o1",
                 "source_data": {"mep_name": "Anna Garcia"}, "meeting_date": "2023-02-11"},
                {"mep_id": "m2", "organization_id": "o1",
                 "source_data": {"mep_name": "Jan Kowalski"}, "meeting_date": "bad value"},
                {"mep_id": "m2", "organization_id": "o2",
                 "source_data": {"mep_name": "Jan Kowalski"}, "meeting_date": "2023-03-12"}
            ]"#,
        )
        .unwrap();
        fs::write(
            dir.path().join(data_load::COMMISSION_FILE),
            "Host,OrgId,Org,StartDate\n\
             h1,o1,Acme Lobby,2022-03-01\n\
             h1,o3,Shadow Org,2022-04-01\n\
             h2,o3,Shadow Org,2022-05-01\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(data_load::EP_MEPS_FILE),
            "name,party,country\nAnna Garcia,S&D,Spain\nJan Kowalski,EPP,Poland\n",
        )
        .unwrap();
        dir
    }

    fn find_node<'a>(graph: &'a BipartiteGraph, id: &str) -> &'a NodeRecord {
        graph.nodes.iter().find(|n| n.id == id).unwrap()
    }

    fn find_link<'a>(graph: &'a BipartiteGraph, source: &str, target: &str) -> &'a AggregatedEdge {
        graph
            .links
            .iter()
            .find(|l| l.source == source && l.target == target)
            .unwrap()
    }

    #[test]
    fn mep_mode_attaches_party_and_aggregates_timestamps() {
        let dir = fixture_dir();
        let params = FilterParams {
            org_min_degree: 1,
            ..FilterParams::default()
        };
        let graph = build_graph_for_mode(Mode::Mep, &params, dir.path()).unwrap();

        let m1 = find_node(&graph, "m1");
        assert_eq!(m1.party.as_deref(), Some("S&D"));
        assert_eq!(m1.label, "Anna Garcia");

        let link = find_link(&graph, "m1", "o1");
        assert_eq!(link.weight, 2);
        assert_eq!(
            link.timestamps,
            vec!["2023-01-10T00:00:00Z".to_string(), "2023-02-11T00:00:00Z".to_string()]
        );
        // Unparseable timestamp contributes to weight but not to the list.
        let link = find_link(&graph, "m2", "o1");
        assert_eq!(link.weight, 1);
        assert!(link.timestamps.is_empty());
    }

    #[test]
    fn default_degree_filter_drops_single_contact_orgs() {
        let dir = fixture_dir();
        let graph = build_graph_for_mode(Mode::Mep, &FilterParams::default(), dir.path()).unwrap();
        // o2 has a single incident row and falls to the org threshold of 2.
        assert!(graph.nodes.iter().all(|n| n.id != "o2"));
        assert!(graph.links.iter().all(|l| l.target != "o2"));
    }

    #[test]
    fn commission_mode_infers_unmatched_orgs() {
        let dir = fixture_dir();
        let params = FilterParams {
            org_min_degree: 1,
            ..FilterParams::default()
        };
        let graph = build_graph_for_mode(Mode::Commission, &params, dir.path()).unwrap();
        let shadow = find_node(&graph, "o3");
        assert_eq!(shadow.node_type, "org");
        assert_eq!(shadow.label, "Shadow Org");
        assert_eq!(find_node(&graph, "h1").node_type, "commission_employee");
    }

    #[test]
    fn full_mode_merges_both_edge_sources() {
        let dir = fixture_dir();
        let params = FilterParams {
            org_min_degree: 1,
            ..FilterParams::default()
        };
        let graph = build_graph_for_mode(Mode::Full, &params, dir.path()).unwrap();
        assert!(graph.links.iter().any(|l| l.source == "m1"));
        assert!(graph.links.iter().any(|l| l.source == "h1"));
        // Isolated master org is dropped without keep_isolates.
        assert!(graph.nodes.iter().all(|n| n.id != "o9"));
    }

    #[test]
    fn keep_isolates_retains_master_nodes() {
        let dir = fixture_dir();
        let params = FilterParams {
            org_min_degree: 1,
            keep_isolates: true,
            ..FilterParams::default()
        };
        let graph = build_graph_for_mode(Mode::Full, &params, dir.path()).unwrap();
        assert!(graph.nodes.iter().any(|n| n.id == "o9"));
    }

    #[test]
    fn every_link_endpoint_resolves_to_a_node() {
        let dir = fixture_dir();
        let params = FilterParams {
            org_min_degree: 1,
            ..FilterParams::default()
        };
        for mode in [Mode::Mep, Mode::Commission, Mode::Full] {
            let graph = build_graph_for_mode(mode, &params, dir.path()).unwrap();
            let ids: HashSet<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
            for link in &graph.links {
                assert!(ids.contains(link.source.as_str()));
                assert!(ids.contains(link.target.as_str()));
            }
        }
    }

    #[test]
    fn min_edge_weight_prunes_one_off_ties() {
        let dir = fixture_dir();
        let params = FilterParams {
            org_min_degree: 1,
            min_edge_weight: 2,
            ..FilterParams::default()
        };
        let graph = build_graph_for_mode(Mode::Mep, &params, dir.path()).unwrap();
        assert_eq!(graph.links.len(), 1);
        assert_eq!(graph.links[0].source, "m1");
        assert_eq!(graph.links[0].weight, 2);
    }

    #[test]
    fn high_k_core_empties_the_sparse_fixture() {
        let dir = fixture_dir();
        let params = FilterParams {
            org_min_degree: 1,
            bipartite_k_core: 3,
            ..FilterParams::default()
        };
        let graph = build_graph_for_mode(Mode::Mep, &params, dir.path()).unwrap();
        assert!(graph.links.is_empty());
        assert!(graph.nodes.is_empty());
    }
}
