// filtering.rs
//
// Structural filtering for bipartite edge collections: one-pass degree
// thresholds, iterative k-core pruning, and weight-based pruning over
// aggregated edges. Degree is always the incident raw-row count, not the
// aggregated-edge count, and every stage returns a fresh collection.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use log::{debug, info};

use crate::models::{AggregatedEdge, EdgeRow, EdgeTable};

/// Parse a raw timestamp value into an ISO-8601 UTC string. Returns None
/// for anything unparseable; callers drop those from timestamp lists.
pub fn coerce_timestamp(raw: &str) -> Option<String> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).format("%Y-%m-%dT%H:%M:%SZ").to_string());
    }

    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive).format("%Y-%m-%dT%H:%M:%SZ").to_string());
        }
    }

    for fmt in ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            let naive = date.and_hms_opt(0, 0, 0)?;
            return Some(Utc.from_utc_datetime(&naive).format("%Y-%m-%dT%H:%M:%SZ").to_string());
        }
    }

    None
}

fn count_by<'a, F>(rows: &'a [EdgeRow], key: F) -> HashMap<&'a str, i64>
where
    F: Fn(&'a EdgeRow) -> &'a str,
{
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for row in rows {
        *counts.entry(key(row)).or_insert(0) += 1;
    }
    counts
}

fn report_sizes(rows: &[EdgeRow], actor_label: &str) {
    let pairs: HashSet<(&str, &str)> = rows
        .iter()
        .map(|r| (r.source.as_str(), r.target.as_str()))
        .collect();
    let actors: HashSet<&str> = rows.iter().map(|r| r.source.as_str()).collect();
    let orgs: HashSet<&str> = rows.iter().map(|r| r.target.as_str()).collect();
    debug!(
        "  edge rows: {} | unique pairs: {} | unique {}s: {} | unique orgs: {}",
        rows.len(),
        pairs.len(),
        actor_label,
        actors.len(),
        orgs.len()
    );
}

/// One-pass degree thresholding on raw edge rows.
///
/// The org pass runs first, then the actor pass runs on the already
/// org-filtered rows. The order is observable (a later actor removal is
/// never re-checked against the org threshold) and must not be commuted.
/// A threshold of 1 or below skips that side's pass entirely.
pub fn filter_by_degree(
    rows: Vec<EdgeRow>,
    org_min_degree: i64,
    actor_min_degree: i64,
    actor_label: &str,
) -> Vec<EdgeRow> {
    info!(
        "Degree filter (one-pass): org_min_degree={}, actor_min_degree={}",
        org_min_degree, actor_min_degree
    );
    report_sizes(&rows, actor_label);

    let mut rows = rows;

    if org_min_degree > 1 {
        let org_deg = count_by(&rows, |r| r.target.as_str());
        let keep_orgs: HashSet<String> = org_deg
            .iter()
            .filter(|(_, &d)| d >= org_min_degree)
            .map(|(&id, _)| id.to_string())
            .collect();
        rows.retain(|r| keep_orgs.contains(r.target.as_str()));
    }

    if actor_min_degree > 1 {
        let act_deg = count_by(&rows, |r| r.source.as_str());
        let keep_actors: HashSet<String> = act_deg
            .iter()
            .filter(|(_, &d)| d >= actor_min_degree)
            .map(|(&id, _)| id.to_string())
            .collect();
        rows.retain(|r| keep_actors.contains(r.source.as_str()));
    }

    info!("Degree filter kept {} edge rows.", rows.len());
    report_sizes(&rows, actor_label);
    rows
}

/// Iterative bipartite k-core on raw edge rows: remove any node on either
/// side with degree < k, repeat until the row count stops changing or the
/// set is empty. Each pass that changes anything removes at least one row,
/// so the loop terminates in at most O(rows) iterations. k <= 1 disables.
pub fn k_core_prune(rows: Vec<EdgeRow>, k: i64, actor_label: &str) -> Vec<EdgeRow> {
    if k <= 1 {
        return rows;
    }

    info!("Bipartite {}-core pruning...", k);
    report_sizes(&rows, actor_label);

    let mut rows = rows;
    let mut iteration = 0;
    loop {
        if rows.is_empty() {
            break;
        }
        iteration += 1;

        let act_deg = count_by(&rows, |r| r.source.as_str());
        let org_deg = count_by(&rows, |r| r.target.as_str());

        let keep_actors: HashSet<String> = act_deg
            .iter()
            .filter(|(_, &d)| d >= k)
            .map(|(&id, _)| id.to_string())
            .collect();
        let keep_orgs: HashSet<String> = org_deg
            .iter()
            .filter(|(_, &d)| d >= k)
            .map(|(&id, _)| id.to_string())
            .collect();

        let before = rows.len();
        rows.retain(|r| {
            keep_actors.contains(r.source.as_str()) && keep_orgs.contains(r.target.as_str())
        });

        debug!("  iter {}: rows={}", iteration, rows.len());
        if rows.len() == before {
            break;
        }
    }

    info!("Bipartite {}-core kept {} edge rows after {} iterations.", k, rows.len(), iteration);
    report_sizes(&rows, actor_label);
    rows
}

/// Collapse raw rows into one edge per (source, target) pair. Weight is the
/// contributing row count; timestamps are the successfully parsed values
/// among those rows. Already-aggregated input passes through unchanged, so
/// re-running the aggregator never double-counts.
pub fn aggregate_edges(table: EdgeTable) -> Vec<AggregatedEdge> {
    match table {
        EdgeTable::Aggregated(edges) => edges,
        EdgeTable::Raw(rows) => {
            let mut grouped: BTreeMap<(String, String), (u64, Vec<String>)> = BTreeMap::new();
            for row in rows {
                let entry = grouped
                    .entry((row.source, row.target))
                    .or_insert_with(|| (0, Vec::new()));
                entry.0 += 1;
                if let Some(ts) = row.timestamp.as_deref().and_then(coerce_timestamp) {
                    entry.1.push(ts);
                }
            }
            grouped
                .into_iter()
                .map(|((source, target), (weight, timestamps))| AggregatedEdge {
                    source,
                    target,
                    weight,
                    timestamps,
                })
                .collect()
        }
    }
}

/// Aggregate edges and drop those with weight < min_weight. Runs after
/// degree/k-core pruning so weights reflect the pruned row set. A
/// min_weight of 1 or below is a no-op returning the input unchanged.
pub fn filter_by_weight(table: EdgeTable, min_weight: i64) -> EdgeTable {
    if min_weight <= 1 {
        return table;
    }

    let agg = aggregate_edges(table);
    let before = agg.len();
    let kept: Vec<AggregatedEdge> = agg
        .into_iter()
        .filter(|e| e.weight >= min_weight as u64)
        .collect();
    info!(
        "Edge weight filter: min_weight={}, edges before: {}, after: {}",
        min_weight,
        before,
        kept.len()
    );
    EdgeTable::Aggregated(kept)
}
