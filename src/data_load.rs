// data_load.rs
//
// Loaders for the heterogeneous source tables: the organization master
// (JSON, else CSV), the meetings table (JSON, possibly with nested
// source_data), the commission contacts CSV, and the EP lookup CSV.
// Parsing is separated from file I/O so the schema handling is testable
// without fixtures on disk. Missing required columns are fatal; missing
// timestamps never are.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use serde_json::Value;

use crate::models::{EdgeRow, NodeRecord};
use crate::name_match::{norm_name, EpLookup};

pub const ORG_FILE_JSON: &str = "organizations_preprocessed.json";
pub const ORG_FILE_CSV: &str = "organizations_preprocessed.csv";
pub const MEETINGS_FILE: &str = "meetings_data_clean.json";
pub const COMMISSION_FILE: &str = "IW EU_datasets_com.csv";
pub const EP_MEPS_FILE: &str = "ep_meps_scraped.csv";

/// Column names that may carry a usable timestamp, in priority order.
const TIMESTAMP_CANDIDATES: [&str; 13] = [
    "meeting_date",
    "meeting_datetime",
    "timestamp",
    "datetime",
    "date",
    "created_at",
    "start_date",
    "StartDate",
    "Start date",
    "MeetingDate",
    "Date",
    "DATE",
    "time",
];

/// Column names that may carry an organization display name in the
/// commission table, in priority order.
const ORG_NAME_CANDIDATES: [&str; 8] = [
    "Org",
    "Organisation",
    "Organization",
    "Entity",
    "OrgName",
    "OrganisationName",
    "OrganizationName",
    "Name",
];

/// Pick the first known timestamp column present in the table.
pub fn guess_timestamp_column<S: AsRef<str>>(columns: &[S]) -> Option<&'static str> {
    TIMESTAMP_CANDIDATES
        .iter()
        .find(|c| columns.iter().any(|col| col.as_ref() == **c))
        .copied()
}

/// Stringify a JSON scalar the way the sources use ids: numbers lose no
/// precision, blanks and nulls become None.
fn value_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                Some(s.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn non_blank(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

// ---------------------------------------------------------------------------
// Organization master table
// ---------------------------------------------------------------------------

pub fn parse_orgs_json(value: &Value) -> Result<Vec<NodeRecord>> {
    let rows = value
        .as_array()
        .context("orgs table JSON must be an array of records")?;

    let mut nodes = Vec::with_capacity(rows.len());
    for row in rows {
        let obj = row
            .as_object()
            .context("orgs table JSON rows must be objects")?;

        let id = obj
            .get("id")
            .and_then(value_to_string)
            .context("orgs table must include column 'id'")?;
        let name = obj
            .get("name")
            .and_then(value_to_string)
            .context("orgs table must include column 'name'")?;

        // The register id column appears under its long name in some dumps.
        let register_id = obj
            .get("register_id")
            .or_else(|| obj.get("eu_transparency_register_id"))
            .and_then(value_to_string);
        let interests_represented = obj.get("interests_represented").and_then(value_to_string);

        nodes.push(NodeRecord {
            label: name.clone(),
            name: Some(name),
            register_id,
            interests_represented,
            ..NodeRecord::new(id, "org")
        });
    }
    Ok(nodes)
}

pub fn parse_orgs_csv<R: std::io::Read>(reader: R) -> Result<Vec<NodeRecord>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers().context("orgs CSV has no header row")?.clone();

    let col = |name: &str| headers.iter().position(|h| h == name);
    let id_idx = col("id").context("orgs table must include column 'id'")?;
    let name_idx = col("name").context("orgs table must include column 'name'")?;
    let register_idx = col("register_id").or_else(|| col("eu_transparency_register_id"));
    let interests_idx = col("interests_represented");

    let mut nodes = Vec::new();
    for record in rdr.records() {
        let record = record.context("Failed to read orgs CSV record")?;
        let id = match record.get(id_idx).and_then(non_blank) {
            Some(id) => id,
            None => continue,
        };
        let name = record.get(name_idx).and_then(non_blank).unwrap_or_else(|| id.clone());
        nodes.push(NodeRecord {
            label: name.clone(),
            name: Some(name),
            register_id: register_idx.and_then(|i| record.get(i)).and_then(non_blank),
            interests_represented: interests_idx.and_then(|i| record.get(i)).and_then(non_blank),
            ..NodeRecord::new(id, "org")
        });
    }
    Ok(nodes)
}

/// Load the organization master table, preferring the JSON dump and
/// falling back to the CSV. Missing both is fatal.
pub fn load_orgs_table(data_dir: &Path) -> Result<Vec<NodeRecord>> {
    let json_path = data_dir.join(ORG_FILE_JSON);
    let csv_path = data_dir.join(ORG_FILE_CSV);

    let nodes = if json_path.exists() {
        let raw = fs::read_to_string(&json_path)
            .with_context(|| format!("Failed to read {}", json_path.display()))?;
        let value: Value = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", json_path.display()))?;
        parse_orgs_json(&value)?
    } else if csv_path.exists() {
        let file = fs::File::open(&csv_path)
            .with_context(|| format!("Failed to open {}", csv_path.display()))?;
        parse_orgs_csv(file)?
    } else {
        anyhow::bail!(
            "Could not find {} or {} under {}",
            ORG_FILE_JSON,
            ORG_FILE_CSV,
            data_dir.display()
        );
    };

    info!("Loaded {} organization master nodes.", nodes.len());
    Ok(nodes)
}

// ---------------------------------------------------------------------------
// Meetings table
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct MeetingsData {
    /// Canonical (mep_id, organization_id, timestamp) rows.
    pub edges: Vec<EdgeRow>,
    /// Distinct MEP nodes, party/country not yet attached.
    pub mep_nodes: Vec<NodeRecord>,
    /// Which column the timestamps came from, if any.
    pub timestamp_column: Option<&'static str>,
}

pub fn parse_meetings(value: &Value) -> Result<MeetingsData> {
    let rows = value
        .as_array()
        .context("meetings_data_clean.json must be an array of records")?;

    // Columns are the union of keys across rows; sparse sources are common.
    let mut columns: HashSet<&str> = HashSet::new();
    for row in rows {
        if let Some(obj) = row.as_object() {
            columns.extend(obj.keys().map(|k| k.as_str()));
        }
    }

    if !columns.contains("mep_id") || !columns.contains("organization_id") {
        anyhow::bail!("meetings_data_clean.json must include 'mep_id' and 'organization_id'");
    }

    let column_vec: Vec<&str> = columns.iter().copied().collect();
    let ts_col = guess_timestamp_column(&column_vec);
    let has_nested_name = columns.contains("source_data");

    let mut edges = Vec::with_capacity(rows.len());
    let mut mep_nodes: Vec<NodeRecord> = Vec::new();
    let mut seen_meps: HashSet<String> = HashSet::new();

    for row in rows {
        let obj = match row.as_object() {
            Some(obj) => obj,
            None => continue,
        };
        let mep_id = match obj.get("mep_id").and_then(value_to_string) {
            Some(id) => id,
            None => continue,
        };
        let org_id = match obj.get("organization_id").and_then(value_to_string) {
            Some(id) => id,
            None => continue,
        };

        // MEP name lives either nested under source_data or flat.
        let mep_name = if has_nested_name {
            obj.get("source_data")
                .and_then(|v| v.get("mep_name"))
                .and_then(value_to_string)
        } else {
            obj.get("mep_name").and_then(value_to_string)
        };

        if seen_meps.insert(mep_id.clone()) {
            mep_nodes.push(NodeRecord {
                label: mep_name.clone().unwrap_or_default(),
                mep_name,
                ..NodeRecord::new(mep_id.clone(), "mep")
            });
        }

        let timestamp = ts_col.and_then(|c| obj.get(c)).and_then(value_to_string);
        edges.push(EdgeRow {
            source: mep_id,
            target: org_id,
            timestamp,
        });
    }

    Ok(MeetingsData {
        edges,
        mep_nodes,
        timestamp_column: ts_col,
    })
}

pub fn load_meetings(data_dir: &Path) -> Result<MeetingsData> {
    let path = data_dir.join(MEETINGS_FILE);
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value =
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))?;
    let data = parse_meetings(&value)?;
    info!(
        "Loaded {} meeting rows ({} distinct MEPs) | timestamp column: {:?}",
        data.edges.len(),
        data.mep_nodes.len(),
        data.timestamp_column
    );
    Ok(data)
}

// ---------------------------------------------------------------------------
// Commission contacts table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CommissionRow {
    pub host: String,
    pub org_id: String,
    /// Display name from the first matching name candidate column, if any.
    pub org_name: Option<String>,
    pub timestamp: Option<String>,
}

#[derive(Debug)]
pub struct CommissionData {
    pub rows: Vec<CommissionRow>,
    pub timestamp_column: Option<&'static str>,
}

impl CommissionData {
    /// Canonical (host, org_id, timestamp) edge rows.
    pub fn edges(&self) -> Vec<EdgeRow> {
        self.rows
            .iter()
            .map(|r| EdgeRow {
                source: r.host.clone(),
                target: r.org_id.clone(),
                timestamp: r.timestamp.clone(),
            })
            .collect()
    }

    /// Distinct commission-employee nodes; hosts carry no attributes
    /// beyond their own identifier.
    pub fn host_nodes(&self) -> Vec<NodeRecord> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut nodes = Vec::new();
        for row in &self.rows {
            if seen.insert(row.host.as_str()) {
                nodes.push(NodeRecord {
                    label: row.host.clone(),
                    name: Some(row.host.clone()),
                    ..NodeRecord::new(row.host.clone(), "commission_employee")
                });
            }
        }
        nodes
    }
}

pub fn parse_commission<R: std::io::Read>(reader: R) -> Result<CommissionData> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr
        .headers()
        .context("Commission CSV has no header row")?
        .clone();

    let col = |name: &str| headers.iter().position(|h| h == name);
    let host_idx = col("Host").context("Commission CSV must include 'Host' and 'OrgId'")?;
    let org_idx = col("OrgId").context("Commission CSV must include 'Host' and 'OrgId'")?;

    let header_vec: Vec<&str> = headers.iter().collect();
    let ts_col = guess_timestamp_column(&header_vec);
    let ts_idx = ts_col.and_then(|c| col(c));
    let name_idx = ORG_NAME_CANDIDATES.iter().copied().find_map(|c| col(c));

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.context("Failed to read commission CSV record")?;
        let host = match record.get(host_idx).and_then(non_blank) {
            Some(h) => h,
            None => continue,
        };
        let org_id = match record.get(org_idx).and_then(non_blank) {
            Some(o) => o,
            None => continue,
        };
        rows.push(CommissionRow {
            host,
            org_id,
            org_name: name_idx.and_then(|i| record.get(i)).and_then(non_blank),
            timestamp: ts_idx.and_then(|i| record.get(i)).and_then(non_blank),
        });
    }

    Ok(CommissionData {
        rows,
        timestamp_column: ts_col,
    })
}

pub fn load_commission(data_dir: &Path) -> Result<CommissionData> {
    let path = data_dir.join(COMMISSION_FILE);
    let file =
        fs::File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;
    let data = parse_commission(file)?;
    info!(
        "Loaded {} commission rows | timestamp column: {:?}",
        data.rows.len(),
        data.timestamp_column
    );
    Ok(data)
}

/// Synthesize org node metadata for OrgIds present in the commission table
/// but absent from the master table. The first non-blank display name seen
/// for an id wins; ids with no usable name fall back to the id itself.
pub fn infer_unmatched_org_nodes(
    commission: &CommissionData,
    master_ids: &HashSet<String>,
) -> Vec<NodeRecord> {
    let mut missing: Vec<&str> = commission
        .rows
        .iter()
        .map(|r| r.org_id.as_str())
        .filter(|id| !master_ids.contains(*id))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    missing.sort_unstable();

    if missing.is_empty() {
        return Vec::new();
    }

    let mut id_to_name: HashMap<&str, &str> = HashMap::new();
    for row in &commission.rows {
        if let Some(name) = row.org_name.as_deref() {
            id_to_name.entry(row.org_id.as_str()).or_insert(name);
        }
    }

    missing
        .into_iter()
        .map(|id| {
            let name = id_to_name.get(id).copied().unwrap_or(id).to_string();
            NodeRecord {
                label: name.clone(),
                name: Some(name),
                ..NodeRecord::new(id, "org")
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// EP lookup table
// ---------------------------------------------------------------------------

pub fn parse_ep_lookup<R: std::io::Read>(reader: R) -> Result<EpLookup> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr
        .headers()
        .context("EP lookup CSV has no header row")?
        .clone();

    let col = |name: &str| headers.iter().position(|h| h == name);
    let norm_idx = col("norm_name");
    let name_idx = col("name");
    if norm_idx.is_none() && name_idx.is_none() {
        anyhow::bail!("{} must have either 'norm_name' or 'name'", EP_MEPS_FILE);
    }
    let party_idx = col("party")
        .with_context(|| format!("{} must include columns: party, country", EP_MEPS_FILE))?;
    let country_idx = col("country")
        .with_context(|| format!("{} must include columns: party, country", EP_MEPS_FILE))?;

    let mut map = HashMap::new();
    for record in rdr.records() {
        let record = record.context("Failed to read EP lookup CSV record")?;
        let key = match norm_idx {
            Some(i) => record.get(i).and_then(non_blank),
            None => name_idx
                .and_then(|i| record.get(i))
                .and_then(non_blank)
                .map(|n| norm_name(&n)),
        };
        let key = match key {
            Some(k) => k,
            None => continue,
        };
        let party = record.get(party_idx).and_then(non_blank).unwrap_or_default();
        let country = record
            .get(country_idx)
            .and_then(non_blank)
            .unwrap_or_default();
        map.insert(key, (party, country));
    }

    Ok(EpLookup::new(map))
}

pub fn load_ep_lookup(data_dir: &Path) -> Result<EpLookup> {
    let path = data_dir.join(EP_MEPS_FILE);
    let file =
        fs::File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;
    let lookup = parse_ep_lookup(file)?;
    info!("Loaded EP lookup with {} entries.", lookup.len());
    Ok(lookup)
}

/// Resolve the data directory, preferring an explicit override.
pub fn resolve_data_dir(override_dir: Option<&Path>) -> PathBuf {
    match override_dir {
        Some(dir) => dir.to_path_buf(),
        None => crate::env_loader::data_dir(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn guess_timestamp_column_follows_priority_order() {
        assert_eq!(
            guess_timestamp_column(&["foo", "date", "meeting_date"]),
            Some("meeting_date")
        );
        assert_eq!(guess_timestamp_column(&["Date", "time"]), Some("Date"));
        assert_eq!(guess_timestamp_column(&["foo", "bar"]), None);
    }

    #[test]
    fn parse_orgs_json_renames_register_id() {
        let value = json!([
            {"id": 7, "name": "Acme Lobby", "eu_transparency_register_id": "TR-1"},
            {"id": "8", "name": "Roundtable", "interests_represented": "Energy"}
        ]);
        let nodes = parse_orgs_json(&value).unwrap();
        assert_eq!(nodes[0].id, "7");
        assert_eq!(nodes[0].register_id.as_deref(), Some("TR-1"));
        assert_eq!(nodes[0].node_type, "org");
        assert_eq!(nodes[0].label, "Acme Lobby");
        assert_eq!(nodes[1].interests_represented.as_deref(), Some("Energy"));
    }

    #[test]
    fn parse_orgs_json_missing_required_column_is_fatal() {
        let value = json!([{"id": 1}]);
        let err = parse_orgs_json(&value).unwrap_err();
        assert!(err.to_string().contains("'name'"));
    }

    #[test]
    fn parse_meetings_extracts_nested_mep_name() {
        let value = json!([
            {"mep_id": "m1", "organization_id": "o1",
             "source_data": {"mep_name": "Anna Garcia"}, "meeting_date": "2023-01-10"},
            {"mep_id": "m1", "organization_id": "o2",
             "source_data": {"mep_name": "Anna Garcia"}, "meeting_date": "2023-02-11"}
        ]);
        let data = parse_meetings(&value).unwrap();
        assert_eq!(data.edges.len(), 2);
        assert_eq!(data.mep_nodes.len(), 1);
        assert_eq!(data.mep_nodes[0].mep_name.as_deref(), Some("Anna Garcia"));
        assert_eq!(data.timestamp_column, Some("meeting_date"));
        assert_eq!(data.edges[0].timestamp.as_deref(), Some("2023-01-10"));
    }

    #[test]
    fn parse_meetings_requires_id_columns() {
        let value = json!([{"mep_id": "m1", "org": "o1"}]);
        let err = parse_meetings(&value).unwrap_err();
        assert!(err.to_string().contains("organization_id"));
    }

    #[test]
    fn parse_commission_reads_hosts_orgs_and_timestamps() {
        let csv_data = "Host,OrgId,Org,StartDate\nh1,o1,Acme,2022-03-01\nh1,o2,,2022-04-01\nh2,o1,Acme,\n";
        let data = parse_commission(csv_data.as_bytes()).unwrap();
        assert_eq!(data.rows.len(), 3);
        assert_eq!(data.timestamp_column, Some("StartDate"));
        let edges = data.edges();
        assert_eq!(edges[0].timestamp.as_deref(), Some("2022-03-01"));
        assert_eq!(edges[2].timestamp, None);
        let hosts = data.host_nodes();
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].node_type, "commission_employee");
    }

    #[test]
    fn parse_commission_missing_columns_is_fatal() {
        let csv_data = "Host,Organisation\nh1,Acme\n";
        let err = parse_commission(csv_data.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("OrgId"));
    }

    #[test]
    fn infer_unmatched_orgs_uses_first_nonblank_name() {
        let csv_data = "Host,OrgId,Org\nh1,o1,\nh1,o1,Acme Lobby\nh2,o2,Roundtable\nh2,o3,\n";
        let data = parse_commission(csv_data.as_bytes()).unwrap();
        let master: HashSet<String> = ["o2".to_string()].into_iter().collect();
        let inferred = infer_unmatched_org_nodes(&data, &master);
        assert_eq!(inferred.len(), 2);
        assert_eq!(inferred[0].id, "o1");
        assert_eq!(inferred[0].name.as_deref(), Some("Acme Lobby"));
        // No usable name: the id stands in.
        assert_eq!(inferred[1].id, "o3");
        assert_eq!(inferred[1].label, "o3");
    }

    #[test]
    fn parse_ep_lookup_normalizes_when_only_name_present() {
        let csv_data = "name,party,country\nAnna  Garcia,S&D,Spain\n";
        let lookup = parse_ep_lookup(csv_data.as_bytes()).unwrap();
        let (party, country) = lookup.resolve(
            "Anna Garcia",
            &crate::name_match::JaroWinklerMatcher::default(),
        );
        assert_eq!(party, "S&D");
        assert_eq!(country, "Spain");
    }

    #[test]
    fn parse_ep_lookup_requires_party_and_country() {
        let csv_data = "norm_name,party\nX,Y\n";
        let err = parse_ep_lookup(csv_data.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("country"));
    }

    #[test]
    fn load_orgs_table_prefers_json_then_csv() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(ORG_FILE_CSV),
            "id,name\no1,From CSV\n",
        )
        .unwrap();
        let nodes = load_orgs_table(dir.path()).unwrap();
        assert_eq!(nodes[0].name.as_deref(), Some("From CSV"));

        std::fs::write(
            dir.path().join(ORG_FILE_JSON),
            r#"[{"id": "o1", "name": "From JSON"}]"#,
        )
        .unwrap();
        let nodes = load_orgs_table(dir.path()).unwrap();
        assert_eq!(nodes[0].name.as_deref(), Some("From JSON"));
    }

    #[test]
    fn load_orgs_table_missing_files_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_orgs_table(dir.path()).is_err());
    }
}
