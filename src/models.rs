use serde::{Deserialize, Serialize};

/// Which two entity types form the bipartition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Mep,
    Commission,
    Full,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Mep => "mep",
            Mode::Commission => "commission",
            Mode::Full => "full",
        }
    }

    /// Strict parse for the CLI, where an unknown mode is a user error.
    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "mep" => Ok(Mode::Mep),
            "commission" => Ok(Mode::Commission),
            "full" => Ok(Mode::Full),
            other => Err(anyhow::anyhow!(
                "Unknown mode '{}', expected one of: mep, commission, full",
                other
            )),
        }
    }

    /// Lenient parse for the request surface: unknown values fall back to `full`.
    pub fn from_str_lenient(s: &str) -> Self {
        Mode::from_str(s).unwrap_or(Mode::Full)
    }
}

/// Structural filtering parameters, applied uniformly across all modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterParams {
    /// Drop org nodes with incident row count below this (default 2).
    pub org_min_degree: i64,
    /// Drop actor nodes with incident row count below this (default 1 = keep all).
    pub actor_min_degree: i64,
    /// Iterative pruning on BOTH sides; 0 or 1 disables.
    pub bipartite_k_core: i64,
    /// Drop aggregated edges with weight below this; 1 or less disables.
    pub min_edge_weight: i64,
    /// Include nodes with no surviving edges.
    pub keep_isolates: bool,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            org_min_degree: 2,
            actor_min_degree: 1,
            bipartite_k_core: 0,
            min_edge_weight: 1,
            keep_isolates: false,
        }
    }
}

/// One raw interaction row: an actor engaging an organization, with the
/// source table's timestamp value carried through unparsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRow {
    pub source: String,
    pub target: String,
    pub timestamp: Option<String>,
}

impl EdgeRow {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            timestamp: None,
        }
    }

    pub fn with_timestamp(
        source: impl Into<String>,
        target: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            timestamp: Some(timestamp.into()),
        }
    }
}

/// One aggregated edge per distinct (source, target) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedEdge {
    pub source: String,
    pub target: String,
    /// Count of raw interaction rows collapsed into this edge.
    pub weight: u64,
    /// ISO-8601 UTC strings; rows with unparseable timestamps contribute nothing.
    pub timestamps: Vec<String>,
}

/// An edge collection at some stage of the pipeline. The aggregation state
/// is carried in the type, so downstream stages can accept either shape and
/// the aggregator can pass already-aggregated input through unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeTable {
    Raw(Vec<EdgeRow>),
    Aggregated(Vec<AggregatedEdge>),
}

impl EdgeTable {
    pub fn len(&self) -> usize {
        match self {
            EdgeTable::Raw(rows) => rows.len(),
            EdgeTable::Aggregated(edges) => edges.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One node in the final graph. Optional attributes are omitted from the
/// JSON output when absent, so sparse columns never serialize as null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mep_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub party: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub register_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interests_represented: Option<String>,
}

impl NodeRecord {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            label: String::new(),
            name: None,
            mep_name: None,
            party: None,
            country: None,
            register_id: None,
            interests_represented: None,
        }
    }

    /// Placeholder for an org that appears in edges but not in the master
    /// table; the id doubles as name and label.
    pub fn placeholder_org(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            name: Some(id.clone()),
            ..NodeRecord::new(id, "org")
        }
    }
}

/// The final D3-friendly artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BipartiteGraph {
    pub nodes: Vec<NodeRecord>,
    pub links: Vec<AggregatedEdge>,
}
