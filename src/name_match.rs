// name_match.rs
//
// Best-effort resolution of actor names against the EP lookup table
// (normalized name -> party, country). Exact match first, then a pluggable
// closest-match fallback, else "Unknown"/"Unknown". Never fatal.

use std::collections::HashMap;
use std::sync::OnceLock;

use log::info;
use regex::Regex;
use strsim::jaro_winkler;

use crate::models::NodeRecord;

pub const NAME_MATCH_CUTOFF: f64 = 0.86;

pub const UNKNOWN: &str = "Unknown";

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
}

fn ws_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Normalize a display name for lookup: strip markup tags, collapse
/// whitespace, uppercase.
pub fn norm_name(s: &str) -> String {
    let stripped = tag_re().replace_all(s, "");
    let collapsed = ws_re().replace_all(&stripped, " ");
    collapsed.trim().to_uppercase()
}

/// Closest-match fallback used when an exact lookup misses. Implementations
/// return a candidate key only when it clears their own similarity cutoff,
/// so the lookup itself stays free of any specific similarity scheme.
pub trait MatchStrategy {
    fn closest<'a>(&self, name: &str, candidates: &'a [String]) -> Option<&'a str>;
}

/// Jaro-Winkler closest match above a cutoff.
pub struct JaroWinklerMatcher {
    pub cutoff: f64,
}

impl Default for JaroWinklerMatcher {
    fn default() -> Self {
        Self { cutoff: NAME_MATCH_CUTOFF }
    }
}

impl MatchStrategy for JaroWinklerMatcher {
    fn closest<'a>(&self, name: &str, candidates: &'a [String]) -> Option<&'a str> {
        let mut best: Option<(&str, f64)> = None;
        for candidate in candidates {
            let score = jaro_winkler(name, candidate);
            if score >= self.cutoff && best.map_or(true, |(_, s)| score > s) {
                best = Some((candidate.as_str(), score));
            }
        }
        best.map(|(c, _)| c)
    }
}

/// Normalized-name lookup for actor attributes (party, country).
#[derive(Debug)]
pub struct EpLookup {
    map: HashMap<String, (String, String)>,
    keys: Vec<String>,
}

impl EpLookup {
    pub fn new(map: HashMap<String, (String, String)>) -> Self {
        let keys = map.keys().cloned().collect();
        Self { map, keys }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Resolve a raw display name to (party, country). Falls back to
    /// Unknown/Unknown when neither exact nor fuzzy matching succeeds.
    pub fn resolve(&self, raw_name: &str, strategy: &dyn MatchStrategy) -> (String, String) {
        let normalized = norm_name(raw_name);
        if let Some((party, country)) = self.map.get(&normalized) {
            return (party.clone(), country.clone());
        }
        if let Some(key) = strategy.closest(&normalized, &self.keys) {
            if let Some((party, country)) = self.map.get(key) {
                return (party.clone(), country.clone());
            }
        }
        (UNKNOWN.to_string(), UNKNOWN.to_string())
    }
}

/// Attach party and country attributes to MEP nodes in place.
pub fn attach_party_country(
    nodes: &mut [NodeRecord],
    lookup: &EpLookup,
    strategy: &dyn MatchStrategy,
) {
    let mut unresolved = 0usize;
    for node in nodes.iter_mut() {
        let raw_name = node.mep_name.as_deref().unwrap_or("");
        let (party, country) = lookup.resolve(raw_name, strategy);
        if party == UNKNOWN && country == UNKNOWN {
            unresolved += 1;
        }
        node.party = Some(party);
        node.country = Some(country);
    }
    info!(
        "Attached party/country to {} MEP nodes ({} unresolved).",
        nodes.len(),
        unresolved
    );
}
