//! Numeric object identifiers.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Object identifier stored as its arcs.
///
/// Ordering is lexicographic by arc, which is the order agents return
/// bindings in during a walk.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Oid {
    arcs: Vec<u32>,
}

/// Error returned when a string is not a dotted numeric OID.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot parse OID \"{0}\"")]
pub struct ParseOidError(pub String);

impl Oid {
    pub fn new(arcs: impl IntoIterator<Item = u32>) -> Self {
        Self {
            arcs: arcs.into_iter().collect(),
        }
    }

    pub fn from_slice(arcs: &[u32]) -> Self {
        Self {
            arcs: arcs.to_vec(),
        }
    }

    /// Parse dotted notation, with or without a leading dot.
    pub fn parse(s: &str) -> Result<Self, ParseOidError> {
        let trimmed = s.trim();
        let body = trimmed.strip_prefix('.').unwrap_or(trimmed);
        if body.is_empty() {
            return Err(ParseOidError(s.to_string()));
        }

        let arcs = body
            .split('.')
            .map(|part| part.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ParseOidError(s.to_string()))?;

        Ok(Self { arcs })
    }

    pub fn arcs(&self) -> &[u32] {
        &self.arcs
    }

    pub fn len(&self) -> usize {
        self.arcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }

    /// True if `self` lies in the subtree rooted at `prefix` (or equals it).
    pub fn starts_with(&self, prefix: &Oid) -> bool {
        self.arcs.starts_with(&prefix.arcs)
    }

    /// Arcs after `root`, if `self` is inside that subtree.
    pub fn suffix(&self, root: &Oid) -> Option<&[u32]> {
        if self.starts_with(root) {
            Some(&self.arcs[root.len()..])
        } else {
            None
        }
    }

    pub fn push(&mut self, arc: u32) {
        self.arcs.push(arc);
    }

    /// Dotted form with a leading dot, as net-snmp prints numeric OIDs.
    pub fn to_dotted(&self) -> String {
        format!(".{}", self)
    }
}

/// Join arcs with dots, no leading dot.
pub fn join_arcs(arcs: &[u32]) -> String {
    arcs.iter()
        .map(|arc| arc.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_arcs(&self.arcs))
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self)
    }
}

impl FromStr for Oid {
    type Err = ParseOidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl PartialOrd for Oid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Oid {
    fn cmp(&self, other: &Self) -> Ordering {
        self.arcs.cmp(&other.arcs)
    }
}

impl From<&[u32]> for Oid {
    fn from(arcs: &[u32]) -> Self {
        Self::from_slice(arcs)
    }
}
