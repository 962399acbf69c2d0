//! `discovery[{#MACRO},OID,...]` items: walk several columns and merge
//! them into one JSON row per table index.

use super::fetch::FetchContext;
use super::key::parse_key;
use super::render::IndexRenderer;
use super::session::Session;
use super::stats::BatchStats;
use super::translate::translate;
use super::types::{ItemValue, PollError};
use super::walk::{walk, WalkParams};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;

pub const INDEX_MACRO: &str = "{#SNMPINDEX}";

/// Macro/OID pairs of a discovery item, in key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryKey {
    pub pairs: Vec<(String, String)>,
}

fn invalid(message: impl Into<String>) -> PollError {
    PollError::Config(format!("Invalid SNMP OID: {}", message.into()))
}

/// `{#NAME}` where NAME is uppercase letters, digits, `_` or `.`.
pub fn is_discovery_macro(candidate: &str) -> bool {
    candidate
        .strip_prefix("{#")
        .and_then(|rest| rest.strip_suffix('}'))
        .is_some_and(|name| {
            !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '.')
        })
}

impl DiscoveryKey {
    pub fn parse(oid: &str) -> Result<Self, PollError> {
        let key = parse_key(oid).map_err(|_| invalid("cannot parse expression."))?;

        if key.params.is_empty() || key.params.len() % 2 != 0 {
            return Err(invalid("pairs of macro and OID are expected."));
        }

        let mut pairs: Vec<(String, String)> = Vec::with_capacity(key.params.len() / 2);
        for pair in key.params.chunks(2) {
            let (name, column) = (&pair[0], &pair[1]);
            if !is_discovery_macro(name) {
                return Err(invalid(format!("macro \"{}\" is invalid", name)));
            }
            if name == INDEX_MACRO {
                return Err(invalid(format!("macro \"{}\" is not allowed.", INDEX_MACRO)));
            }
            if pairs.iter().any(|(seen, _)| seen == name) {
                return Err(invalid("unique macros are expected."));
            }
            pairs.push((name.clone(), column.clone()));
        }

        Ok(Self { pairs })
    }
}

/// One table row: its index and one slot per macro.
#[derive(Debug)]
struct DiscoveredObject {
    index: String,
    values: Vec<Option<String>>,
}

#[derive(Debug, Default)]
struct Rows {
    objects: Vec<DiscoveredObject>,
    by_index: HashMap<String, usize>,
}

impl Rows {
    fn record(&mut self, slot: usize, slots: usize, index: &str, value: &str) {
        let position = match self.by_index.get(index) {
            Some(&position) => position,
            None => {
                self.objects.push(DiscoveredObject {
                    index: index.to_string(),
                    values: vec![None; slots],
                });
                self.by_index.insert(index.to_string(), self.objects.len() - 1);
                self.objects.len() - 1
            }
        };
        self.objects[position].values[slot] = Some(value.to_string());
    }

    fn to_json(&self, key: &DiscoveryKey) -> JsonValue {
        let rows = self
            .objects
            .iter()
            .map(|object| {
                let mut row = Map::new();
                row.insert(INDEX_MACRO.to_string(), JsonValue::String(object.index.clone()));
                for ((name, _), value) in key.pairs.iter().zip(&object.values) {
                    if let Some(value) = value {
                        row.insert(name.clone(), JsonValue::String(value.clone()));
                    }
                }
                JsonValue::Object(row)
            })
            .collect();
        JsonValue::Array(rows)
    }
}

/// Walk every column of a discovery item and return its rows as a JSON
/// array in `Text`.
///
/// Any walk error fails the whole item.
pub fn discover(
    session: &mut dyn Session,
    ctx: FetchContext<'_>,
    renderer: &dyn IndexRenderer,
    oid: &str,
    params: WalkParams,
    stats: &mut BatchStats,
) -> Result<ItemValue, PollError> {
    let key = DiscoveryKey::parse(oid)?;
    let slots = key.pairs.len();
    let mut rows = Rows::default();

    for (slot, (name, column)) in key.pairs.iter().enumerate() {
        let root = translate(column);
        tracing::debug!("Discovering {} from {} on {}", name, root, ctx.target.peer());

        let mut sink = |_root: &str, index: &str, value: &str| {
            rows.record(slot, slots, index, value);
        };
        walk(session, ctx, &root, params, renderer, stats, &mut sink)?;
    }

    tracing::debug!("Discovered {} rows for {}", rows.objects.len(), oid);
    Ok(ItemValue::Text(rows.to_json(&key).to_string()))
}
