//! Resolution of `base[index,refOID,value]` items.
//!
//! The index of the row whose `refOID` column equals `value` is looked up
//! in the index cache. A cached index is trusted only after a GET of
//! `refOID.index` still returns `value`; otherwise `refOID` is walked
//! again to rebuild its table.

use super::fetch::{get_values, FetchContext, FetchEntry, Outcome};
use super::index_cache::IndexCache;
use super::key::parse_key;
use super::render::IndexRenderer;
use super::session::Session;
use super::stats::BatchStats;
use super::translate::translate;
use super::types::PollError;
use super::walk::{walk, WalkParams};
use std::collections::HashMap;

/// A parsed dynamic item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicOid {
    /// Translated column OID the value is read from.
    pub base: String,
    /// `refOID` as written in the item.
    pub reference: String,
    /// Translated `refOID`, also the cache and walk root.
    pub reference_oid: String,
    pub value: String,
}

impl DynamicOid {
    pub fn parse(oid: &str) -> Result<Self, PollError> {
        let key = parse_key(oid).map_err(|e| {
            tracing::debug!("Cannot parse dynamic OID \"{}\": {}", oid, e);
            PollError::Config("Invalid SNMP OID: cannot parse expression.".into())
        })?;

        if key.params.len() != 3 {
            return Err(PollError::Config(format!(
                "OID \"{}\" contains unsupported parameters.",
                oid
            )));
        }
        if key.params[0] != "index" {
            return Err(PollError::Config(format!(
                "Unsupported method \"{}\" in the OID \"{}\".",
                key.params[0], oid
            )));
        }

        Ok(Self {
            base: translate(&key.name),
            reference: key.params[1].clone(),
            reference_oid: translate(&key.params[1]),
            value: key.params[2].clone(),
        })
    }
}

struct Pending {
    position: usize,
    oid: DynamicOid,
    index: Option<String>,
}

/// Resolve and fetch every dynamic entry.
///
/// Entries carry the raw item OID on the way in and the fetched value or
/// error on the way out. An `Err` is a network failure that ends the
/// whole resolution.
#[allow(clippy::too_many_arguments)]
pub fn resolve(
    session: &mut dyn Session,
    ctx: FetchContext<'_>,
    cache: &mut IndexCache,
    renderer: &dyn IndexRenderer,
    entries: &mut [FetchEntry],
    params: WalkParams,
    stats: &mut BatchStats,
) -> Result<(), PollError> {
    let mut pending = Vec::with_capacity(entries.len());

    for (position, entry) in entries.iter_mut().enumerate() {
        if matches!(entry.outcome, Outcome::Error(_)) {
            continue;
        }
        match DynamicOid::parse(&entry.oid) {
            Ok(oid) => {
                let index = cache
                    .get(ctx.target, &oid.reference_oid, &oid.value)
                    .map(str::to_string);
                pending.push(Pending {
                    position,
                    oid,
                    index,
                });
            }
            Err(e) => entry.outcome = Outcome::Error(e),
        }
    }

    verify_cached(session, ctx, &mut pending, stats)?;

    let mut walk_errors: HashMap<String, PollError> = HashMap::new();
    let mut walked: Vec<String> = Vec::new();

    for item in pending.iter().filter(|p| p.index.is_none()) {
        let root = &item.oid.reference_oid;
        if walked.contains(root) {
            continue;
        }
        walked.push(root.clone());

        cache.invalidate(ctx.target, root);
        let mut filler = cache.filler(ctx.target);
        match walk(session, ctx, root, params, renderer, stats, &mut filler) {
            Ok(()) => {}
            Err(e) if e.is_network() => return Err(e),
            Err(e) => {
                tracing::debug!("Cannot walk {} for index lookup: {}", root, e);
                walk_errors.insert(root.clone(), e);
            }
        }
    }

    let mut to_fetch = Vec::new();
    let mut fetch_positions = Vec::new();

    for item in pending {
        let index = match item.index {
            Some(index) => index,
            None => {
                if let Some(e) = walk_errors.get(&item.oid.reference_oid) {
                    entries[item.position].outcome = Outcome::Error(e.clone());
                    continue;
                }
                match cache.get(ctx.target, &item.oid.reference_oid, &item.oid.value) {
                    Some(index) => index.to_string(),
                    None => {
                        entries[item.position].outcome =
                            Outcome::Error(PollError::NotSupported(format!(
                                "Cannot find index of \"{}\" in \"{}\".",
                                item.oid.value, item.oid.reference
                            )));
                        continue;
                    }
                }
            }
        };

        to_fetch.push(FetchEntry::new(format!("{}.{}", item.oid.base, index)));
        fetch_positions.push(item.position);
    }

    if to_fetch.is_empty() {
        return Ok(());
    }

    let result = get_values(session, ctx, &mut to_fetch, 0, stats);
    for (position, fetched) in fetch_positions.into_iter().zip(to_fetch) {
        entries[position].outcome = match fetched.outcome {
            Outcome::Pending => Outcome::Error(PollError::NotSupported(format!(
                "No value received for OID \"{}\".",
                fetched.oid
            ))),
            outcome => outcome,
        };
    }
    result
}

/// Drop cached indices that no longer point at the expected value.
fn verify_cached(
    session: &mut dyn Session,
    ctx: FetchContext<'_>,
    pending: &mut [Pending],
    stats: &mut BatchStats,
) -> Result<(), PollError> {
    let mut positions = Vec::new();
    let mut checks = Vec::new();
    for (i, item) in pending.iter().enumerate() {
        if let Some(index) = &item.index {
            positions.push(i);
            checks.push(FetchEntry::lenient(format!("{}.{}", item.oid.reference_oid, index)));
        }
    }

    if checks.is_empty() {
        return Ok(());
    }

    match get_values(session, ctx, &mut checks, 0, stats) {
        Ok(()) => {}
        Err(e) if e.is_network() => return Err(e),
        Err(e) => tracing::debug!("Cannot verify cached indices: {}", e),
    }

    for (i, check) in positions.into_iter().zip(checks) {
        let item = &mut pending[i];
        let still_valid = check
            .value()
            .is_some_and(|v| v.to_string() == item.oid.value);
        if !still_valid {
            tracing::debug!(
                "Cached index of \"{}\" in {} is stale",
                item.oid.value,
                item.oid.reference_oid
            );
            item.index = None;
        }
    }

    Ok(())
}
