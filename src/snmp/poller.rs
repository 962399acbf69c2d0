//! Per-worker polling session: classifies items and drives the fetcher,
//! the dynamic-index resolver and discovery for one target at a time.

use super::discovery::discover;
use super::dynamic::resolve;
use super::fetch::{fail_remaining, get_values, response_error, FetchContext, FetchEntry};
use super::index_cache::IndexCache;
use super::render::{IndexRenderer, NumericIndex};
use super::session::{Connector, Session};
use super::stats::{BatchHints, BatchStats};
use super::target::Target;
use super::translate::translate;
use super::types::{ItemRequest, ItemResult, ItemValue, PollError};
use super::walk::{walk, WalkParams};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MAX_BATCH_ITEMS: usize = 128;

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub timeout: Duration,
    pub max_batch_items: usize,
    pub retry_single_oid: bool,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            max_batch_items: DEFAULT_MAX_BATCH_ITEMS,
            retry_single_oid: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemKind {
    Plain,
    Dynamic,
    Discovery,
}

fn classify(oid: &str) -> ItemKind {
    if oid.starts_with("discovery[") {
        ItemKind::Discovery
    } else if oid.contains('[') {
        ItemKind::Dynamic
    } else {
        ItemKind::Plain
    }
}

/// Owns the index cache and the one-time SNMP library initialisation.
pub struct PollerSession {
    connector: Arc<dyn Connector>,
    cache: IndexCache,
    renderer: Box<dyn IndexRenderer>,
    settings: PollerSettings,
    initialized: bool,
}

impl PollerSession {
    pub fn new(connector: Arc<dyn Connector>, settings: PollerSettings) -> Self {
        Self {
            connector,
            cache: IndexCache::new(),
            renderer: Box::new(NumericIndex),
            settings,
            initialized: false,
        }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn IndexRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn cache(&self) -> &IndexCache {
        &self.cache
    }

    /// Forget every learned index.
    pub fn clear_cache(&mut self) {
        tracing::info!("Clearing index cache ({} entries)", self.cache.len());
        self.cache.clear();
    }

    fn ensure_initialized(&mut self) {
        if !self.initialized {
            self.connector.initialize();
            self.initialized = true;
            tracing::debug!("SNMP connector initialized");
        }
    }

    fn open(&mut self, target: &Target) -> Result<Box<dyn Session>, PollError> {
        self.ensure_initialized();
        self.connector
            .open(target, self.settings.timeout)
            .map_err(|e| {
                tracing::warn!("Cannot open SNMP session to {}: {}", target.peer(), e);
                response_error(target, &Err(e))
            })
    }

    /// Poll every item of one interface. Results come back in item order.
    pub fn get_values(
        &mut self,
        interface_id: &str,
        target: &Target,
        items: &[ItemRequest],
        hints: &mut dyn BatchHints,
    ) -> Vec<ItemResult> {
        let (suggested, bulk) = hints.suggested_vars(interface_id);
        let batch = if bulk {
            suggested.clamp(1, self.settings.max_batch_items.max(1))
        } else {
            1
        };

        let mut session = match self.open(target) {
            Ok(session) => session,
            Err(e) => {
                return items
                    .iter()
                    .map(|item| ItemResult::new(&item.id, Err(e.clone())))
                    .collect();
            }
        };

        tracing::debug!(
            "Polling {} items on {} (interface {}, batch {}, bulk {})",
            items.len(),
            target.peer(),
            interface_id,
            batch,
            bulk
        );

        let ctx = FetchContext {
            target,
            retry_single_oid: self.settings.retry_single_oid,
        };
        let walk_params = WalkParams {
            bulk,
            max_vars: batch,
        };
        let mut stats = BatchStats::new(self.settings.max_batch_items);
        let mut outcomes: Vec<Option<Result<ItemValue, PollError>>> = vec![None; items.len()];
        let mut network_error: Option<PollError> = None;

        let positions = |kind: ItemKind| -> Vec<usize> {
            (0..items.len())
                .filter(|&i| classify(&items[i].oid) == kind)
                .collect()
        };

        for i in positions(ItemKind::Discovery) {
            let result = match &network_error {
                Some(e) => Err(e.clone()),
                None => discover(
                    session.as_mut(),
                    ctx,
                    self.renderer.as_ref(),
                    &items[i].oid,
                    walk_params,
                    &mut stats,
                ),
            };
            if let Err(e) = &result {
                if e.is_network() {
                    network_error = Some(e.clone());
                }
            }
            outcomes[i] = Some(result);
        }

        for chunk in positions(ItemKind::Dynamic).chunks(batch) {
            let mut entries: Vec<FetchEntry> = chunk
                .iter()
                .map(|&i| FetchEntry::new(items[i].oid.clone()))
                .collect();
            let params = WalkParams {
                bulk,
                max_vars: chunk.len(),
            };

            let result = match &network_error {
                Some(e) => Err(e.clone()),
                None => resolve(
                    session.as_mut(),
                    ctx,
                    &mut self.cache,
                    self.renderer.as_ref(),
                    &mut entries,
                    params,
                    &mut stats,
                ),
            };
            finish_chunk(chunk, entries, result, &mut outcomes, &mut network_error);
        }

        for chunk in positions(ItemKind::Plain).chunks(batch) {
            let mut entries: Vec<FetchEntry> = chunk
                .iter()
                .map(|&i| FetchEntry::new(translate(&items[i].oid)))
                .collect();

            let result = match &network_error {
                Some(e) => Err(e.clone()),
                None => get_values(session.as_mut(), ctx, &mut entries, 0, &mut stats),
            };
            finish_chunk(chunk, entries, result, &mut outcomes, &mut network_error);
        }

        if bulk && network_error.is_none() && stats.is_touched() {
            hints.update(interface_id, stats.max_succeeded, stats.min_failed);
        }

        items
            .iter()
            .zip(outcomes)
            .map(|(item, outcome)| {
                let outcome = outcome.unwrap_or_else(|| {
                    Err(PollError::NotSupported(format!(
                        "No value received for OID \"{}\".",
                        item.oid
                    )))
                });
                ItemResult::new(&item.id, outcome)
            })
            .collect()
    }

    /// Walk one subtree and return its `(index, value)` pairs.
    pub fn walk_table(
        &mut self,
        target: &Target,
        oid: &str,
        params: WalkParams,
    ) -> Result<Vec<(String, String)>, PollError> {
        let mut session = self.open(target)?;
        let ctx = FetchContext {
            target,
            retry_single_oid: self.settings.retry_single_oid,
        };
        let mut stats = BatchStats::new(self.settings.max_batch_items);
        let mut rows = Vec::new();
        let mut sink = |_root: &str, index: &str, value: &str| {
            rows.push((index.to_string(), value.to_string()));
        };

        walk(
            session.as_mut(),
            ctx,
            &translate(oid),
            params,
            self.renderer.as_ref(),
            &mut stats,
            &mut sink,
        )?;
        Ok(rows)
    }
}

fn finish_chunk(
    chunk: &[usize],
    mut entries: Vec<FetchEntry>,
    result: Result<(), PollError>,
    outcomes: &mut [Option<Result<ItemValue, PollError>>],
    network_error: &mut Option<PollError>,
) {
    if let Err(e) = result {
        fail_remaining(&mut entries, &e);
        if e.is_network() && network_error.is_none() {
            tracing::warn!("Network error, failing the rest of the pass: {}", e);
            *network_error = Some(e);
        }
    }

    for (&i, entry) in chunk.iter().zip(entries) {
        outcomes[i] = Some(entry.into_result());
    }
}
