//! Batch-size feedback between polling passes.

use std::collections::HashMap;

/// Largest batch that worked and smallest that failed during one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    pub max_succeeded: usize,
    pub min_failed: usize,
    ceiling: usize,
}

impl BatchStats {
    /// `min_failed` starts one above the largest batch ever sent.
    pub fn new(max_batch_items: usize) -> Self {
        Self {
            max_succeeded: 0,
            min_failed: max_batch_items + 1,
            ceiling: max_batch_items + 1,
        }
    }

    pub fn record_success(&mut self, size: usize) {
        self.max_succeeded = self.max_succeeded.max(size);
    }

    pub fn record_failure(&mut self, size: usize) {
        self.min_failed = self.min_failed.min(size);
    }

    /// Whether anything was observed worth reporting.
    pub fn is_touched(&self) -> bool {
        self.max_succeeded != 0 || self.min_failed != self.ceiling
    }
}

/// Per-interface batch hints, supplied before and updated after a pass.
pub trait BatchHints {
    /// `(max_vars, bulk_enabled)` for the interface.
    fn suggested_vars(&self, interface_id: &str) -> (usize, bool);

    fn update(&mut self, interface_id: &str, max_succeeded: usize, min_failed: usize);
}

#[derive(Debug, Clone, Copy)]
struct InterfaceState {
    bulk: bool,
    max_succeeded: usize,
    min_failed: usize,
}

/// In-memory [`BatchHints`] keyed by interface id.
#[derive(Debug)]
pub struct InterfaceStats {
    interfaces: HashMap<String, InterfaceState>,
    max_batch_items: usize,
}

impl InterfaceStats {
    pub fn new(max_batch_items: usize) -> Self {
        Self {
            interfaces: HashMap::new(),
            max_batch_items,
        }
    }

    /// Add an interface or change its bulk flag. Learned sizes are kept.
    pub fn register(&mut self, interface_id: &str, bulk: bool) {
        let ceiling = self.max_batch_items + 1;
        self.interfaces
            .entry(interface_id.to_string())
            .and_modify(|state| state.bulk = bulk)
            .or_insert(InterfaceState {
                bulk,
                max_succeeded: 0,
                min_failed: ceiling,
            });
    }

    /// `(max_succeeded, min_failed)` learned so far.
    pub fn learned(&self, interface_id: &str) -> Option<(usize, usize)> {
        self.interfaces
            .get(interface_id)
            .map(|s| (s.max_succeeded, s.min_failed))
    }
}

impl BatchHints for InterfaceStats {
    fn suggested_vars(&self, interface_id: &str) -> (usize, bool) {
        let Some(state) = self.interfaces.get(interface_id) else {
            return (1, false);
        };
        if !state.bulk {
            return (1, false);
        }

        // Grow by half while nothing has failed, by one once a limit is known.
        let num = if state.max_succeeded <= 1 || state.min_failed != self.max_batch_items + 1 {
            state.max_succeeded + 1
        } else {
            state.max_succeeded * 3 / 2
        };

        let suggested = if num < state.min_failed {
            num
        } else {
            state.max_succeeded.max(state.min_failed.saturating_sub(1))
        };

        (suggested.clamp(1, self.max_batch_items), true)
    }

    fn update(&mut self, interface_id: &str, max_succeeded: usize, min_failed: usize) {
        let Some(state) = self.interfaces.get_mut(interface_id) else {
            tracing::debug!("Ignoring batch stats for unknown interface {}", interface_id);
            return;
        };

        if state.max_succeeded < max_succeeded {
            state.max_succeeded = max_succeeded;
        }
        if state.min_failed > min_failed {
            state.min_failed = min_failed;
        }

        tracing::debug!(
            "Interface {} batch stats: max_succeeded={} min_failed={}",
            interface_id,
            state.max_succeeded,
            state.min_failed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_stats_tighten_monotonically() {
        let mut stats = BatchStats::new(128);
        assert!(!stats.is_touched());
        assert_eq!(stats.min_failed, 129);

        stats.record_success(10);
        stats.record_success(4);
        stats.record_failure(32);
        stats.record_failure(64);

        assert_eq!(stats.max_succeeded, 10);
        assert_eq!(stats.min_failed, 32);
        assert!(stats.is_touched());
    }

    #[test]
    fn test_unknown_or_disabled_interface_gets_one() {
        let mut stats = InterfaceStats::new(128);
        assert_eq!(stats.suggested_vars("nope"), (1, false));

        stats.register("if1", false);
        assert_eq!(stats.suggested_vars("if1"), (1, false));
    }

    #[test]
    fn test_slow_start_then_growth() {
        let mut stats = InterfaceStats::new(128);
        stats.register("if1", true);
        assert_eq!(stats.suggested_vars("if1"), (1, true));

        stats.update("if1", 1, 129);
        assert_eq!(stats.suggested_vars("if1"), (2, true));

        stats.update("if1", 2, 129);
        assert_eq!(stats.suggested_vars("if1"), (3, true));

        stats.update("if1", 10, 129);
        assert_eq!(stats.suggested_vars("if1"), (15, true));
    }

    #[test]
    fn test_known_failure_bounds_suggestion() {
        let mut stats = InterfaceStats::new(128);
        stats.register("if1", true);

        stats.update("if1", 10, 12);
        assert_eq!(stats.suggested_vars("if1"), (11, true));

        stats.update("if1", 11, 12);
        assert_eq!(stats.suggested_vars("if1"), (11, true));
    }

    #[test]
    fn test_suggestion_capped_by_max_batch() {
        let mut stats = InterfaceStats::new(16);
        stats.register("if1", true);
        stats.update("if1", 16, 17);
        assert_eq!(stats.suggested_vars("if1"), (16, true));
    }

    #[test]
    fn test_register_keeps_learned_sizes() {
        let mut stats = InterfaceStats::new(128);
        stats.register("if1", true);
        stats.update("if1", 20, 40);
        stats.register("if1", true);
        assert_eq!(stats.learned("if1"), Some((20, 40)));
    }
}
