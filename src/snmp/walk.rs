//! Subtree walk with GETNEXT/GETBULK and loop detection.

use super::decode::{decode_value, describe_exception};
use super::fetch::{is_too_large, response_error, FetchContext};
use super::oid::Oid;
use super::render::{choose_index, IndexRenderer};
use super::session::{ErrorStatus, Request, Session};
use super::stats::BatchStats;
use super::types::{PollError, Value};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Upper bound on distinct OIDs remembered once a device stops returning
/// them in increasing order.
pub const MAX_SEEN_OIDS: usize = 1_000_000;

/// Receives every `(index, value)` found under a walked root.
pub trait WalkSink {
    fn on_value(&mut self, root: &str, index: &str, value: &str);
}

impl<F> WalkSink for F
where
    F: FnMut(&str, &str, &str),
{
    fn on_value(&mut self, root: &str, index: &str, value: &str) {
        self(root, index, value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkParams {
    pub bulk: bool,
    /// Repetitions per GETBULK; ignored without bulk.
    pub max_vars: usize,
}

impl WalkParams {
    pub fn next() -> Self {
        Self {
            bulk: false,
            max_vars: 1,
        }
    }

    pub fn bulk(max_vars: usize) -> Self {
        Self {
            bulk: true,
            max_vars,
        }
    }
}

/// Rejects walks that stall or revisit OIDs.
///
/// Starts by requiring strictly increasing OIDs. The first decrease
/// switches to remembering every index suffix seen from then on.
#[derive(Debug)]
enum LoopGuard {
    Increasing,
    Seen(HashSet<Vec<u32>>),
}

impl LoopGuard {
    fn check(&mut self, previous: &Oid, current: &Oid, root: &Oid) -> Result<(), PollError> {
        if let LoopGuard::Increasing = self {
            match current.cmp(previous) {
                Ordering::Greater => return Ok(()),
                Ordering::Equal => {
                    return Err(PollError::NotSupported("OID not changing.".into()));
                }
                Ordering::Less => {
                    tracing::debug!("OIDs not increasing after {}, tracking seen OIDs", previous);
                    *self = LoopGuard::Seen(HashSet::new());
                }
            }
        }

        let LoopGuard::Seen(seen) = self else {
            return Ok(());
        };
        let suffix = current.suffix(root).unwrap_or_default().to_vec();
        if seen.len() >= MAX_SEEN_OIDS || !seen.insert(suffix) {
            return Err(PollError::NotSupported(
                "OID loop detected or too many OIDs.".into(),
            ));
        }
        Ok(())
    }
}

/// Walk the subtree under `root`, handing each decodable value to `sink`.
///
/// `root` is reported to the sink verbatim. Retrieval errors abort the
/// walk; values that cannot be decoded are skipped.
#[allow(clippy::too_many_arguments)]
pub fn walk(
    session: &mut dyn Session,
    ctx: FetchContext<'_>,
    root: &str,
    params: WalkParams,
    renderer: &dyn IndexRenderer,
    stats: &mut BatchStats,
    sink: &mut dyn WalkSink,
) -> Result<(), PollError> {
    let root_oid = Oid::parse(root).map_err(|_| {
        PollError::Config(format!("snmp_parse_oid(): cannot parse OID \"{}\".", root))
    })?;

    let bulk = params.bulk && ctx.target.version.supports_bulk();
    let mut max_vars = if bulk { params.max_vars.max(1) } else { 1 };
    let mut level = 0u8;
    let mut anchor = root_oid.clone();
    let mut guard = LoopGuard::Increasing;

    tracing::debug!(
        "Walking {} on {} (bulk: {}, max_vars: {})",
        root,
        ctx.target.peer(),
        bulk,
        max_vars
    );

    loop {
        let retries = if !bulk || (max_vars == 1 && level == 0) { 1 } else { 0 };
        let request = if bulk {
            Request::get_bulk(anchor.clone(), max_vars as u32, retries)
        } else {
            Request::get_next(anchor.clone(), retries)
        };
        let result = session.send(&request);

        let response = match result {
            Ok(response)
                if response.error_status == ErrorStatus::NoError
                    && !response.varbinds.is_empty() =>
            {
                response
            }
            other => {
                if max_vars > 1 && (is_too_large(&other) || level <= 1) {
                    stats.record_failure(max_vars);
                    max_vars = if level == 0 { max_vars / 2 } else { 1 };
                    level += 1;
                    tracing::debug!(
                        "Reducing walk of {} on {} to {} repetitions",
                        root,
                        ctx.target.peer(),
                        max_vars
                    );
                    continue;
                }

                if matches!(&other, Ok(r) if r.error_status == ErrorStatus::NoError) {
                    return Err(PollError::NotSupported("No values received.".into()));
                }
                return Err(response_error(ctx.target, &other));
            }
        };

        let mut received = 0;
        let mut running = true;

        for (name, value) in &response.varbinds {
            if matches!(value, Value::EndOfMibView) || !name.starts_with(&root_oid) {
                running = false;
                break;
            }
            if let Some(message) = describe_exception(value) {
                return Err(PollError::NotSupported(message));
            }

            guard.check(&anchor, name, &root_oid)?;

            let index = choose_index(renderer, &root_oid, name);
            match decode_value(value) {
                Ok(decoded) => sink.on_value(root, &index, &decoded.to_string()),
                Err(e) => tracing::debug!("Cannot get index '{}' string value: {}", index, e),
            }

            anchor = name.clone();
            received += 1;
        }

        stats.record_success(received);

        if !running {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snmp::render::{NumericIndex, StringIndex};
    use crate::snmp::session::mock::MockAgent;
    use crate::snmp::session::{PduKind, Response};
    use crate::snmp::target::Target;

    const IF_DESCR: &str = ".1.3.6.1.2.1.2.2.1.2";

    fn ctx(target: &Target) -> FetchContext<'_> {
        FetchContext {
            target,
            retry_single_oid: true,
        }
    }

    fn if_table(n: usize) -> MockAgent {
        let agent = MockAgent::new();
        for i in 1..=n {
            agent.insert(&format!("1.3.6.1.2.1.2.2.1.2.{}", i), Value::string(&format!("eth{}", i)));
            agent.insert(&format!("1.3.6.1.2.1.2.2.1.3.{}", i), Value::Integer(6));
        }
        agent
    }

    fn collect(
        agent: &mut MockAgent,
        target: &Target,
        params: WalkParams,
        stats: &mut BatchStats,
    ) -> Result<Vec<(String, String)>, PollError> {
        let mut rows = Vec::new();
        let mut sink = |_root: &str, index: &str, value: &str| {
            rows.push((index.to_string(), value.to_string()));
        };
        walk(agent, ctx(target), IF_DESCR, params, &NumericIndex, stats, &mut sink)?;
        Ok(rows)
    }

    #[test]
    fn test_getnext_walk_stops_at_subtree_end() {
        let target = Target::v2c("10.0.0.1", 161, "public");
        let mut agent = if_table(3);
        let mut stats = BatchStats::new(128);

        let rows = collect(&mut agent, &target, WalkParams::next(), &mut stats).unwrap();

        assert_eq!(
            rows,
            vec![
                ("1".to_string(), "eth1".to_string()),
                ("2".to_string(), "eth2".to_string()),
                ("3".to_string(), "eth3".to_string()),
            ]
        );
        let requests = agent.requests();
        assert_eq!(requests.len(), 4);
        assert!(requests.iter().all(|r| r.kind == PduKind::GetNext && r.retries == 1));
        assert_eq!(stats.max_succeeded, 1);
    }

    #[test]
    fn test_bulk_walk_uses_repetitions() {
        let target = Target::v2c("10.0.0.1", 161, "public");
        let mut agent = if_table(5);
        let mut stats = BatchStats::new(128);

        let rows = collect(&mut agent, &target, WalkParams::bulk(10), &mut stats).unwrap();

        assert_eq!(rows.len(), 5);
        assert_eq!(agent.requests().len(), 1);
        assert_eq!(
            agent.requests()[0].kind,
            PduKind::GetBulk {
                non_repeaters: 0,
                max_repetitions: 10
            }
        );
        assert_eq!(agent.requests()[0].retries, 0);
        assert_eq!(stats.max_succeeded, 5);
    }

    #[test]
    fn test_v1_never_uses_bulk() {
        let target = Target::v1("10.0.0.1", 161, "public");
        let mut agent = if_table(2);
        let mut stats = BatchStats::new(128);

        collect(&mut agent, &target, WalkParams::bulk(10), &mut stats).unwrap();
        assert!(agent.requests().iter().all(|r| r.kind == PduKind::GetNext));
    }

    #[test]
    fn test_truncating_device_reports_what_it_returned() {
        let target = Target::v2c("10.0.0.1", 161, "public");
        let mut agent = if_table(25).max_bulk_varbinds(10);
        let mut stats = BatchStats::new(128);

        let rows = collect(&mut agent, &target, WalkParams::bulk(50), &mut stats).unwrap();

        assert_eq!(rows.len(), 25);
        assert_eq!(stats.max_succeeded, 10);
        assert_eq!(stats.min_failed, 129);
    }

    #[test]
    fn test_timeout_reduces_repetitions() {
        let target = Target::v2c("10.0.0.1", 161, "public");
        let mut agent = if_table(4).timeout_above(5);
        let mut stats = BatchStats::new(128);

        let rows = collect(&mut agent, &target, WalkParams::bulk(16), &mut stats).unwrap();

        assert_eq!(rows.len(), 4);
        // 16 times out, 8 times out, then 1
        assert_eq!(stats.min_failed, 8);
        let reps: Vec<_> = agent
            .requests()
            .iter()
            .map(|r| match r.kind {
                PduKind::GetBulk {
                    max_repetitions, ..
                } => max_repetitions,
                _ => 0,
            })
            .collect();
        assert_eq!(&reps[..3], &[16, 8, 1]);
    }

    #[test]
    fn test_timeout_at_one_repetition_is_network_error() {
        let target = Target::v2c("10.0.0.1", 161, "public");
        let mut agent = if_table(4).timeout_above(0);
        let mut stats = BatchStats::new(128);

        let err = collect(&mut agent, &target, WalkParams::next(), &mut stats).unwrap_err();
        assert!(err.is_network());
    }

    #[test]
    fn test_empty_response_is_not_supported() {
        let target = Target::v2c("10.0.0.1", 161, "public");
        let mut agent = if_table(1);
        agent.push_response(Ok(Response::ok(Vec::new())));
        let mut stats = BatchStats::new(128);

        let err = collect(&mut agent, &target, WalkParams::next(), &mut stats).unwrap_err();
        assert_eq!(err, PollError::NotSupported("No values received.".into()));
    }

    #[test]
    fn test_loop_is_detected() {
        let target = Target::v2c("10.0.0.1", 161, "public");
        let mut agent = MockAgent::new().cycle_walk(&[
            "1.3.6.1.2.1.2.2.1.2.5",
            "1.3.6.1.2.1.2.2.1.2.3",
            "1.3.6.1.2.1.2.2.1.2.4",
        ]);
        let mut stats = BatchStats::new(128);

        let err = collect(&mut agent, &target, WalkParams::next(), &mut stats).unwrap_err();
        assert_eq!(
            err,
            PollError::NotSupported("OID loop detected or too many OIDs.".into())
        );
        assert!(agent.requests().len() < 10);
    }

    #[test]
    fn test_stuck_oid_is_detected() {
        let target = Target::v2c("10.0.0.1", 161, "public");
        let mut agent = MockAgent::new().cycle_walk(&["1.3.6.1.2.1.2.2.1.2.5"]);
        let mut stats = BatchStats::new(128);

        let err = collect(&mut agent, &target, WalkParams::bulk(4), &mut stats).unwrap_err();
        assert_eq!(err, PollError::NotSupported("OID not changing.".into()));
    }

    #[test]
    fn test_exception_aborts_walk() {
        let target = Target::v2c("10.0.0.1", 161, "public");
        let mut agent = if_table(2);
        agent.insert("1.3.6.1.2.1.2.2.1.2.2", Value::NoSuchObject);
        let mut stats = BatchStats::new(128);

        let err = collect(&mut agent, &target, WalkParams::next(), &mut stats).unwrap_err();
        assert!(matches!(err, PollError::NotSupported(_)));
    }

    #[test]
    fn test_undecodable_value_is_skipped() {
        let target = Target::v2c("10.0.0.1", 161, "public");
        let mut agent = if_table(3);
        agent.insert("1.3.6.1.2.1.2.2.1.2.2", Value::Unsupported(0x47));
        let mut stats = BatchStats::new(128);

        let rows = collect(&mut agent, &target, WalkParams::next(), &mut stats).unwrap();
        let indices: Vec<_> = rows.iter().map(|(i, _)| i.as_str()).collect();
        assert_eq!(indices, vec!["1", "3"]);
    }

    #[test]
    fn test_string_indices_reach_sink() {
        let target = Target::v2c("10.0.0.1", 161, "public");
        let mut agent = MockAgent::new();
        agent.insert("1.3.6.1.6.3.15.1.2.2.1.3.5.97.100.109.105.110", Value::string("admin"));
        let mut stats = BatchStats::new(128);

        let mut indices = Vec::new();
        let mut sink = |_root: &str, index: &str, _value: &str| indices.push(index.to_string());
        walk(
            &mut agent,
            ctx(&target),
            ".1.3.6.1.6.3.15.1.2.2.1.3",
            WalkParams::next(),
            &StringIndex,
            &mut stats,
            &mut sink,
        )
        .unwrap();

        assert_eq!(indices, vec!["\"admin\"".to_string()]);
    }
}
