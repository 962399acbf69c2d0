//! Batched GET with adaptive halving.
//!
//! A batch is sent as one GET. When the agent answers `tooBig`, times out,
//! or the request cannot be sent because it is too long, the batch is
//! split: level 0 recurses on both halves, level 1 falls back to one OID
//! per request (level 2). Healthy devices see a single large request and
//! constrained ones degrade to one-at-a-time without prior knowledge of
//! their limits.

use super::decode::decode_value;
use super::oid::Oid;
use super::session::{ErrorStatus, Request, Response, Session, TransportError};
use super::stats::BatchStats;
use super::target::Target;
use super::types::{ItemValue, PollError};

/// State of one requested OID.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Pending,
    Value(ItemValue),
    Error(PollError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchEntry {
    pub oid: String,
    /// Keep querying and storing even after a decode or noSuchName error;
    /// used when verifying cached indices.
    pub ignore_type_errors: bool,
    pub outcome: Outcome,
}

impl FetchEntry {
    pub fn new(oid: impl Into<String>) -> Self {
        Self {
            oid: oid.into(),
            ignore_type_errors: false,
            outcome: Outcome::Pending,
        }
    }

    pub fn lenient(oid: impl Into<String>) -> Self {
        Self {
            ignore_type_errors: true,
            ..Self::new(oid)
        }
    }

    pub fn failed(oid: impl Into<String>, error: PollError) -> Self {
        Self {
            outcome: Outcome::Error(error),
            ..Self::new(oid)
        }
    }

    fn is_queryable(&self) -> bool {
        self.ignore_type_errors || !matches!(self.outcome, Outcome::Error(_))
    }

    pub fn value(&self) -> Option<&ItemValue> {
        match &self.outcome {
            Outcome::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Outcome as a result; a still-pending entry reports `NotSupported`.
    pub fn into_result(self) -> Result<ItemValue, PollError> {
        match self.outcome {
            Outcome::Value(v) => Ok(v),
            Outcome::Error(e) => Err(e),
            Outcome::Pending => Err(PollError::NotSupported(format!(
                "No value received for OID \"{}\".",
                self.oid
            ))),
        }
    }
}

/// Apply a batch-level error to every entry still without one.
pub fn fail_remaining(entries: &mut [FetchEntry], error: &PollError) {
    for entry in entries
        .iter_mut()
        .filter(|e| !matches!(e.outcome, Outcome::Error(_)))
    {
        entry.outcome = Outcome::Error(error.clone());
    }
}

/// What a fetch or walk needs to know beyond the session.
#[derive(Debug, Clone, Copy)]
pub struct FetchContext<'a> {
    pub target: &'a Target,
    /// Allow one transport retry for single-OID first attempts.
    pub retry_single_oid: bool,
}

/// Turn a failed exchange into the error reported to the caller.
pub fn response_error(
    target: &Target,
    result: &Result<Response, TransportError>,
) -> PollError {
    match result {
        Ok(response) => {
            PollError::NotSupported(format!("SNMP error: {}", response.error_status))
        }
        Err(TransportError::Timeout) => PollError::Network(format!(
            "Timeout while connecting to \"{}\".",
            target.peer()
        )),
        Err(e) => PollError::Network(format!(
            "Cannot connect to \"{}\": {}.",
            target.peer(),
            e
        )),
    }
}

/// Fetch every queryable entry, recording values and per-entry errors.
///
/// An `Err` is a batch-level failure the caller should apply to all
/// entries that do not already hold an error.
pub fn get_values(
    session: &mut dyn Session,
    ctx: FetchContext<'_>,
    entries: &mut [FetchEntry],
    level: u8,
    stats: &mut BatchStats,
) -> Result<(), PollError> {
    let mut mapping: Vec<usize> = Vec::with_capacity(entries.len());
    let mut oids: Vec<Oid> = Vec::with_capacity(entries.len());

    for (i, entry) in entries.iter_mut().enumerate() {
        if !entry.is_queryable() {
            continue;
        }
        match Oid::parse(&entry.oid) {
            Ok(oid) => {
                mapping.push(i);
                oids.push(oid);
            }
            Err(_) => {
                entry.outcome = Outcome::Error(PollError::Config(format!(
                    "snmp_parse_oid(): cannot parse OID \"{}\".",
                    entry.oid
                )));
            }
        }
    }

    if mapping.is_empty() {
        return Ok(());
    }

    let retries = if mapping.len() == 1 && level == 0 && ctx.retry_single_oid {
        1
    } else {
        0
    };

    loop {
        let size = mapping.len();
        let result = session.send(&Request::get(oids.clone(), retries));

        match &result {
            Ok(response) if response.error_status == ErrorStatus::NoError => {
                match store_bindings(ctx, entries, &mapping, &oids, response) {
                    Bindings::Stored => {
                        stats.record_success(size);
                        return Ok(());
                    }
                    Bindings::Halve => break,
                    Bindings::Invalid(error) => {
                        entries[mapping[0]].outcome = Outcome::Error(error);
                        return Ok(());
                    }
                }
            }
            Ok(response)
                if response.error_status == ErrorStatus::NoSuchName
                    && response.error_index != 0 =>
            {
                let position = response.error_index as usize - 1;
                if position >= size {
                    tracing::warn!(
                        "Invalid SNMP response from {}: error index {} out of {} bindings",
                        ctx.target.peer(),
                        response.error_index,
                        size
                    );
                    return Err(PollError::NotSupported(
                        "Invalid SNMP response: error index out of bounds.".into(),
                    ));
                }

                let entry = &mut entries[mapping[position]];
                tracing::debug!(
                    "OID \"{}\" is not available on {}",
                    entry.oid,
                    ctx.target.peer()
                );
                if !entry.ignore_type_errors {
                    entry.outcome = Outcome::Error(response_error(ctx.target, &result));
                }

                if size == 1 {
                    return Ok(());
                }
                mapping.remove(position);
                oids.remove(position);
            }
            _ if size > 1 && is_too_large(&result) => break,
            _ if size > 1 && level >= 1 => break,
            _ => {
                let error = response_error(ctx.target, &result);
                if size == 1 && !error.is_network() {
                    entries[mapping[0]].outcome = Outcome::Error(error);
                    return Ok(());
                }
                return Err(error);
            }
        }
    }

    halve(session, ctx, entries, &mapping, level, stats)
}

pub(crate) fn is_too_large(result: &Result<Response, TransportError>) -> bool {
    match result {
        Ok(response) => response.error_status == ErrorStatus::TooBig,
        Err(TransportError::Timeout) | Err(TransportError::TooLong) => true,
        Err(_) => false,
    }
}

fn halve(
    session: &mut dyn Session,
    ctx: FetchContext<'_>,
    entries: &mut [FetchEntry],
    mapping: &[usize],
    level: u8,
    stats: &mut BatchStats,
) -> Result<(), PollError> {
    stats.record_failure(mapping.len());

    match level {
        0 => {
            tracing::debug!(
                "Splitting batch of {} OIDs for {} in half",
                mapping.len(),
                ctx.target.peer()
            );
            let middle = entries.len() / 2;
            let (first, second) = entries.split_at_mut(middle);
            get_values(session, ctx, first, 1, stats)?;
            get_values(session, ctx, second, 1, stats)
        }
        1 => {
            tracing::debug!(
                "Querying {} OIDs for {} one by one",
                mapping.len(),
                ctx.target.peer()
            );
            for i in 0..entries.len() {
                get_values(session, ctx, &mut entries[i..=i], 2, stats)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

enum Bindings {
    Stored,
    Halve,
    Invalid(PollError),
}

fn store_bindings(
    ctx: FetchContext<'_>,
    entries: &mut [FetchEntry],
    mapping: &[usize],
    oids: &[Oid],
    response: &Response,
) -> Bindings {
    let size = mapping.len();
    let received = response.varbinds.len();

    if received != size {
        let which = if received > size { "many" } else { "few" };
        tracing::warn!(
            "Too {} variable bindings from {}: expected {}, got {}",
            which,
            ctx.target.peer(),
            size,
            received
        );
        if size > 1 {
            return Bindings::Halve;
        }
        return Bindings::Invalid(PollError::NotSupported(format!(
            "Invalid SNMP response: too {} variable bindings.",
            which
        )));
    }

    for (position, (name, value)) in response.varbinds.iter().enumerate() {
        if name != &oids[position] {
            if size > 1 {
                tracing::warn!(
                    "SNMP response from {} has OID {} where {} was requested",
                    ctx.target.peer(),
                    name,
                    oids[position]
                );
                return Bindings::Halve;
            }
            tracing::debug!(
                "SNMP response from {} has OID {} where {} was requested",
                ctx.target.peer(),
                name,
                oids[position]
            );
        }

        let entry = &mut entries[mapping[position]];
        entry.outcome = match decode_value(value) {
            Ok(v) => Outcome::Value(v),
            Err(e) => Outcome::Error(e),
        };
    }

    Bindings::Stored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snmp::session::mock::MockAgent;
    use crate::snmp::session::PduKind;
    use crate::snmp::types::Value;

    fn ctx(target: &Target) -> FetchContext<'_> {
        FetchContext {
            target,
            retry_single_oid: true,
        }
    }

    fn agent_with_counters(n: usize) -> MockAgent {
        let agent = MockAgent::new();
        for i in 1..=n {
            agent.insert(&format!("1.3.6.1.2.1.2.2.1.10.{}", i), Value::Counter32(i as u32 * 100));
        }
        agent
    }

    fn entries(n: usize) -> Vec<FetchEntry> {
        (1..=n)
            .map(|i| FetchEntry::new(format!(".1.3.6.1.2.1.2.2.1.10.{}", i)))
            .collect()
    }

    #[test]
    fn test_single_batch_on_healthy_agent() {
        let target = Target::v2c("10.0.0.1", 161, "public");
        let mut agent = agent_with_counters(5);
        let mut entries = entries(5);
        let mut stats = BatchStats::new(128);

        get_values(&mut agent, ctx(&target), &mut entries, 0, &mut stats).unwrap();

        assert_eq!(agent.requests().len(), 1);
        assert_eq!(agent.requests()[0].retries, 0);
        assert_eq!(entries[4].value(), Some(&ItemValue::Uint64(500)));
        assert_eq!(stats.max_succeeded, 5);
        assert_eq!(stats.min_failed, 129);
    }

    #[test]
    fn test_single_oid_gets_one_retry() {
        let target = Target::v2c("10.0.0.1", 161, "public");
        let mut agent = agent_with_counters(1);
        let mut entries = entries(1);
        let mut stats = BatchStats::new(128);

        get_values(&mut agent, ctx(&target), &mut entries, 0, &mut stats).unwrap();
        assert_eq!(agent.requests()[0].retries, 1);

        let no_retry = FetchContext {
            target: &target,
            retry_single_oid: false,
        };
        agent.clear_requests();
        get_values(&mut agent, no_retry, &mut entries, 0, &mut stats).unwrap();
        assert_eq!(agent.requests()[0].retries, 0);
    }

    #[test]
    fn test_too_big_halves_then_singles() {
        let target = Target::v2c("10.0.0.1", 161, "public");
        let mut agent = agent_with_counters(8).max_get_varbinds(3);
        let mut entries = entries(8);
        let mut stats = BatchStats::new(128);

        get_values(&mut agent, ctx(&target), &mut entries, 0, &mut stats).unwrap();

        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.value(), Some(&ItemValue::Uint64((i as u64 + 1) * 100)));
        }
        assert_eq!(stats.max_succeeded, 1);
        assert_eq!(stats.min_failed, 4);
        // 8 fails, both 4s fail, then 8 singles
        assert_eq!(agent.requests().len(), 11);
    }

    #[test]
    fn test_timeout_drives_halving() {
        let target = Target::v2c("10.0.0.1", 161, "public");
        let mut agent = agent_with_counters(4).timeout_above(2);
        let mut entries = entries(4);
        let mut stats = BatchStats::new(128);

        get_values(&mut agent, ctx(&target), &mut entries, 0, &mut stats).unwrap();

        assert!(entries.iter().all(|e| e.value().is_some()));
        assert_eq!(stats.max_succeeded, 2);
        assert_eq!(stats.min_failed, 4);
    }

    #[test]
    fn test_too_long_request_halves_like_too_big() {
        let target = Target::v2c("10.0.0.1", 161, "public");
        let mut agent = agent_with_counters(6).too_long_above(3);
        let mut entries = entries(6);
        let mut stats = BatchStats::new(128);

        get_values(&mut agent, ctx(&target), &mut entries, 0, &mut stats).unwrap();

        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.value(), Some(&ItemValue::Uint64((i as u64 + 1) * 100)));
        }
        assert_eq!(stats.min_failed, 6);
        assert_eq!(stats.max_succeeded, 3);
        // 6 refused, then two batches of 3
        assert_eq!(agent.requests().len(), 3);
    }

    #[test]
    fn test_timeout_at_size_one_is_network_error() {
        let target = Target::v2c("10.0.0.1", 161, "public");
        let mut agent = agent_with_counters(1).timeout_above(0);
        let mut entries = entries(1);
        let mut stats = BatchStats::new(128);

        let err = get_values(&mut agent, ctx(&target), &mut entries, 0, &mut stats).unwrap_err();
        assert_eq!(
            err,
            PollError::Network("Timeout while connecting to \"10.0.0.1:161\".".into())
        );
    }

    #[test]
    fn test_unparseable_oid_only_fails_itself() {
        let target = Target::v2c("10.0.0.1", 161, "public");
        let mut agent = agent_with_counters(2);
        let mut entries = vec![
            FetchEntry::new(".1.3.6.1.2.1.2.2.1.10.1"),
            FetchEntry::new("not-an-oid"),
            FetchEntry::new(".1.3.6.1.2.1.2.2.1.10.2"),
        ];
        let mut stats = BatchStats::new(128);

        get_values(&mut agent, ctx(&target), &mut entries, 0, &mut stats).unwrap();

        assert_eq!(
            entries[1].outcome,
            Outcome::Error(PollError::Config(
                "snmp_parse_oid(): cannot parse OID \"not-an-oid\".".into()
            ))
        );
        assert!(entries[0].value().is_some());
        assert!(entries[2].value().is_some());
        assert_eq!(agent.requests()[0].oids.len(), 2);
    }

    #[test]
    fn test_no_such_name_removes_offender_and_resends() {
        let target = Target::v1("10.0.0.1", 161, "public");
        let mut agent = agent_with_counters(3).v1_errors();
        agent.remove("1.3.6.1.2.1.2.2.1.10.2");
        let mut entries = entries(3);
        let mut stats = BatchStats::new(128);

        get_values(&mut agent, ctx(&target), &mut entries, 0, &mut stats).unwrap();

        let requests = agent.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].oids.len(), 2);
        assert!(matches!(
            &entries[1].outcome,
            Outcome::Error(PollError::NotSupported(msg)) if msg.starts_with("SNMP error: (noSuchName)")
        ));
        assert_eq!(entries[0].value(), Some(&ItemValue::Uint64(100)));
        assert_eq!(entries[2].value(), Some(&ItemValue::Uint64(300)));
    }

    #[test]
    fn test_error_index_out_of_bounds() {
        let target = Target::v1("10.0.0.1", 161, "public");
        let mut agent = agent_with_counters(2);
        agent.push_response(Ok(Response::error(ErrorStatus::NoSuchName, 5)));
        let mut entries = entries(2);
        let mut stats = BatchStats::new(128);

        let err = get_values(&mut agent, ctx(&target), &mut entries, 0, &mut stats).unwrap_err();
        assert_eq!(
            err.message(),
            "Invalid SNMP response: error index out of bounds."
        );
    }

    #[test]
    fn test_reordered_bindings_halve() {
        let target = Target::v2c("10.0.0.1", 161, "public");
        let mut agent = agent_with_counters(2);
        agent.push_response(Ok(Response::ok(vec![
            (Oid::parse("1.3.6.1.2.1.2.2.1.10.2").unwrap(), Value::Counter32(200)),
            (Oid::parse("1.3.6.1.2.1.2.2.1.10.1").unwrap(), Value::Counter32(100)),
        ])));
        let mut entries = entries(2);
        let mut stats = BatchStats::new(128);

        get_values(&mut agent, ctx(&target), &mut entries, 0, &mut stats).unwrap();

        assert_eq!(entries[0].value(), Some(&ItemValue::Uint64(100)));
        assert_eq!(entries[1].value(), Some(&ItemValue::Uint64(200)));
        assert_eq!(stats.min_failed, 2);
    }

    #[test]
    fn test_mismatch_on_single_oid_still_used() {
        let target = Target::v2c("10.0.0.1", 161, "public");
        let mut agent = MockAgent::new();
        agent.push_response(Ok(Response::ok(vec![(
            Oid::parse("1.3.6.1.2.1.1.3").unwrap(),
            Value::Timeticks(5),
        )])));
        let mut entries = vec![FetchEntry::new(".1.3.6.1.2.1.1.3.0")];
        let mut stats = BatchStats::new(128);

        get_values(&mut agent, ctx(&target), &mut entries, 0, &mut stats).unwrap();
        assert_eq!(entries[0].value(), Some(&ItemValue::Uint64(5)));
    }

    #[test]
    fn test_extra_bindings_at_size_one() {
        let target = Target::v2c("10.0.0.1", 161, "public");
        let mut agent = MockAgent::new();
        let name = Oid::parse("1.3.6.1.2.1.1.3.0").unwrap();
        agent.push_response(Ok(Response::ok(vec![
            (name.clone(), Value::Timeticks(5)),
            (name, Value::Timeticks(6)),
        ])));
        let mut entries = vec![FetchEntry::new(".1.3.6.1.2.1.1.3.0")];
        let mut stats = BatchStats::new(128);

        get_values(&mut agent, ctx(&target), &mut entries, 0, &mut stats).unwrap();
        assert_eq!(
            entries[0].outcome,
            Outcome::Error(PollError::NotSupported(
                "Invalid SNMP response: too many variable bindings.".into()
            ))
        );
        assert_eq!(stats.max_succeeded, 0);
    }

    #[test]
    fn test_exception_value_fails_only_that_entry() {
        let target = Target::v2c("10.0.0.1", 161, "public");
        let mut agent = agent_with_counters(1);
        let mut entries = vec![
            FetchEntry::new(".1.3.6.1.2.1.2.2.1.10.1"),
            FetchEntry::new(".1.3.6.1.2.1.2.2.1.10.9"),
        ];
        let mut stats = BatchStats::new(128);

        get_values(&mut agent, ctx(&target), &mut entries, 0, &mut stats).unwrap();

        assert!(entries[0].value().is_some());
        assert_eq!(
            entries[1].clone().into_result(),
            Err(PollError::NotSupported(
                "No Such Instance currently exists at this OID".into()
            ))
        );
    }

    #[test]
    fn test_gen_err_at_size_one_stays_with_entry() {
        let target = Target::v2c("10.0.0.1", 161, "public");
        let mut agent = agent_with_counters(2);
        for _ in 0..3 {
            agent.push_response(Ok(Response::error(ErrorStatus::GenErr, 0)));
        }
        let mut entries = entries(2);
        let mut stats = BatchStats::new(128);

        // genErr on the batch of 2 at level 0 is reported for the batch
        let err = get_values(&mut agent, ctx(&target), &mut entries, 0, &mut stats).unwrap_err();
        assert!(err.message().starts_with("SNMP error: (genError)"));

        // at level 1 it splits, and the single genErr stays with its entry
        let mut entries = self::entries(2);
        get_values(&mut agent, ctx(&target), &mut entries, 1, &mut stats).unwrap();
        assert!(matches!(entries[0].outcome, Outcome::Error(PollError::NotSupported(_))));
        assert_eq!(entries[1].value(), Some(&ItemValue::Uint64(200)));
    }

    #[test]
    fn test_lenient_entry_keeps_going() {
        let target = Target::v2c("10.0.0.1", 161, "public");
        let mut agent = MockAgent::new().v1_errors();
        let mut entries = vec![
            FetchEntry::lenient(".1.3.6.1.2.1.2.2.1.2.3"),
            FetchEntry::lenient(".1.3.6.1.2.1.2.2.1.2.4"),
        ];
        let mut stats = BatchStats::new(128);

        get_values(&mut agent, ctx(&target), &mut entries, 0, &mut stats).unwrap();
        assert!(entries.iter().all(|e| e.outcome == Outcome::Pending));
        assert!(agent
            .requests()
            .iter()
            .all(|r| r.kind == PduKind::Get));
    }

    #[test]
    fn test_fail_remaining_keeps_existing_errors() {
        let mut entries = vec![
            FetchEntry::failed("x", PollError::Config("bad".into())),
            FetchEntry::new(".1.3"),
        ];
        fail_remaining(&mut entries, &PollError::Network("down".into()));
        assert_eq!(entries[0].outcome, Outcome::Error(PollError::Config("bad".into())));
        assert_eq!(entries[1].outcome, Outcome::Error(PollError::Network("down".into())));
    }
}
