//! In-memory agent for tests and dry runs.
//!
//! Serves GET/GETNEXT/GETBULK from a sorted MIB and can be told to behave
//! like a constrained or broken device: reject large GETs with tooBig,
//! truncate bulk responses, time out or refuse to encode above a request
//! size, answer with v1 noSuchName errors, replay scripted responses, or
//! walk in a cycle.
//! Clones share state, so a test can keep a handle and inspect the
//! requests the engine sent.

use super::{Connector, ErrorStatus, PduKind, Request, Response, Session, TransportError};
use crate::snmp::oid::Oid;
use crate::snmp::target::Target;
use crate::snmp::types::Value;
use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Default)]
struct AgentState {
    mib: BTreeMap<Oid, Value>,
    max_get_varbinds: Option<usize>,
    max_bulk_varbinds: Option<usize>,
    timeout_above: Option<usize>,
    too_long_above: Option<usize>,
    no_such_name: bool,
    scripted: VecDeque<Result<Response, TransportError>>,
    cycle: Vec<Oid>,
    cycle_pos: usize,
    requests: Vec<Request>,
}

#[derive(Clone, Default)]
pub struct MockAgent {
    state: Arc<Mutex<AgentState>>,
}

fn oid(s: &str) -> Oid {
    Oid::parse(s).unwrap_or_default()
}

impl MockAgent {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, AgentState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_entry(self, name: &str, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&self, name: &str, value: Value) {
        self.state().mib.insert(oid(name), value);
    }

    pub fn remove(&self, name: &str) {
        self.state().mib.remove(&oid(name));
    }

    /// GETs carrying more bindings than this get `tooBig`.
    pub fn max_get_varbinds(self, max: usize) -> Self {
        self.state().max_get_varbinds = Some(max);
        self
    }

    /// GETBULK responses never carry more bindings than this.
    pub fn max_bulk_varbinds(self, max: usize) -> Self {
        self.state().max_bulk_varbinds = Some(max);
        self
    }

    /// Requests asking for more than this many bindings time out.
    pub fn timeout_above(self, max: usize) -> Self {
        self.state().timeout_above = Some(max);
        self
    }

    /// Requests asking for more than this many bindings cannot be sent.
    pub fn too_long_above(self, max: usize) -> Self {
        self.state().too_long_above = Some(max);
        self
    }

    /// Report missing GET instances as a v1 `noSuchName` error.
    pub fn v1_errors(self) -> Self {
        self.state().no_such_name = true;
        self
    }

    /// GETNEXT/GETBULK ignore the request and return these OIDs in turn, forever.
    pub fn cycle_walk(self, names: &[&str]) -> Self {
        self.state().cycle = names.iter().map(|n| oid(n)).collect();
        self
    }

    /// Next request gets this answer instead of the MIB's.
    pub fn push_response(&self, response: Result<Response, TransportError>) {
        self.state().scripted.push_back(response);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.state().requests.clone()
    }

    pub fn clear_requests(&self) {
        self.state().requests.clear();
    }

    pub fn connector(&self) -> MockConnector {
        MockConnector::new(self.clone())
    }
}

impl AgentState {
    fn next_after(&self, from: &Oid) -> Option<(Oid, Value)> {
        self.mib
            .range((Bound::Excluded(from.clone()), Bound::Unbounded))
            .next()
            .map(|(o, v)| (o.clone(), v.clone()))
    }

    fn next_in_cycle(&mut self) -> (Oid, Value) {
        let name = self.cycle[self.cycle_pos % self.cycle.len()].clone();
        self.cycle_pos += 1;
        (name, Value::Integer(1))
    }

    fn get(&self, oids: &[Oid]) -> Response {
        if self.max_get_varbinds.is_some_and(|max| oids.len() > max) {
            return Response::error(ErrorStatus::TooBig, 0);
        }

        let mut varbinds = Vec::with_capacity(oids.len());
        for (i, name) in oids.iter().enumerate() {
            match self.mib.get(name) {
                Some(value) => varbinds.push((name.clone(), value.clone())),
                None if self.no_such_name => {
                    let mut response = Response::error(ErrorStatus::NoSuchName, i as u32 + 1);
                    response.varbinds = oids.iter().map(|o| (o.clone(), Value::Null)).collect();
                    return response;
                }
                None => varbinds.push((name.clone(), Value::NoSuchInstance)),
            }
        }
        Response::ok(varbinds)
    }

    fn get_bulk(&mut self, start: &Oid, max_repetitions: usize) -> Response {
        let limit = self
            .max_bulk_varbinds
            .map_or(max_repetitions, |max| max.min(max_repetitions))
            .max(1);

        if !self.cycle.is_empty() {
            let varbinds = (0..limit).map(|_| self.next_in_cycle()).collect();
            return Response::ok(varbinds);
        }

        let mut varbinds = Vec::with_capacity(limit);
        let mut position = start.clone();
        while varbinds.len() < limit {
            match self.next_after(&position) {
                Some((name, value)) => {
                    position = name.clone();
                    varbinds.push((name, value));
                }
                None => {
                    varbinds.push((position.clone(), Value::EndOfMibView));
                    break;
                }
            }
        }
        Response::ok(varbinds)
    }
}

impl Session for MockAgent {
    fn send(&mut self, request: &Request) -> Result<Response, TransportError> {
        let mut state = self.state();
        state.requests.push(request.clone());

        if let Some(scripted) = state.scripted.pop_front() {
            return scripted;
        }

        let size = match request.kind {
            PduKind::Get => request.oids.len(),
            PduKind::GetNext => 1,
            PduKind::GetBulk {
                max_repetitions, ..
            } => max_repetitions as usize,
        };
        if state.too_long_above.is_some_and(|max| size > max) {
            return Err(TransportError::TooLong);
        }
        if state.timeout_above.is_some_and(|max| size > max) {
            return Err(TransportError::Timeout);
        }

        let Some(first) = request.oids.first() else {
            return Ok(Response::ok(Vec::new()));
        };

        let response = match request.kind {
            PduKind::Get => state.get(&request.oids),
            PduKind::GetNext if !state.cycle.is_empty() => {
                Response::ok(vec![state.next_in_cycle()])
            }
            PduKind::GetNext => match state.next_after(first) {
                Some(binding) => Response::ok(vec![binding]),
                None => Response::ok(vec![(first.clone(), Value::EndOfMibView)]),
            },
            PduKind::GetBulk {
                max_repetitions, ..
            } => state.get_bulk(first, max_repetitions as usize),
        };
        Ok(response)
    }
}

/// Hands out sessions onto one shared [`MockAgent`].
#[derive(Clone)]
pub struct MockConnector {
    agent: MockAgent,
    fail_open: Option<TransportError>,
    opened: Arc<AtomicUsize>,
    initialized: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new(agent: MockAgent) -> Self {
        Self {
            agent,
            fail_open: None,
            opened: Arc::new(AtomicUsize::new(0)),
            initialized: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every `open` fails with `error`.
    pub fn failing(agent: MockAgent, error: TransportError) -> Self {
        Self {
            fail_open: Some(error),
            ..Self::new(agent)
        }
    }

    pub fn agent(&self) -> &MockAgent {
        &self.agent
    }

    pub fn sessions_opened(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }

    pub fn init_count(&self) -> usize {
        self.initialized.load(Ordering::Relaxed)
    }
}

impl Connector for MockConnector {
    fn initialize(&self) {
        self.initialized.fetch_add(1, Ordering::Relaxed);
    }

    fn open(
        &self,
        _target: &Target,
        _timeout: Duration,
    ) -> Result<Box<dyn Session>, TransportError> {
        if let Some(error) = &self.fail_open {
            return Err(error.clone());
        }
        self.opened.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(self.agent.clone()))
    }
}
