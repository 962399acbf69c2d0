//! SNMP value acquisition for a monitoring poller: adaptive batched GET,
//! value-addressed table indices with a per-worker cache, loop-safe
//! subtree walks and low-level discovery rows.

pub mod config;
pub mod secret;
pub mod snmp;
pub mod worker;
