pub mod decode;
pub mod discovery;
pub mod dynamic;
pub mod fetch;
pub mod index_cache;
pub mod key;
pub mod oid;
pub mod poller;
pub mod render;
pub mod session;
pub mod stats;
pub mod target;
pub mod translate;
pub mod types;
pub mod walk;

pub use index_cache::IndexCache;
pub use oid::Oid;
pub use poller::{PollerSession, PollerSettings, DEFAULT_MAX_BATCH_ITEMS};
pub use render::{IndexRenderer, NumericIndex, StringIndex};
pub use session::{Connector, NetConnector, Session, TransportError};
pub use stats::{BatchHints, BatchStats, InterfaceStats};
pub use target::{
    AuthProtocol, Credentials, PrivProtocol, SecurityLevel, SnmpVersion, Target, V3Credentials,
};
pub use types::{ErrorKind, ItemRequest, ItemResult, ItemValue, PollError};
pub use walk::{WalkParams, WalkSink};
