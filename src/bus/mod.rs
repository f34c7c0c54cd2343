// src/bus/mod.rs

//! Event bus: durable, append-only, per-mission streams.
//!
//! The scheduler and the workers never talk to each other directly; every
//! interaction is an append to one of two streams per mission:
//!
//! - the **runnable** stream (scheduler -> workers), consumed through a
//!   consumer group so each record reaches exactly one worker, and
//! - the **events** stream (workers/scheduler -> scheduler), tailed with plain
//!   reads.
//!
//! - [`EventBus`] is the broker contract.
//! - [`memory`] provides [`MemoryBus`], an in-process broker.
//! - [`record`] is the wire codec for runnable records and lifecycle events.
//! - [`streams`] derives per-mission stream names from templates.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::BrokerConfig;
use crate::errors::{MissionError, Result};

pub mod memory;
pub mod record;
pub mod streams;

pub use memory::MemoryBus;
pub use record::{EventType, MissionEvent, RunnableRecord};
pub use streams::StreamNames;

/// Raw field map of a stream entry.
pub type Fields = BTreeMap<String, String>;

/// Boxed future returned by [`EventBus`] methods.
pub type BusFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Position of an entry within one stream.
///
/// Ids are strictly increasing per stream. [`EntryId::START`] sits before the
/// first entry, so reading "after START" reads the whole stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EntryId(u64);

impl EntryId {
    pub const START: EntryId = EntryId(0);

    pub fn new(seq: u64) -> Self {
        EntryId(seq)
    }

    pub fn seq(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = MissionError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<u64>()
            .map(EntryId)
            .map_err(|e| MissionError::Codec(format!("invalid entry id '{s}': {e}")))
    }
}

/// One entry read back from a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: EntryId,
    pub fields: Fields,
}

/// Broker contract used by the scheduler and the workers.
///
/// Implementations must only ever append: entries are never mutated or
/// removed, which is what makes concurrent publication from many workers
/// safe without further coordination.
pub trait EventBus: Send + Sync {
    /// Append an entry, returning its id.
    fn append(&self, stream: &str, fields: Fields) -> BusFuture<'_, EntryId>;

    /// Plain tail read: up to `max_count` entries with id > `after`, waiting
    /// at most `block` for the first one to arrive.
    fn read(
        &self,
        stream: &str,
        after: EntryId,
        block: Duration,
        max_count: usize,
    ) -> BusFuture<'_, Vec<StreamEntry>>;

    /// Id of the newest entry, or [`EntryId::START`] for an empty stream.
    fn last_id(&self, stream: &str) -> BusFuture<'_, EntryId>;

    /// Create a consumer group positioned at the start of the stream.
    /// Idempotent: an existing group is left untouched.
    fn ensure_group(&self, stream: &str, group: &str) -> BusFuture<'_, ()>;

    /// Deliver never-delivered entries to `consumer`, each entry to exactly
    /// one consumer of the group. Delivered entries stay pending until acked.
    fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block: Duration,
        max_count: usize,
    ) -> BusFuture<'_, Vec<StreamEntry>>;

    /// Entries delivered to `consumer` but not yet acknowledged.
    fn pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        max_count: usize,
    ) -> BusFuture<'_, Vec<StreamEntry>>;

    /// Take over entries that another consumer left pending for at least
    /// `min_idle`.
    fn claim_idle(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        max_count: usize,
    ) -> BusFuture<'_, Vec<StreamEntry>>;

    /// Acknowledge an entry. Returns `false` if it was not pending.
    fn ack(&self, stream: &str, group: &str, id: EntryId) -> BusFuture<'_, bool>;
}

/// Connect to the broker named in the configuration.
///
/// Only in-process `memory://` brokers are supported; any other scheme is
/// reported as [`MissionError::BrokerUnavailable`].
pub fn connect(cfg: &BrokerConfig) -> Result<Arc<MemoryBus>> {
    if cfg.address.starts_with("memory://") {
        info!(address = %cfg.address, "using in-process memory broker");
        Ok(Arc::new(MemoryBus::new()))
    } else {
        Err(MissionError::BrokerUnavailable(format!(
            "unsupported broker address '{}' (expected memory://...)",
            cfg.address
        )))
    }
}
