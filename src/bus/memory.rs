// src/bus/memory.rs

//! In-process broker with consumer-group semantics.
//!
//! Shared by a scheduler and any number of workers inside one process. State
//! lives behind a std `Mutex` that is never held across an `.await`; blocking
//! reads park on a tokio `Notify` that every append wakes.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use crate::bus::{BusFuture, EntryId, EventBus, Fields, StreamEntry};
use crate::errors::{MissionError, Result};

#[derive(Debug)]
struct PendingEntry {
    consumer: String,
    delivered_at: Instant,
    deliveries: u32,
}

#[derive(Debug, Default)]
struct GroupState {
    /// Highest id ever handed out to any consumer of this group.
    last_delivered: EntryId,
    /// Delivered but not yet acknowledged.
    pending: BTreeMap<EntryId, PendingEntry>,
}

#[derive(Debug, Default)]
struct StreamLog {
    /// Entry `n` has id `n + 1`; entries are never removed.
    entries: Vec<StreamEntry>,
    groups: HashMap<String, GroupState>,
}

impl StreamLog {
    fn last_id(&self) -> EntryId {
        self.entries.last().map(|e| e.id).unwrap_or(EntryId::START)
    }

    fn entries_after(&self, after: EntryId, max_count: usize) -> Vec<StreamEntry> {
        let start = usize::try_from(after.seq()).unwrap_or(usize::MAX);
        self.entries
            .iter()
            .skip(start)
            .take(max_count)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
struct BusState {
    streams: HashMap<String, StreamLog>,
}

/// In-memory [`EventBus`] implementation.
#[derive(Debug)]
pub struct MemoryBus {
    state: Mutex<BusState>,
    appended: Notify,
    available: AtomicBool,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BusState::default()),
            appended: Notify::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate a broker outage (or recovery). While unavailable every call
    /// fails with [`MissionError::BrokerUnavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        if available {
            self.appended.notify_waiters();
        }
    }

    /// Number of entries ever appended to `stream`.
    pub fn len(&self, stream: &str) -> usize {
        self.lock()
            .streams
            .get(stream)
            .map(|s| s.entries.len())
            .unwrap_or(0)
    }

    /// Copy of every entry in `stream`, oldest first.
    pub fn snapshot(&self, stream: &str) -> Vec<StreamEntry> {
        self.lock()
            .streams
            .get(stream)
            .map(|s| s.entries.clone())
            .unwrap_or_default()
    }

    /// Number of unacknowledged entries in a consumer group.
    pub fn pending_count(&self, stream: &str, group: &str) -> usize {
        self.lock()
            .streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .map(|g| g.pending.len())
            .unwrap_or(0)
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MissionError::BrokerUnavailable(
                "memory broker marked unavailable".to_string(),
            ))
        }
    }

    /// Run `poll` against the state until it yields entries or `block`
    /// elapses. A zero `block` polls exactly once.
    async fn poll_blocking<F>(&self, block: Duration, mut poll: F) -> Result<Vec<StreamEntry>>
    where
        F: FnMut(&mut BusState) -> Result<Vec<StreamEntry>> + Send,
    {
        // `None` when the block is too large to represent: wait for appends only.
        let deadline = tokio::time::Instant::now().checked_add(block);

        loop {
            let notified = self.appended.notified();
            tokio::pin!(notified);
            // Register before polling so an append between the poll and the
            // wait is not missed.
            notified.as_mut().enable();

            self.check_available()?;
            let found = {
                let mut state = self.lock();
                poll(&mut state)?
            };

            if !found.is_empty() || block.is_zero() {
                return Ok(found);
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(Vec::new());
                    }
                }
                None => notified.await,
            }
        }
    }
}

fn entry_at(entries: &[StreamEntry], id: EntryId) -> Option<&StreamEntry> {
    let idx = usize::try_from(id.seq()).ok()?.checked_sub(1)?;
    entries.get(idx)
}

fn group_mut<'a>(
    state: &'a mut BusState,
    stream: &str,
    group: &str,
) -> Result<(&'a mut GroupState, &'a Vec<StreamEntry>)> {
    let log = state
        .streams
        .get_mut(stream)
        .ok_or_else(|| MissionError::UnknownGroup {
            stream: stream.to_string(),
            group: group.to_string(),
        })?;
    let StreamLog { entries, groups } = log;
    let group_state = groups
        .get_mut(group)
        .ok_or_else(|| MissionError::UnknownGroup {
            stream: stream.to_string(),
            group: group.to_string(),
        })?;
    Ok((group_state, entries))
}

impl EventBus for MemoryBus {
    fn append(&self, stream: &str, fields: Fields) -> BusFuture<'_, EntryId> {
        let stream = stream.to_string();

        Box::pin(async move {
            self.check_available()?;
            let id = {
                let mut state = self.lock();
                let log = state.streams.entry(stream.clone()).or_default();
                let id = EntryId::new(log.last_id().seq() + 1);
                log.entries.push(StreamEntry { id, fields });
                id
            };
            trace!(stream = %stream, id = %id, "appended entry");
            self.appended.notify_waiters();
            Ok(id)
        })
    }

    fn read(
        &self,
        stream: &str,
        after: EntryId,
        block: Duration,
        max_count: usize,
    ) -> BusFuture<'_, Vec<StreamEntry>> {
        let stream = stream.to_string();

        Box::pin(async move {
            self.poll_blocking(block, |state| {
                Ok(state
                    .streams
                    .get(&stream)
                    .map(|log| log.entries_after(after, max_count))
                    .unwrap_or_default())
            })
            .await
        })
    }

    fn last_id(&self, stream: &str) -> BusFuture<'_, EntryId> {
        let stream = stream.to_string();

        Box::pin(async move {
            self.check_available()?;
            let state = self.lock();
            Ok(state
                .streams
                .get(&stream)
                .map(StreamLog::last_id)
                .unwrap_or(EntryId::START))
        })
    }

    fn ensure_group(&self, stream: &str, group: &str) -> BusFuture<'_, ()> {
        let stream = stream.to_string();
        let group = group.to_string();

        Box::pin(async move {
            self.check_available()?;
            let mut state = self.lock();
            let log = state.streams.entry(stream.clone()).or_default();
            if !log.groups.contains_key(&group) {
                debug!(stream = %stream, group = %group, "created consumer group");
                log.groups.insert(group, GroupState::default());
            }
            Ok(())
        })
    }

    fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block: Duration,
        max_count: usize,
    ) -> BusFuture<'_, Vec<StreamEntry>> {
        let stream = stream.to_string();
        let group = group.to_string();
        let consumer = consumer.to_string();

        Box::pin(async move {
            self.poll_blocking(block, |state| {
                let (group_state, entries) = group_mut(state, &stream, &group)?;
                let start = usize::try_from(group_state.last_delivered.seq()).unwrap_or(usize::MAX);
                let batch: Vec<StreamEntry> =
                    entries.iter().skip(start).take(max_count).cloned().collect();

                let now = Instant::now();
                for entry in &batch {
                    group_state.last_delivered = entry.id;
                    group_state.pending.insert(
                        entry.id,
                        PendingEntry {
                            consumer: consumer.clone(),
                            delivered_at: now,
                            deliveries: 1,
                        },
                    );
                }
                Ok(batch)
            })
            .await
        })
    }

    fn pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        max_count: usize,
    ) -> BusFuture<'_, Vec<StreamEntry>> {
        let stream = stream.to_string();
        let group = group.to_string();
        let consumer = consumer.to_string();

        Box::pin(async move {
            self.check_available()?;
            let mut state = self.lock();
            let (group_state, entries) = group_mut(&mut state, &stream, &group)?;

            let now = Instant::now();
            let mut out = Vec::new();
            for (id, pending) in group_state.pending.iter_mut() {
                if out.len() >= max_count {
                    break;
                }
                if pending.consumer != consumer {
                    continue;
                }
                if let Some(entry) = entry_at(entries, *id) {
                    pending.deliveries += 1;
                    pending.delivered_at = now;
                    out.push(entry.clone());
                }
            }
            Ok(out)
        })
    }

    fn claim_idle(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        max_count: usize,
    ) -> BusFuture<'_, Vec<StreamEntry>> {
        let stream = stream.to_string();
        let group = group.to_string();
        let consumer = consumer.to_string();

        Box::pin(async move {
            self.check_available()?;
            let mut state = self.lock();
            let (group_state, entries) = group_mut(&mut state, &stream, &group)?;

            let now = Instant::now();
            let mut out = Vec::new();
            for (id, pending) in group_state.pending.iter_mut() {
                if out.len() >= max_count {
                    break;
                }
                if pending.consumer == consumer
                    || now.duration_since(pending.delivered_at) < min_idle
                {
                    continue;
                }
                if let Some(entry) = entry_at(entries, *id) {
                    warn!(
                        stream = %stream,
                        id = %id,
                        from = %pending.consumer,
                        to = %consumer,
                        deliveries = pending.deliveries,
                        "claiming idle pending entry"
                    );
                    pending.consumer = consumer.clone();
                    pending.delivered_at = now;
                    pending.deliveries += 1;
                    out.push(entry.clone());
                }
            }
            Ok(out)
        })
    }

    fn ack(&self, stream: &str, group: &str, id: EntryId) -> BusFuture<'_, bool> {
        let stream = stream.to_string();
        let group = group.to_string();

        Box::pin(async move {
            self.check_available()?;
            let mut state = self.lock();
            let (group_state, _) = group_mut(&mut state, &stream, &group)?;
            Ok(group_state.pending.remove(&id).is_some())
        })
    }
}
