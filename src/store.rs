//! In-memory store of live feed entities, keyed by signature.
//!
//! Each entity is encoded to wire bytes once, at insertion. Snapshot assembly
//! concatenates the pre-encoded chunks with hand-rolled field framing, so a
//! snapshot request never re-encodes entities that did not change. The
//! assembled buffer is memoized and dropped on any mutation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use indexmap::IndexMap;
use prost::Message;
use prost::encoding::WireType;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::framing::{FEED_MSG_ENTITIES, FEED_MSG_HEADER, encode_field};
use crate::gtfs_rt::{FeedEntity, FeedHeader, feed_header::Incrementality};

/// Epoch-seconds clock, swappable in tests.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Wall clock in POSIX seconds.
pub fn system_clock() -> Clock {
    Arc::new(|| Utc::now().timestamp().max(0) as u64)
}

/// Longest single-shot expiry timer the store will arm. Deadlines further out
/// are capped at this delay without re-arming, so such entities expire early
/// rather than on schedule. Known limitation, kept deliberately.
pub const MAX_TIMER_DELAY: Duration = Duration::from_secs(30 * 24 * 60 * 60);

struct EntityRecord {
    /// Wire encoding of the entity payload, produced once at insertion.
    encoded: Vec<u8>,
    /// Field key + varint length framing `encoded` as `FeedMessage.entity`.
    field: Vec<u8>,
    /// Timestamp feeding the snapshot header, not the expiry.
    observed_timestamp: u64,
    expires_at: Option<u64>,
    timer: Option<AbortHandle>,
    /// Guards the expiry queue against firings for a replaced record.
    epoch: u64,
}

/// Store of all currently-live entities of one ingestion pipeline.
///
/// Single-writer: expiry timers never touch the store directly, they post the
/// signature to an internal queue which is drained at the start of every
/// public operation. Deletions are thereby serialized with puts and reads.
pub struct EntitiesStore {
    records: IndexMap<String, EntityRecord>,
    /// Sorted multiset of the live records' observed timestamps
    /// (value -> occurrence count). Max = snapshot header timestamp.
    timestamps: BTreeMap<u64, usize>,
    /// Assembled snapshot, present only while no mutation has happened since.
    cache: Option<Vec<u8>>,
    clock: Clock,
    next_epoch: u64,
    expired_tx: mpsc::UnboundedSender<(String, u64)>,
    expired_rx: mpsc::UnboundedReceiver<(String, u64)>,
}

impl EntitiesStore {
    pub fn new(clock: Clock) -> Self {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        Self {
            records: IndexMap::new(),
            timestamps: BTreeMap::new(),
            cache: None,
            clock,
            next_epoch: 0,
            expired_tx,
            expired_rx,
        }
    }

    fn now(&self) -> u64 {
        (self.clock)()
    }

    /// Applies expiries whose timers have fired since the last operation.
    fn reap(&mut self) {
        while let Ok((signature, epoch)) = self.expired_rx.try_recv() {
            let expired = match self.records.get(&signature) {
                Some(record) if record.epoch == epoch => Some(record.expires_at),
                _ => None, // raced a replacement or deletion, ignore
            };
            if let Some(deadline) = expired {
                debug!(signature = %signature, ?deadline, "entity expired");
                self.remove(&signature);
                self.cache = None;
            }
        }
    }

    /// Drops one record: cancels its timer, removes exactly one occurrence of
    /// its timestamp, preserves the insertion order of the remaining records.
    fn remove(&mut self, signature: &str) -> bool {
        let Some(record) = self.records.shift_remove(signature) else {
            return false;
        };
        if let Some(timer) = record.timer {
            timer.abort();
        }
        match self.timestamps.get_mut(&record.observed_timestamp) {
            Some(count) if *count > 1 => *count -= 1,
            _ => {
                self.timestamps.remove(&record.observed_timestamp);
            }
        }
        true
    }

    fn schedule_expiry(&self, signature: String, epoch: u64, deadline: u64, now: u64) -> AbortHandle {
        let delay = Duration::from_secs(deadline - now).min(MAX_TIMER_DELAY);
        // The wake instant is fixed here, not at the task's first poll, so
        // the deletion lands at the computed deadline regardless of when the
        // scheduler gets around to the timer task.
        let wake_at = tokio::time::Instant::now() + delay;
        let tx = self.expired_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(wake_at).await;
            // Receiver gone means the store was dropped; nothing to expire.
            let _ = tx.send((signature, epoch));
        });
        task.abort_handle()
    }

    /// Inserts or replaces the entity stored under `signature`.
    ///
    /// Replacement moves the signature to the end of the iteration order.
    /// An `expires_at` at or before now removes any prior record but stores
    /// nothing. `None` means the entity only ever leaves via [`Self::del`]
    /// or [`Self::flush`].
    pub fn put(&mut self, signature: String, entity: &FeedEntity, expires_at: Option<u64>) {
        self.reap();
        self.remove(&signature);
        self.cache = None;

        let now = self.now();
        let epoch = self.next_epoch;
        self.next_epoch += 1;

        let timer = match expires_at {
            Some(deadline) if deadline <= now => return,
            Some(deadline) => Some(self.schedule_expiry(signature.clone(), epoch, deadline, now)),
            None => None,
        };

        let encoded = entity.encode_to_vec();
        let field = encode_field(FEED_MSG_ENTITIES, WireType::LengthDelimited, encoded.len());

        let observed_timestamp = entity_timestamp(entity).unwrap_or(now);
        *self.timestamps.entry(observed_timestamp).or_insert(0) += 1;

        self.records.insert(
            signature,
            EntityRecord {
                encoded,
                field,
                observed_timestamp,
                expires_at,
                timer,
                epoch,
            },
        );
    }

    /// Removes the record stored under `signature`; no-op if absent.
    pub fn del(&mut self, signature: &str) {
        self.reap();
        if self.remove(signature) {
            self.cache = None;
        }
    }

    /// Cancels every timer and clears all records; the store returns to its
    /// just-constructed state.
    pub fn flush(&mut self) {
        self.reap();
        for (_, record) in self.records.drain(..) {
            if let Some(timer) = record.timer {
                timer.abort();
            }
        }
        self.timestamps.clear();
        self.cache = None;
    }

    /// Number of live records.
    pub fn nr_of_entities(&mut self) -> usize {
        self.reap();
        self.records.len()
    }

    /// Max observed timestamp among live records, or now if empty. Derived
    /// from the multiset, so it stays correct when the current maximum's
    /// entity is deleted out of order.
    pub fn get_timestamp(&mut self) -> u64 {
        self.reap();
        self.max_timestamp().unwrap_or_else(|| self.now())
    }

    fn max_timestamp(&self) -> Option<u64> {
        self.timestamps.last_key_value().map(|(ts, _)| *ts)
    }

    /// Assembles (or returns the memoized) FULL_DATASET `FeedMessage`.
    ///
    /// One exact-capacity allocation per rebuild: framed header followed by
    /// every record's pre-encoded framing and payload, in insertion order.
    /// Byte-identical to prost encoding the equivalent `FeedMessage`.
    pub fn as_feed_message(&mut self) -> &[u8] {
        self.reap();
        let buf = match self.cache.take() {
            Some(buf) => buf,
            None => self.assemble(),
        };
        self.cache.insert(buf)
    }

    fn assemble(&self) -> Vec<u8> {
        let header = FeedHeader {
            gtfs_realtime_version: "2.0".to_string(),
            incrementality: Some(Incrementality::FullDataset as i32),
            timestamp: Some(self.max_timestamp().unwrap_or_else(|| self.now())),
        };
        let header_bytes = header.encode_to_vec();
        let header_field =
            encode_field(FEED_MSG_HEADER, WireType::LengthDelimited, header_bytes.len());

        let mut total = header_field.len() + header_bytes.len();
        for record in self.records.values() {
            total += record.field.len() + record.encoded.len();
        }

        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&header_field);
        buf.extend_from_slice(&header_bytes);
        for record in self.records.values() {
            buf.extend_from_slice(&record.field);
            buf.extend_from_slice(&record.encoded);
        }
        debug_assert_eq!(buf.len(), total);
        buf
    }
}

/// The entity's own timestamp, if its payload carries one.
fn entity_timestamp(entity: &FeedEntity) -> Option<u64> {
    if let Some(trip_update) = &entity.trip_update {
        if trip_update.timestamp.is_some() {
            return trip_update.timestamp;
        }
    }
    if let Some(vehicle) = &entity.vehicle {
        if vehicle.timestamp.is_some() {
            return vehicle.timestamp;
        }
    }
    None
}
