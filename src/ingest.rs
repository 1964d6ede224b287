//! Turns a stream of DIFFERENTIAL feed messages into one FULL_DATASET
//! snapshot: validates headers, derives a stable signature and an expiry
//! deadline per entity, and forwards both to the entity store.

use std::time::Duration;

use tracing::debug;

use crate::error::IngestError;
use crate::expiry;
use crate::gtfs_rt::{
    Alert, FeedEntity, FeedMessage, TripUpdate, VehiclePosition, feed_header::Incrementality,
};
use crate::signature;
use crate::store::{Clock, EntitiesStore, system_clock};

/// Signature policy: stable key for a trip update, `None` if underivable.
pub type TripUpdateSignature = fn(&TripUpdate) -> Option<String>;
/// Signature policy: stable key for a vehicle position, `None` if underivable.
pub type VehiclePositionSignature = fn(&VehiclePosition) -> Option<String>;
/// Expiry policy: `(payload, now, ttl)` -> absolute deadline in POSIX seconds.
pub type TripUpdateExpiresAt = fn(&TripUpdate, u64, u64) -> u64;
/// Expiry policy for vehicle positions, same shape.
pub type VehiclePositionExpiresAt = fn(&VehiclePosition, u64, u64) -> u64;

/// Configuration of a [`DifferentialToFullDataset`] pipeline. The defaults
/// match the documented signature and expiry rules; every policy is
/// swappable.
pub struct Options {
    /// Time-to-live added on top of an entity's last relevant timestamp.
    pub ttl: Duration,
    pub clock: Clock,
    pub trip_update_signature: TripUpdateSignature,
    pub vehicle_position_signature: VehiclePositionSignature,
    pub trip_update_expires_at: TripUpdateExpiresAt,
    pub vehicle_position_expires_at: VehiclePositionExpiresAt,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            clock: system_clock(),
            trip_update_signature: signature::trip_update_signature,
            vehicle_position_signature: signature::vehicle_position_signature,
            trip_update_expires_at: expiry::trip_update_expires_at,
            vehicle_position_expires_at: expiry::vehicle_position_expires_at,
        }
    }
}

/// Exactly one payload kind must be populated per entity.
enum EntityPayload<'a> {
    TripUpdate(&'a TripUpdate),
    VehiclePosition(&'a VehiclePosition),
    Alert(&'a Alert),
}

fn entity_payload(entity: &FeedEntity) -> Result<EntityPayload<'_>, IngestError> {
    match (&entity.trip_update, &entity.vehicle, &entity.alert) {
        (Some(trip_update), None, None) => Ok(EntityPayload::TripUpdate(trip_update)),
        (None, Some(vehicle), None) => Ok(EntityPayload::VehiclePosition(vehicle)),
        (None, None, Some(alert)) => Ok(EntityPayload::Alert(alert)),
        _ => Err(IngestError::UnsupportedEntityKind {
            entity: Box::new(entity.clone()),
        }),
    }
}

/// Consumes DIFFERENTIAL `FeedMessage`s and serves the FULL_DATASET snapshot
/// of everything still live.
///
/// Two states: accepting (normal) and finalized (after [`Self::finish`],
/// further writes fail). One malformed message is terminal for the stream
/// and mutates nothing.
pub struct DifferentialToFullDataset {
    store: EntitiesStore,
    clock: Clock,
    ttl: u64,
    trip_update_signature: TripUpdateSignature,
    vehicle_position_signature: VehiclePositionSignature,
    trip_update_expires_at: TripUpdateExpiresAt,
    vehicle_position_expires_at: VehiclePositionExpiresAt,
    /// Snapshot captured by `finish`; its presence means the stream is closed.
    finalized: Option<Vec<u8>>,
    on_change: Option<Box<dyn FnMut() + Send>>,
}

impl DifferentialToFullDataset {
    pub fn new(options: Options) -> Self {
        Self {
            store: EntitiesStore::new(options.clock.clone()),
            clock: options.clock,
            ttl: options.ttl.as_secs(),
            trip_update_signature: options.trip_update_signature,
            vehicle_position_signature: options.vehicle_position_signature,
            trip_update_expires_at: options.trip_update_expires_at,
            vehicle_position_expires_at: options.vehicle_position_expires_at,
            finalized: None,
            on_change: None,
        }
    }

    /// Registers a callback fired synchronously after every successfully
    /// processed message (and after a batch's applied prefix), before any
    /// error is surfaced and before any subsequent read.
    pub fn set_on_change(&mut self, callback: impl FnMut() + Send + 'static) {
        self.on_change = Some(Box::new(callback));
    }

    fn notify_change(&mut self) {
        if let Some(callback) = &mut self.on_change {
            callback();
        }
    }

    /// Applies one DIFFERENTIAL message. Entities present are upserts,
    /// tombstoned entities (`is_deleted`) are removals.
    pub fn process_feed_message(&mut self, message: &FeedMessage) -> Result<(), IngestError> {
        self.apply_feed_message(message)?;
        self.notify_change();
        Ok(())
    }

    /// Applies messages in order. A failure aborts the batch; messages
    /// already applied stay applied (no rollback), and the change
    /// notification for that prefix fires before the error is returned.
    pub fn process_batch(&mut self, messages: &[FeedMessage]) -> Result<(), IngestError> {
        for message in messages {
            self.apply_feed_message(message)?;
            self.notify_change();
        }
        Ok(())
    }

    fn apply_feed_message(&mut self, message: &FeedMessage) -> Result<(), IngestError> {
        if self.finalized.is_some() {
            return Err(IngestError::Finalized);
        }
        if message.header.gtfs_realtime_version != "2.0"
            || message.header.incrementality() != Incrementality::Differential
        {
            return Err(IngestError::UnsupportedFeedMessage {
                header: message.header.clone(),
            });
        }
        for entity in &message.entity {
            self.apply_feed_entity(entity)?;
        }
        debug!(
            entities = message.entity.len(),
            live = self.store.nr_of_entities(),
            "applied FeedMessage"
        );
        Ok(())
    }

    fn apply_feed_entity(&mut self, entity: &FeedEntity) -> Result<(), IngestError> {
        let payload = entity_payload(entity)?;
        let now = (self.clock)();

        let (signature, expires_at) = match payload {
            EntityPayload::TripUpdate(trip_update) => (
                (self.trip_update_signature)(trip_update),
                (self.trip_update_expires_at)(trip_update, now, self.ttl),
            ),
            EntityPayload::VehiclePosition(vehicle) => (
                (self.vehicle_position_signature)(vehicle),
                (self.vehicle_position_expires_at)(vehicle, now, self.ttl),
            ),
            // Alerts are unsupported: no signature is derivable for them.
            EntityPayload::Alert(_) => (None, now + self.ttl),
        };

        let Some(signature) = signature else {
            return Err(IngestError::EntitySignature {
                entity: Box::new(entity.clone()),
            });
        };

        if entity.is_deleted() {
            self.store.del(&signature);
        } else {
            self.store.put(signature, entity, Some(expires_at));
        }
        Ok(())
    }

    /// Closes the stream: captures the final snapshot once, then flushes the
    /// store (cancelling all timers). The captured bytes stay valid and are
    /// what [`Self::as_feed_message`] returns from here on.
    pub fn finish(&mut self) -> &[u8] {
        let snapshot = match self.finalized.take() {
            Some(bytes) => bytes,
            None => {
                let bytes = self.store.as_feed_message().to_vec();
                self.store.flush();
                bytes
            }
        };
        self.finalized.insert(snapshot)
    }

    /// The current FULL_DATASET snapshot: the finalized bytes if the stream
    /// is closed, else the live store's assembly.
    pub fn as_feed_message(&mut self) -> &[u8] {
        match &self.finalized {
            Some(bytes) => bytes,
            None => self.store.as_feed_message(),
        }
    }

    /// Max observed timestamp among live entities (the snapshot header's
    /// timestamp), or now if none are live.
    pub fn time_modified(&mut self) -> u64 {
        self.store.get_timestamp()
    }

    /// Number of live entities.
    pub fn nr_of_entities(&mut self) -> usize {
        self.store.nr_of_entities()
    }
}
