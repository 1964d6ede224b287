//! Default expiry policies for trip updates and vehicle positions.
//!
//! Both take `(payload, now, ttl)` in POSIX seconds and return the absolute
//! deadline after which the entity should be evicted absent a refreshing
//! update. Callers may plug in alternatives with the same shape.

use crate::gtfs_rt::{TripUpdate, VehiclePosition};

/// A trip update stays relevant until shortly after its last predicted stop:
/// max over all `stop_time_update` arrival/departure times, plus the TTL.
/// Falls back to the update's own timestamp, then to now.
pub fn trip_update_expires_at(update: &TripUpdate, now: u64, ttl: u64) -> u64 {
    let max_arr_dep = update
        .stop_time_update
        .iter()
        .flat_map(|stu| {
            [
                stu.arrival.as_ref().and_then(|event| event.time),
                stu.departure.as_ref().and_then(|event| event.time),
            ]
        })
        .flatten()
        .max();
    if let Some(max_arr_dep) = max_arr_dep {
        return u64::try_from(max_arr_dep).unwrap_or(0) + ttl;
    }
    if let Some(timestamp) = update.timestamp {
        return timestamp + ttl;
    }
    now + ttl
}

/// A vehicle position goes stale a TTL after it was measured; without its own
/// timestamp, a TTL after ingestion.
pub fn vehicle_position_expires_at(position: &VehiclePosition, now: u64, ttl: u64) -> u64 {
    match position.timestamp {
        Some(timestamp) => timestamp + ttl,
        None => now + ttl,
    }
}
