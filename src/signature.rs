//! Stable signatures identifying "the same logical entity" across updates.
//!
//! A DIFFERENTIAL feed does not promise stable `FeedEntity.id`s, so updates
//! are keyed by what they describe: the trip (trip_id + start_date, falling
//! back to route_id + vehicle id) or the vehicle itself. Signatures carry a
//! kind prefix so trip updates and vehicle positions never collide.

use crate::gtfs_rt::{TripDescriptor, TripUpdate, VehicleDescriptor, VehiclePosition};

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}

fn trip_signature(
    trip: Option<&TripDescriptor>,
    vehicle: Option<&VehicleDescriptor>,
) -> Option<String> {
    let trip = trip?;
    if let (Some(trip_id), Some(start_date)) = (
        non_empty(trip.trip_id.as_deref()),
        non_empty(trip.start_date.as_deref()),
    ) {
        return Some(format!("{trip_id}-{start_date}"));
    }
    if let (Some(route_id), Some(vehicle_id)) = (
        non_empty(trip.route_id.as_deref()),
        non_empty(vehicle.and_then(|v| v.id.as_deref())),
    ) {
        return Some(format!("{route_id}-{vehicle_id}"));
    }
    None
}

/// Default signature for a trip update, or `None` if underivable.
pub fn trip_update_signature(update: &TripUpdate) -> Option<String> {
    trip_signature(Some(&update.trip), update.vehicle.as_ref())
        .map(|sig| format!("trip_update-{sig}"))
}

/// Default signature for a vehicle position. Prefers the bare vehicle id
/// over the trip-based fallback.
pub fn vehicle_position_signature(position: &VehiclePosition) -> Option<String> {
    if let Some(id) = non_empty(position.vehicle.as_ref().and_then(|v| v.id.as_deref())) {
        return Some(format!("vehicle_position-{id}"));
    }
    trip_signature(position.trip.as_ref(), position.vehicle.as_ref())
        .map(|sig| format!("vehicle_position-{sig}"))
}
