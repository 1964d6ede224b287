use serde::Serialize;

use crate::gtfs_rt::FeedMessage;

/// Quick-look summary of one decoded feed, printed as JSON by `inspect`.
#[derive(Debug, Default, Serialize)]
pub struct FeedSummary {
    pub version: String,
    pub incrementality: String,
    pub timestamp: Option<u64>,
    pub total_entities: usize,

    // entity kinds
    pub trip_updates: usize,
    pub vehicles: usize,
    pub alerts: usize,
    pub deleted: usize,

    // field coverage
    pub with_position: usize,
    pub with_stop_time_updates: usize,
    pub with_timestamp: usize,
}

impl FeedSummary {
    pub fn from_feed(feed: &FeedMessage) -> Self {
        let mut s = FeedSummary {
            version: feed.header.gtfs_realtime_version.clone(),
            incrementality: format!("{:?}", feed.header.incrementality()),
            timestamp: feed.header.timestamp,
            total_entities: feed.entity.len(),
            ..Default::default()
        };

        for e in &feed.entity {
            if e.is_deleted() {
                s.deleted += 1;
            }

            if let Some(tu) = &e.trip_update {
                s.trip_updates += 1;
                if !tu.stop_time_update.is_empty() {
                    s.with_stop_time_updates += 1;
                }
                if tu.timestamp.is_some() {
                    s.with_timestamp += 1;
                }
            }

            if let Some(v) = &e.vehicle {
                s.vehicles += 1;
                if v.position.is_some() {
                    s.with_position += 1;
                }
                if v.timestamp.is_some() {
                    s.with_timestamp += 1;
                }
            }

            if e.alert.is_some() {
                s.alerts += 1;
            }
        }

        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtfs_rt::{
        FeedEntity, FeedHeader, Position, TripDescriptor, TripUpdate, VehiclePosition,
        feed_header::Incrementality,
    };

    #[test]
    fn test_summary_counts_entity_kinds() {
        let feed = FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                incrementality: Some(Incrementality::Differential as i32),
                timestamp: Some(7),
            },
            entity: vec![
                FeedEntity {
                    id: "1".to_string(),
                    trip_update: Some(TripUpdate {
                        trip: TripDescriptor::default(),
                        timestamp: Some(5),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                FeedEntity {
                    id: "2".to_string(),
                    vehicle: Some(VehiclePosition {
                        position: Some(Position {
                            latitude: 52.5,
                            longitude: 13.4,
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ],
        };

        let s = FeedSummary::from_feed(&feed);
        assert_eq!(s.version, "2.0");
        assert_eq!(s.incrementality, "Differential");
        assert_eq!(s.total_entities, 2);
        assert_eq!(s.trip_updates, 1);
        assert_eq!(s.vehicles, 1);
        assert_eq!(s.alerts, 0);
        assert_eq!(s.with_position, 1);
        assert_eq!(s.with_timestamp, 1);
    }
}
