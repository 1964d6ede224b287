//! Error surface of the differential ingestor.

use thiserror::Error;

use crate::gtfs_rt::{FeedEntity, FeedHeader};

/// Errors raised while ingesting DIFFERENTIAL feed messages. All of them are
/// terminal for the stream; retrying is up to the caller, with fresh input.
///
/// Variants carry the offending header or entity for diagnostics.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Header is not GTFS-RT 2.0 or the message is not a DIFFERENTIAL delta.
    #[error(
        "unsupported FeedMessage: version must be \"2.0\" and incrementality DIFFERENTIAL (got version {:?})",
        .header.gtfs_realtime_version
    )]
    UnsupportedFeedMessage { header: FeedHeader },

    /// Not exactly one of trip_update / vehicle / alert is populated.
    #[error("invalid or unsupported kind of FeedEntity (id {:?})", .entity.id)]
    UnsupportedEntityKind { entity: Box<FeedEntity> },

    /// No stable signature could be derived for the entity. Alerts always
    /// end up here; they are unsupported.
    #[error("could not determine FeedEntity signature (id {:?})", .entity.id)]
    EntitySignature { entity: Box<FeedEntity> },

    /// The stream was closed with `finish`; no further writes are accepted.
    #[error("stream already finalized, no further FeedMessages accepted")]
    Finalized,
}
