//! Protobuf parsers for GTFS Realtime feeds.

use anyhow::Result;
use bytes::Buf;
use prost::Message;

use crate::gtfs_rt::FeedMessage;

/// Decodes a protobuf-encoded GTFS-RT [`FeedMessage`] from raw bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid protobuf for a `FeedMessage`.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedMessage> {
    Ok(FeedMessage::decode(bytes)?)
}

/// Decodes a stream of varint-length-delimited [`FeedMessage`]s, the framing
/// the `convert` pipeline reads from a file or stdin.
///
/// # Errors
///
/// Returns an error on the first message that is not valid protobuf, or on a
/// truncated length prefix.
pub fn parse_delimited_feeds(mut bytes: &[u8]) -> Result<Vec<FeedMessage>> {
    let mut messages = Vec::new();
    while bytes.has_remaining() {
        messages.push(FeedMessage::decode_length_delimited(&mut bytes)?);
    }
    Ok(messages)
}
