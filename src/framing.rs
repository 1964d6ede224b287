//! Protobuf field framing for incremental `FeedMessage` assembly.
//!
//! prost only encodes whole messages, so the entity store frames its
//! pre-encoded chunks itself: a field key followed by the payload length as a
//! base-128 varint. Keeping this next to prost's own `encoding` primitives
//! guarantees the manual path stays byte-compatible with prost's output.

use prost::encoding::{WireType, encode_key, encode_varint};

/// Field number of `FeedMessage.header`.
pub const FEED_MSG_HEADER: u32 = 1;
/// Field number of `FeedMessage.entity`.
pub const FEED_MSG_ENTITIES: u32 = 2;

/// Encodes the framing for one length-delimited field: the field key
/// `(field_number << 3) | wire_type`, then `payload_length` as a varint.
///
/// Pure; identical inputs always produce identical bytes. Field numbers
/// below 16 frame to a single key byte, which covers everything a
/// `FeedMessage` needs.
pub fn encode_field(field_number: u32, wire_type: WireType, payload_length: usize) -> Vec<u8> {
    // 1 key byte + up to 5 varint bytes for any length this system produces
    let mut buf = Vec::with_capacity(6);
    encode_key(field_number, wire_type, &mut buf);
    encode_varint(payload_length as u64, &mut buf);
    buf
}
