pub mod error;
pub mod expiry;
pub mod framing;
pub mod ingest;
pub mod parser;
pub mod signature;
pub mod stats;
pub mod store;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
