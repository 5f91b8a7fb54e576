use serde::Serialize;
use sha2::{Sha256, Digest};
use shared::types::{IsdAs, PathSegment};

/// Identity view of a segment: creation time and the hop chain. Hop expiry
/// is excluded; it shifts on re-origination without changing which path
/// the segment describes.
#[derive(Serialize)]
struct IdView<'a> {
    timestamp: i64,
    hops: Vec<HopView<'a>>,
}

#[derive(Serialize)]
struct HopView<'a> {
    local: &'a IsdAs,
    ingress: u16,
    egress: u16,
}

/// Computes the store identifier of a segment: the first 16 bytes of a
/// SHA-256 digest over the segment's identity fields, hex encoded.
pub fn segment_id(segment: &PathSegment) -> String {
    let view = IdView {
        timestamp: segment.timestamp.timestamp(),
        hops: segment
            .as_entries
            .iter()
            .map(|entry| HopView {
                local: &entry.local,
                ingress: entry.hop.cons_ingress,
                egress: entry.hop.cons_egress,
            })
            .collect(),
    };

    let json = serde_json::to_string(&view)
        .expect("Failed to serialize segment for id computation");

    let digest = Sha256::digest(json.as_bytes());
    hex::encode(&digest[..16])
}
