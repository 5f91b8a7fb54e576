use std::cmp::Ordering;
use shared::protocol::DEFAULT_SORT_KEY;
use shared::types::Beacon;

/// Sortable fields of a beacon listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    ExpirationTime,
    InfoTime,
    StartIsdAs,
    LastUpdated,
    IngressInterface,
}

/// Registry mapping query parameter values to sort keys. Unknown keys are
/// detected by a single lookup miss.
const SORT_KEYS: &[(&str, SortKey)] = &[
    ("expiration_time", SortKey::ExpirationTime),
    ("info_time", SortKey::InfoTime),
    ("start_isd_as", SortKey::StartIsdAs),
    ("last_updated", SortKey::LastUpdated),
    ("ingress_interface", SortKey::IngressInterface),
];

impl SortKey {
    /// Resolve a key by name, defaulting when the request names none.
    pub fn resolve(name: Option<&str>) -> Result<SortKey, String> {
        let name = name.unwrap_or(DEFAULT_SORT_KEY);
        SORT_KEYS
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, key)| *key)
            .ok_or_else(|| format!("unknown value for parameter sort: {name}"))
    }

    fn compare(self, a: &Beacon, b: &Beacon) -> Ordering {
        match self {
            SortKey::ExpirationTime => a.expiration.cmp(&b.expiration),
            SortKey::InfoTime => a.timestamp.cmp(&b.timestamp),
            SortKey::StartIsdAs => {
                // A record without hops orders before any record with hops.
                if a.hops.is_empty() || b.hops.is_empty() {
                    a.hops.len().cmp(&b.hops.len())
                } else {
                    a.hops[0].isd_as.cmp(&b.hops[0].isd_as)
                }
            }
            SortKey::LastUpdated => a.last_updated.cmp(&b.last_updated),
            SortKey::IngressInterface => a.ingress_interface.cmp(&b.ingress_interface),
        }
    }
}

/// Stable sort by a single key. Descending reverses the comparator, not the
/// sequence, so ties keep their upstream order either way.
pub fn sort_beacons(beacons: &mut [Beacon], key: SortKey, descending: bool) {
    beacons.sort_by(|a, b| {
        let ord = key.compare(a, b);
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
}
