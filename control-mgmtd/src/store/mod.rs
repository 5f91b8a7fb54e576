pub mod db;
pub mod id;
pub mod trust;

use chrono::{DateTime, Utc};
use shared::types::{IsdAs, Usage};

/// Validated filter executed by the beacon store. All clauses are ANDed;
/// an empty clause constrains nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeaconQuery {
    /// Origin AS identifiers.
    pub starts_at: Vec<IsdAs>,

    /// Usage bitmasks; a beacon matches when it shares a bit with any entry.
    pub usages: Vec<Usage>,

    /// Ingress interface identifiers.
    pub ingress_interfaces: Vec<u16>,

    /// Only beacons valid at this instant; `None` disables expiry filtering.
    pub valid_at: Option<DateTime<Utc>>,

    /// Exact segment identifiers.
    pub seg_ids: Vec<String>,
}
