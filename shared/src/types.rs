use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// Largest AS number that is rendered in decimal (BGP-compatible range).
const MAX_BGP_AS: u64 = (1 << 32) - 1;

/// Largest representable AS number (48 bits).
const MAX_AS: u64 = (1 << 48) - 1;

#[derive(Debug, thiserror::Error)]
pub enum ParseIsdAsError {
    #[error("missing '-' separator in ISD-AS: {0}")]
    MissingSeparator(String),
    #[error("invalid ISD number: {0}")]
    InvalidIsd(String),
    #[error("invalid AS number: {0}")]
    InvalidAs(String),
}

/// Identifier of an autonomous routing domain within an isolation domain.
///
/// Rendered as "<isd>-<as>", e.g. "1-ff00:0:110". The AS part uses three
/// 16-bit hex groups above the BGP range and plain decimal below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IsdAs {
    pub isd: u16,
    pub asn: u64,
}

impl IsdAs {
    pub fn new(isd: u16, asn: u64) -> Self {
        Self { isd, asn }
    }
}

impl fmt::Display for IsdAs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.asn <= MAX_BGP_AS {
            write!(f, "{}-{}", self.isd, self.asn)
        } else {
            write!(
                f,
                "{}-{:x}:{:x}:{:x}",
                self.isd,
                (self.asn >> 32) & 0xffff,
                (self.asn >> 16) & 0xffff,
                self.asn & 0xffff,
            )
        }
    }
}

impl FromStr for IsdAs {
    type Err = ParseIsdAsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (isd, asn) = s
            .split_once('-')
            .ok_or_else(|| ParseIsdAsError::MissingSeparator(s.to_string()))?;
        let isd = isd
            .parse::<u16>()
            .map_err(|_| ParseIsdAsError::InvalidIsd(isd.to_string()))?;
        let asn = parse_as(asn)?;
        Ok(Self { isd, asn })
    }
}

/// Parse the AS part: either "a:b:c" with 16-bit hex groups, or a plain
/// decimal number within the BGP range.
fn parse_as(s: &str) -> Result<u64, ParseIsdAsError> {
    if s.contains(':') {
        let groups: Vec<&str> = s.split(':').collect();
        if groups.len() != 3 {
            return Err(ParseIsdAsError::InvalidAs(s.to_string()));
        }
        let mut asn = 0u64;
        for group in groups {
            let part = u64::from_str_radix(group, 16)
                .map_err(|_| ParseIsdAsError::InvalidAs(s.to_string()))?;
            if part > 0xffff {
                return Err(ParseIsdAsError::InvalidAs(s.to_string()));
            }
            asn = (asn << 16) | part;
        }
        debug_assert!(asn <= MAX_AS);
        Ok(asn)
    } else {
        let asn = s
            .parse::<u64>()
            .map_err(|_| ParseIsdAsError::InvalidAs(s.to_string()))?;
        if asn > MAX_BGP_AS {
            return Err(ParseIsdAsError::InvalidAs(s.to_string()));
        }
        Ok(asn)
    }
}

impl Serialize for IsdAs {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IsdAs {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Bitmask of the registration/propagation roles a beacon is eligible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Usage(u32);

impl Usage {
    pub const UP_REGISTRATION: Usage = Usage(0x01);
    pub const DOWN_REGISTRATION: Usage = Usage(0x02);
    pub const CORE_REGISTRATION: Usage = Usage(0x04);
    pub const PROPAGATION: Usage = Usage(0x08);

    pub fn empty() -> Self {
        Usage(0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn from_bits(bits: u32) -> Self {
        Usage(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: Usage) -> bool {
        self.0 & other.0 != 0
    }

    /// Expand the set bits into labels, always in declared flag order
    /// (up, down, core, propagation) regardless of bit positions.
    pub fn unpack(self) -> Vec<BeaconUsage> {
        let mut labels = Vec::new();
        for &(flag, label) in USAGE_FLAGS {
            if self.contains(flag) {
                labels.push(label);
            }
        }
        labels
    }
}

impl std::ops::BitOr for Usage {
    type Output = Usage;
    fn bitor(self, rhs: Usage) -> Usage {
        Usage(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for Usage {
    fn bitor_assign(&mut self, rhs: Usage) {
        self.0 |= rhs.0;
    }
}

impl From<BeaconUsage> for Usage {
    fn from(label: BeaconUsage) -> Usage {
        match label {
            BeaconUsage::UpRegistration => Usage::UP_REGISTRATION,
            BeaconUsage::DownRegistration => Usage::DOWN_REGISTRATION,
            BeaconUsage::CoreRegistration => Usage::CORE_REGISTRATION,
            BeaconUsage::Propagation => Usage::PROPAGATION,
        }
    }
}

/// Flag-to-label table in the fixed declared order.
const USAGE_FLAGS: &[(Usage, BeaconUsage)] = &[
    (Usage::UP_REGISTRATION, BeaconUsage::UpRegistration),
    (Usage::DOWN_REGISTRATION, BeaconUsage::DownRegistration),
    (Usage::CORE_REGISTRATION, BeaconUsage::CoreRegistration),
    (Usage::PROPAGATION, BeaconUsage::Propagation),
];

/// Human-readable usage label as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeaconUsage {
    UpRegistration,
    DownRegistration,
    CoreRegistration,
    Propagation,
}

impl BeaconUsage {
    /// Look up a label by its wire token. Unknown tokens are a caller error
    /// and must be reported, not dropped.
    pub fn from_token(token: &str) -> Option<BeaconUsage> {
        match token {
            "up_registration" => Some(BeaconUsage::UpRegistration),
            "down_registration" => Some(BeaconUsage::DownRegistration),
            "core_registration" => Some(BeaconUsage::CoreRegistration),
            "propagation" => Some(BeaconUsage::Propagation),
            _ => None,
        }
    }
}

/// Hop field of one AS entry: construction-direction interface pair plus
/// the expiry of this hop's reservation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopField {
    pub cons_ingress: u16,
    pub cons_egress: u16,
    pub expiry: DateTime<Utc>,
}

/// One AS entry of a path segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsEntry {
    /// AS that created this entry.
    pub local: IsdAs,
    pub hop: HopField,
}

/// A path segment as disseminated by beaconing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSegment {
    /// Creation timestamp of the segment (info time).
    pub timestamp: DateTime<Utc>,
    /// AS entries in traversal order, origin first.
    pub as_entries: Vec<AsEntry>,
}

impl PathSegment {
    /// Earliest hop expiry; the segment is unusable past this instant.
    pub fn min_expiry(&self) -> DateTime<Utc> {
        self.as_entries
            .iter()
            .map(|entry| entry.hop.expiry)
            .min()
            .unwrap_or(self.timestamp)
    }
}

/// A beacon as held by the beacon store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBeacon {
    /// Store-assigned hex identifier.
    pub id: String,

    /// The path segment payload.
    pub segment: PathSegment,

    /// Interface the beacon was received on.
    pub ingress_if: u16,

    /// Roles this beacon is eligible for.
    pub usage: Usage,

    /// Last time the store touched this record.
    pub last_updated: DateTime<Utc>,
}

/// One traversal step of a path segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    pub interface: u16,
    pub isd_as: String,
}

/// Public representation of a beacon as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beacon {
    /// Usage labels in fixed enumeration order.
    pub usages: Vec<BeaconUsage>,

    /// Interface the beacon was received on.
    pub ingress_interface: u16,

    /// Store-assigned hex identifier.
    pub id: String,

    /// Last time the store touched this record.
    pub last_updated: DateTime<Utc>,

    /// Segment creation time.
    pub timestamp: DateTime<Utc>,

    /// Minimum expiry across the segment's hops.
    pub expiration: DateTime<Utc>,

    /// Path-shaped hop sequence: the origin contributes only its egress,
    /// every later AS contributes ingress then egress.
    pub hops: Vec<Hop>,
}

impl Beacon {
    /// Project a stored record into its public form.
    pub fn project(stored: &StoredBeacon) -> Beacon {
        let segment = &stored.segment;
        let mut hops = Vec::new();
        for (i, entry) in segment.as_entries.iter().enumerate() {
            if i != 0 {
                hops.push(Hop {
                    interface: entry.hop.cons_ingress,
                    isd_as: entry.local.to_string(),
                });
            }
            hops.push(Hop {
                interface: entry.hop.cons_egress,
                isd_as: entry.local.to_string(),
            });
        }
        Beacon {
            usages: stored.usage.unpack(),
            ingress_interface: stored.ingress_if,
            id: stored.id.clone(),
            last_updated: stored.last_updated,
            timestamp: segment.timestamp,
            expiration: segment.min_expiry(),
            hops,
        }
    }
}
