use std::fmt;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use shared::health::{Check, CheckData, Health, Status};

pub const SIGNER_CHECK: &str = "valid signer available";
pub const TRC_CHECK: &str = "TRC for local ISD available";
pub const CA_CHECK: &str = "CA connection";

/// Signer facts as reported by the trust store probe.
#[derive(Debug, Clone, PartialEq)]
pub struct SignerHealth {
    pub signer_missing: bool,
    pub signer_missing_detail: Option<String>,
    pub expiration: DateTime<Utc>,
    pub in_grace: bool,
}

/// Identifying triple of a trust root document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrcId {
    pub isd: u16,
    pub base: u64,
    pub serial: u64,
}

/// Trust-root facts as reported by the trust store probe.
#[derive(Debug, Clone, PartialEq)]
pub struct TrcHealth {
    /// Latest trust root for the local ISD, if any exists.
    pub trc_id: Option<TrcId>,
    pub not_found_detail: Option<String>,
}

/// Connectivity state reported by the CA service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaStatus {
    Available,
    Starting,
    Stopping,
    Unavailable,
}

impl CaStatus {
    pub fn parse(s: &str) -> CaStatus {
        match s {
            "available" => CaStatus::Available,
            "starting" => CaStatus::Starting,
            "stopping" => CaStatus::Stopping,
            _ => CaStatus::Unavailable,
        }
    }
}

impl fmt::Display for CaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CaStatus::Available => "available",
            CaStatus::Starting => "starting",
            CaStatus::Stopping => "stopping",
            CaStatus::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

fn expires_at(expiration: DateTime<Utc>) -> (String, serde_json::Value) {
    (
        "expires_at".to_string(),
        json!(expiration.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
    )
}

/// Evaluate the signer check. The cases form an ordered priority list and
/// the first matching one wins.
pub fn signer_check(signer: &SignerHealth, now: DateTime<Utc>) -> Check {
    if signer.signer_missing {
        return Check {
            name: SIGNER_CHECK.to_string(),
            status: Status::Failing,
            detail: signer.signer_missing_detail.clone(),
            data: CheckData::new(),
        };
    }
    if signer.expiration <= now {
        return Check {
            name: SIGNER_CHECK.to_string(),
            status: Status::Failing,
            detail: Some("signer certificate has expired".to_string()),
            data: CheckData::from([expires_at(signer.expiration)]),
        };
    }
    if signer.in_grace {
        return Check {
            name: SIGNER_CHECK.to_string(),
            status: Status::Degraded,
            detail: Some(
                "signer certificate is authenticated by TRC in grace period".to_string(),
            ),
            data: CheckData::from([expires_at(signer.expiration), ("in_grace".to_string(), json!(true))]),
        };
    }
    if signer.expiration - now < Duration::hours(6) {
        return Check {
            name: SIGNER_CHECK.to_string(),
            status: Status::Degraded,
            detail: Some("signer certificate is close to expiration".to_string()),
            data: CheckData::from([expires_at(signer.expiration)]),
        };
    }
    Check {
        name: SIGNER_CHECK.to_string(),
        status: Status::Passing,
        detail: None,
        data: CheckData::from([expires_at(signer.expiration)]),
    }
}

/// Evaluate the trust-root check. Failing unless a root was found.
pub fn trc_check(trc: &TrcHealth) -> Check {
    let mut check = Check {
        name: TRC_CHECK.to_string(),
        status: Status::Failing,
        detail: trc.not_found_detail.clone(),
        data: CheckData::new(),
    };
    if let Some(id) = trc.trc_id {
        check.status = Status::Passing;
        check.data = CheckData::from([
            ("isd".to_string(), json!(id.isd)),
            ("base_number".to_string(), json!(id.base)),
            ("serial_number".to_string(), json!(id.serial)),
        ]);
    }
    check
}

/// Evaluate the CA connectivity check. Anything but an available CA is a
/// degradation, never a failure.
pub fn ca_check(status: CaStatus) -> Check {
    Check {
        name: CA_CHECK.to_string(),
        status: if status == CaStatus::Available {
            Status::Passing
        } else {
            Status::Degraded
        },
        detail: None,
        data: CheckData::from([("status".to_string(), json!(status.to_string()))]),
    }
}

/// Reduce the probe results into one report. Check order is part of the
/// contract: signer, trust root, then CA when a probe is configured.
pub fn aggregate(
    signer: &SignerHealth,
    trc: &TrcHealth,
    ca: Option<CaStatus>,
    now: DateTime<Utc>,
) -> Health {
    let mut checks = vec![signer_check(signer, now), trc_check(trc)];
    if let Some(status) = ca {
        checks.push(ca_check(status));
    }
    let status = checks
        .iter()
        .map(|check| check.status)
        .max()
        .unwrap_or(Status::Passing);
    Health { status, checks }
}
