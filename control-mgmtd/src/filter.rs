use chrono::{DateTime, Utc};
use serde::Deserialize;
use shared::types::{BeaconUsage, IsdAs, Usage};
use crate::sort::SortKey;
use crate::store::BeaconQuery;

/// Raw, loosely-typed query parameters of a beacon listing request.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct BeaconParams {
    pub start_isd_as: Option<String>,
    /// Comma-separated usage tokens.
    pub usages: Option<String>,
    pub ingress_interface: Option<i64>,
    /// RFC 3339 instant.
    pub valid_at: Option<String>,
    /// Disables validity filtering; wins over `valid_at` when both are set.
    pub all: Option<bool>,
    pub sort: Option<String>,
    pub desc: Option<bool>,
}

/// A fully validated listing request: the store filter plus the ordering
/// to apply to its results.
#[derive(Debug, Clone, PartialEq)]
pub struct ListRequest {
    pub query: BeaconQuery,
    pub sort: SortKey,
    pub descending: bool,
}

/// Validate raw parameters into a store query. Every malformed field
/// contributes its own error; the build fails as a whole once any field is
/// bad, after all fields have been checked.
pub fn build_query(params: &BeaconParams, now: DateTime<Utc>) -> Result<ListRequest, Vec<String>> {
    let mut errors: Vec<String> = Vec::new();
    let mut query = BeaconQuery::default();

    if let Some(raw) = &params.start_isd_as {
        match raw.parse::<IsdAs>() {
            Ok(isd_as) => query.starts_at = vec![isd_as],
            Err(e) => errors.push(format!("parsing start_isd_as: {e}")),
        }
    }

    if let Some(raw) = &params.usages {
        let mut usage = Usage::empty();
        for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match BeaconUsage::from_token(token) {
                Some(label) => usage |= Usage::from(label),
                None => errors.push(format!("unknown value for parameter usages: {token}")),
            }
        }
        if !usage.is_empty() {
            query.usages = vec![usage];
        }
    }

    if let Some(value) = params.ingress_interface {
        if (0..=65535).contains(&value) {
            query.ingress_interfaces = vec![value as u16];
        } else {
            errors.push(format!(
                "value for parameter ingress_interface out of range: {value}"
            ));
        }
    }

    if params.all.unwrap_or(false) {
        query.valid_at = None;
    } else if let Some(raw) = &params.valid_at {
        match DateTime::parse_from_rfc3339(raw) {
            Ok(instant) => query.valid_at = Some(instant.with_timezone(&Utc)),
            Err(e) => errors.push(format!("parsing valid_at: {e}")),
        }
    } else {
        query.valid_at = Some(now);
    }

    let sort = match SortKey::resolve(params.sort.as_deref()) {
        Ok(key) => key,
        Err(e) => {
            errors.push(e);
            SortKey::LastUpdated
        }
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(ListRequest {
        query,
        sort,
        descending: params.desc.unwrap_or(false),
    })
}
