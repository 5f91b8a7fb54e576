use std::sync::Arc;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use shared::health::HealthResponse;
use shared::protocol::API_PREFIX;
use shared::types::{Beacon, StoredBeacon};
use crate::ca::CaClient;
use crate::config::Config;
use crate::error::Problem;
use crate::filter::{self, BeaconParams};
use crate::health;
use crate::sort;
use crate::store::BeaconQuery;
use crate::store_manager::StoreHandle;

#[derive(Clone)]
pub struct AppState {
    pub store: StoreHandle,
    pub ca: Option<CaClient>,
    pub config: Arc<Config>,
}

#[derive(Serialize)]
struct BeaconsResponse {
    beacons: Vec<Beacon>,
}

#[derive(Serialize)]
struct BeaconResponse {
    beacon: Beacon,
}

#[derive(Serialize)]
pub struct ConfigResponse {
    pub isd_as: String,
    pub listen: String,
    pub ca_enabled: bool,
}

#[derive(Serialize)]
struct InfoResponse {
    service: &'static str,
    version: &'static str,
    pid: u32,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/beacons", get(list_beacons))
        .route("/beacons/:segment_id", get(get_beacon).delete(delete_beacon))
        .route("/health", get(get_health))
        .route("/config", get(get_config))
        .route("/info", get(get_info))
        .with_state(state);
    Router::new().nest(API_PREFIX, api)
}

async fn list_beacons(
    State(state): State<AppState>,
    Query(params): Query<BeaconParams>,
) -> Result<Json<BeaconsResponse>, Problem> {
    let request = filter::build_query(&params, Utc::now()).map_err(|errors| {
        Problem::bad_request("malformed query parameters", errors.join("\n"))
    })?;

    let results = state
        .store
        .query_beacons(request.query)
        .await
        .map_err(|e| {
            tracing::error!("Failed to query beacons: {}", e);
            Problem::internal("error getting beacons", e.to_string())
        })?;

    let mut beacons: Vec<Beacon> = results.iter().map(Beacon::project).collect();
    sort::sort_beacons(&mut beacons, request.sort, request.descending);

    Ok(Json(BeaconsResponse { beacons }))
}

async fn get_beacon(
    State(state): State<AppState>,
    Path(segment_id): Path<String>,
) -> Result<Json<BeaconResponse>, Problem> {
    if hex::decode(&segment_id).is_err() {
        return Err(Problem::bad_request(
            "error decoding segment id",
            format!("segment ID must be a hex string: {segment_id}"),
        ));
    }

    let query = BeaconQuery {
        seg_ids: vec![segment_id.to_lowercase()],
        ..Default::default()
    };
    let results = state.store.query_beacons(query).await.map_err(|e| {
        tracing::error!("Failed to query beacons: {}", e);
        Problem::internal("error getting beacons", e.to_string())
    })?;

    let stored = exactly_one(results, &segment_id)?;
    Ok(Json(BeaconResponse {
        beacon: Beacon::project(&stored),
    }))
}

async fn delete_beacon(
    State(state): State<AppState>,
    Path(segment_id): Path<String>,
) -> Result<StatusCode, Problem> {
    if segment_id.is_empty() {
        return Err(Problem::bad_request(
            "segment ID is required",
            "empty segment ID prefix",
        ));
    }
    if !segment_id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Problem::bad_request(
            "error decoding segment id",
            format!("segment ID prefix must be hex: {segment_id}"),
        ));
    }

    if let Err(e) = state.store.delete_beacon(segment_id.to_lowercase()).await {
        tracing::error!("Failed to delete beacon: {}", e);
        return Err(Problem::internal("unable to delete beacon", e.to_string()));
    }

    // Deleting an already-absent beacon reports success as well.
    Ok(StatusCode::NO_CONTENT)
}

async fn get_health(State(state): State<AppState>) -> Result<Json<HealthResponse>, Problem> {
    let signer = state.store.signer_health().await.map_err(|e| {
        tracing::error!("Failed to probe signer health: {}", e);
        Problem::internal("error probing signer health", e.to_string())
    })?;
    let trc = state
        .store
        .trc_health(state.config.control.isd_as.isd)
        .await
        .map_err(|e| {
            tracing::error!("Failed to probe TRC health: {}", e);
            Problem::internal("error probing TRC health", e.to_string())
        })?;
    let ca = match &state.ca {
        Some(client) => Some(client.status().await),
        None => None,
    };

    let health = health::aggregate(&signer, &trc, ca, Utc::now());
    Ok(Json(HealthResponse { health }))
}

async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        isd_as: state.config.control.isd_as.to_string(),
        listen: state.config.api.listen.clone(),
        ca_enabled: state.ca.is_some(),
    })
}

async fn get_info() -> Json<InfoResponse> {
    Json(InfoResponse {
        service: "control-mgmtd",
        version: env!("CARGO_PKG_VERSION"),
        pid: std::process::id(),
    })
}

/// An exact-match lookup must select a single record; anything else is a
/// malformed query, not a store fault.
fn exactly_one(
    mut results: Vec<StoredBeacon>,
    segment_id: &str,
) -> Result<StoredBeacon, Problem> {
    match results.len() {
        0 => Err(Problem::bad_request(
            "malformed query parameter",
            format!("no beacon matched provided segment ID: {segment_id}"),
        )),
        1 => Ok(results.remove(0)),
        n => Err(Problem::bad_request(
            "malformed query parameter",
            format!("{n} beacons matched provided segment ID: {segment_id}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shared::types::{PathSegment, Usage};

    fn stored(id: &str) -> StoredBeacon {
        StoredBeacon {
            id: id.to_string(),
            segment: PathSegment {
                timestamp: Utc.timestamp_opt(1000, 0).unwrap(),
                as_entries: vec![],
            },
            ingress_if: 0,
            usage: Usage::empty(),
            last_updated: Utc.timestamp_opt(1000, 0).unwrap(),
        }
    }

    #[test]
    fn test_exactly_one_no_match_is_caller_error() {
        let problem = exactly_one(vec![], "c0ffee").unwrap_err();
        assert_eq!(problem.status, 400);
        assert!(problem.detail.unwrap().contains("no beacon matched"));
    }

    #[test]
    fn test_exactly_one_multiple_matches_is_caller_error() {
        let problem = exactly_one(vec![stored("aa"), stored("ab")], "a").unwrap_err();
        assert_eq!(problem.status, 400);
        assert!(problem.detail.unwrap().contains("2 beacons matched"));
    }

    #[test]
    fn test_exactly_one_single_match() {
        let beacon = exactly_one(vec![stored("c0ffee")], "c0ffee").unwrap();
        assert_eq!(beacon.id, "c0ffee");
    }
}
