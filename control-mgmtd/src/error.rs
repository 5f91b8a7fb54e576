use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use shared::protocol::PROBLEM_CONTENT_TYPE;

pub const BAD_REQUEST: &str = "bad_request";
pub const INTERNAL_ERROR: &str = "internal_error";

/// RFC 7807 style error body returned by every failing endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub problem_type: &'static str,
    pub title: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Problem {
    /// Caller error: malformed or out-of-range input. Never retried.
    pub fn bad_request(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            problem_type: BAD_REQUEST,
            title: title.into(),
            status: StatusCode::BAD_REQUEST.as_u16(),
            detail: Some(detail.into()),
        }
    }

    /// Store or encoding fault surfaced to the caller as a 500.
    pub fn internal(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            problem_type: INTERNAL_ERROR,
            title: title.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: Some(detail.into()),
        }
    }
}

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            [(header::CONTENT_TYPE, PROBLEM_CONTENT_TYPE)],
            Json(self),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_shape() {
        let problem = Problem::bad_request("malformed query parameters", "bad isd-as");
        assert_eq!(problem.status, 400);
        assert_eq!(problem.problem_type, BAD_REQUEST);
        assert_eq!(problem.detail.as_deref(), Some("bad isd-as"));
    }

    #[test]
    fn test_serializes_type_field() {
        let problem = Problem::internal("error getting beacons", "disk io");
        let json = serde_json::to_value(&problem).unwrap();
        assert_eq!(json["type"], "internal_error");
        assert_eq!(json["status"], 500);
    }
}
