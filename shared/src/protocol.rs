/// API path prefix
pub const API_PREFIX: &str = "/v1";

/// Content type for RFC 7807 style error bodies
pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

/// Sort key applied when a listing request does not name one
pub const DEFAULT_SORT_KEY: &str = "last_updated";
