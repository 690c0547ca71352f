use crate::server::api::{self, ApiError};
use crate::server::AppState;

pub struct HttpResponse {
    pub status_code: u16,
    pub status_text: &'static str,
    pub content_type: &'static str,
    pub body: String,
}

impl HttpResponse {
    pub fn json(body: String) -> Self {
        Self {
            status_code: 200,
            status_text: "OK",
            content_type: "application/json",
            body,
        }
    }
}

/// Dispatch one request. `target` is the request path including any query string.
pub fn route_request(state: &AppState, method: &str, target: &str, body: &str) -> HttpResponse {
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    };
    let params = api::QueryParams::parse(query);

    let result = match (method, path) {
        ("GET", "/api/health") => api::health_payload(state),
        ("GET", "/api/data/version") => api::data_version_payload(state),
        ("GET", "/api/items") => api::item_payload(state, &params),
        ("GET", "/api/perks") => api::perk_payload(state, &params),
        ("GET", "/api/recipes") => api::recipe_payload(state, &params),
        ("POST", "/api/rollup") => api::rollup_payload(state, body),
        ("GET", "/api/autocomplete") => api::autocomplete_payload(state, &params),
        ("GET", "/api/validate") => api::validate_payload(state),
        (_, path) if path.starts_with("/api/") && known_path(path) => {
            return error_response(405, "Method Not Allowed", "Method not allowed");
        }
        _ => return error_response(404, "Not Found", "Route not found"),
    };

    match result {
        Ok(payload) => HttpResponse::json(payload),
        Err(err) => api_error_response(&err),
    }
}

fn known_path(path: &str) -> bool {
    matches!(
        path,
        "/api/health"
            | "/api/data/version"
            | "/api/items"
            | "/api/perks"
            | "/api/recipes"
            | "/api/rollup"
            | "/api/autocomplete"
            | "/api/validate"
    )
}

fn api_error_response(err: &ApiError) -> HttpResponse {
    let (status_code, status_text) = match err.status() {
        400 => (400, "Bad Request"),
        404 => (404, "Not Found"),
        503 => (503, "Service Unavailable"),
        _ => (500, "Internal Server Error"),
    };
    error_response(status_code, status_text, &err.to_string())
}

pub fn error_response(status_code: u16, status_text: &'static str, message: &str) -> HttpResponse {
    HttpResponse {
        status_code,
        status_text,
        content_type: "application/json",
        body: format!(
            "{{\n  \"status\": \"error\",\n  \"message\": {}\n}}",
            serde_json::to_string(message).unwrap_or_else(|_| "\"Unknown error\"".to_string())
        ),
    }
}
