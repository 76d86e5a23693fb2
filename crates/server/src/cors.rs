// Browser access policy for the chat API.
//
// Clients authenticate with bearer tokens, never cookies, so credentials stay
// disabled and a wildcard origin is safe to configure.

use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::error::REQUEST_ID_HEADER;

/// Marketplace web app dev servers, used when `HEARTH_CORS_ORIGINS` is unset.
const LOCAL_WEB_ORIGINS: &[&str] = &["http://localhost:3000", "http://localhost:5173"];

const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(600);

/// `"*"` allows any origin, a comma-separated list allows exactly those,
/// `None` allows [`LOCAL_WEB_ORIGINS`].
pub fn cors_layer(configured: Option<&str>) -> CorsLayer {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, request_id.clone()])
        .expose_headers([request_id])
        .max_age(PREFLIGHT_MAX_AGE);

    match configured.map(str::trim) {
        Some("*") => layer.allow_origin(AllowOrigin::any()),
        Some(origins) => layer.allow_origin(origin_list(origins.split(','))),
        None => layer.allow_origin(origin_list(LOCAL_WEB_ORIGINS.iter().copied())),
    }
}

fn origin_list<'a>(origins: impl Iterator<Item = &'a str>) -> Vec<HeaderValue> {
    origins
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::origin_list;

    #[test]
    fn origin_list_skips_blank_entries() {
        let origins = origin_list(" https://hearth.rentals , ,https://admin.hearth.rentals,".split(','));
        assert_eq!(origins, ["https://hearth.rentals", "https://admin.hearth.rentals"]);
    }
}
