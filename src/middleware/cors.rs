use actix_cors::Cors;
use actix_web::http::{header, Method};

const PREFLIGHT_MAX_AGE_SECS: usize = 3600;

/// CORS policy for browser clients
///
/// An empty origin list, or one containing `*`, allows any origin. Credentials are never allowed;
/// clients authenticate with a Bearer header, not cookies.
pub fn cors(allowed_origins: &[String]) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods(vec![
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allowed_headers(vec![
            header::AUTHORIZATION,
            header::ACCEPT,
            header::CONTENT_TYPE,
        ])
        .max_age(PREFLIGHT_MAX_AGE_SECS);

    let origins: Vec<&str> = allowed_origins
        .iter()
        .map(|o| o.trim())
        .filter(|o| !o.is_empty())
        .collect();

    if origins.is_empty() || origins.contains(&"*") {
        log::info!("CORS allows any origin");
        return cors.allow_any_origin();
    }
    for origin in origins {
        log::info!("CORS allows origin {}", origin);
        cors = cors.allowed_origin(origin);
    }
    cors
}
