//! Middleware
//!
//! Request logging, CORS and security headers.

use actix_cors::Cors;
use actix_web::middleware::{DefaultHeaders, Logger};

use crate::handlers::USER_HEADER;

/// Access log in the default actix format, plus the acting user.
pub fn standard_middleware() -> Logger {
    Logger::new(r#"%a "%r" %s %b "%{X-User-Id}i" %T"#)
}

/// Lets a separately hosted front end call the API.
pub fn cors_policy() -> Cors {
    Cors::default()
        .allow_any_origin()
        .allowed_methods(vec!["GET", "POST"])
        .allowed_header(actix_web::http::header::CONTENT_TYPE)
        .allowed_header(USER_HEADER)
        .max_age(3600)
}

pub fn security_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("X-Content-Type-Options", "nosniff"))
        .add(("Referrer-Policy", "strict-origin-when-cross-origin"))
        .add(("Content-Security-Policy", "default-src 'none'; frame-ancestors 'none'"))
}
