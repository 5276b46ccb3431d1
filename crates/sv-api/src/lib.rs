//! # sv-api
//!
//! The web routing and orchestration layer for the solved service.

pub mod error;
pub mod handlers;
pub mod middleware;

use actix_web::web;

/// Configures the routes for accepted answers.
///
/// # Developer Note
/// We use a scoped configuration to allow the main binary to mount
/// the API under different paths if needed (e.g., /api/v1/).
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("")
            .route("/solution/accept", web::post().to(handlers::accept_answer))
            .route("/solution/unaccept", web::post().to(handlers::unaccept_answer))
            .route("/t/{topic_id}", web::get().to(handlers::view_topic))
            .route("/posts/{post_id}/first_solution", web::get().to(handlers::first_solution)),
    );
}
