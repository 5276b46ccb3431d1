//! # Solved Binary
//!
//! The entry point that assembles the service based on compile-time features.

mod settings;

use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use sv_api::handlers::AppState;
use sv_core::{OrdinalTrustComparator, SolutionService};

use crate::settings::Settings;

// Feature-gated imports: pick the storage plugin at compile time
#[cfg(feature = "db-sqlite")]
use sv_db_sqlite::SqliteForumRepo;

#[cfg(not(feature = "db-sqlite"))]
compile_error!("enable a database feature, e.g. `db-sqlite`");

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let settings = Settings::load()?;

    // 1. Initialize Database Implementation
    #[cfg(feature = "db-sqlite")]
    let repo = Arc::new(SqliteForumRepo::new(&settings.database.url).await?);

    // 2. Wire the service (the plugin serves as both forum repo and action log)
    let solutions = SolutionService::new(
        repo.clone(),
        repo,
        Arc::new(OrdinalTrustComparator),
        settings.solved.clone(),
    );
    let state = web::Data::new(AppState { solutions });

    log::info!(
        "solved starting on http://{}:{} (first solution threshold: {})",
        settings.server.host,
        settings.server.port,
        settings.solved.first_solution_trust_level
    );

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(sv_api::middleware::security_headers())
            .wrap(sv_api::middleware::cors_policy())
            .wrap(sv_api::middleware::standard_middleware())
            .configure(sv_api::configure_routes)
    })
    .bind((settings.server.host.as_str(), settings.server.port))?
    .run()
    .await?;

    Ok(())
}
