//! # sv-api Handlers
//!
//! This module coordinates the flow between HTTP requests and the solution service.

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use sv_core::{AppError, SolutionService};
use uuid::Uuid;

use crate::error::ApiError;

/// Header carrying the acting user's id. Missing or malformed means anonymous.
pub const USER_HEADER: &str = "X-User-Id";

/// State shared across all Actix-web workers.
pub struct AppState {
    pub solutions: SolutionService,
}

/// Body of accept/unaccept requests.
#[derive(Debug, Deserialize, Serialize)]
pub struct SolutionRequest {
    /// The post to accept or unaccept
    pub id: Uuid,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EligibilityResponse {
    pub eligible: bool,
}

fn acting_user(req: &HttpRequest) -> Option<Uuid> {
    req.headers().get(USER_HEADER)?.to_str().ok()?.trim().parse().ok()
}

fn require_user(req: &HttpRequest) -> Result<Uuid, ApiError> {
    acting_user(req).ok_or_else(|| ApiError(AppError::Unauthorized("you must be logged in".into())))
}

/// POST /solution/accept
pub async fn accept_answer(
    data: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<SolutionRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = require_user(&req)?;
    let outcome = data.solutions.accept_answer(user_id, body.id).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// POST /solution/unaccept
pub async fn unaccept_answer(
    data: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<SolutionRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = require_user(&req)?;
    data.solutions.unaccept_answer(user_id, body.id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": "OK" })))
}

/// GET /t/{topic_id}, with per-post flags computed for the caller.
pub async fn view_topic(
    data: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let view = data.solutions.topic_view(acting_user(&req), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(view))
}

/// GET /posts/{post_id}/first_solution
pub async fn first_solution(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let eligible = data.solutions.first_solution_eligibility(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(EligibilityResponse { eligible }))
}
