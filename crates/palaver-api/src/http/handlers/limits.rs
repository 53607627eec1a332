//! Usage limit endpoint.
//!
//! GET /api/v1/bots/{bot}/limits - The caller's usage against each quota

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;

use palaver_core::usage::gate::summarize;
use palaver_types::usage::{LimitCheck, UsageLimit, UserRole};

use crate::http::error::AppError;
use crate::http::extractors::session::RequestSession;
use crate::http::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct LimitsResponse {
    pub bot_id: String,
    pub role: UserRole,
    pub limits: Vec<UsageLimit>,
    /// The limit a send would be checked against.
    pub summary: LimitCheck,
}

/// GET /api/v1/bots/{bot}/limits
pub async fn get_limits(
    State(state): State<AppState>,
    session: RequestSession,
    Path(bot_id): Path<String>,
) -> Result<Json<ApiResponse<LimitsResponse>>, AppError> {
    let start = Instant::now();
    state.bot(&bot_id)?;
    let limits = state
        .engine
        .gate()
        .limits(&session.identity(), &bot_id, session.role)
        .await?;
    let summary = summarize(&limits);
    Ok(Json(ApiResponse::success(
        LimitsResponse {
            bot_id,
            role: session.role,
            limits,
            summary,
        },
        start,
    )))
}
