//! Per-bot context endpoints for the calling client.
//!
//! - GET /api/v1/bots/{bot}/context - Current context (empty when none stored)
//! - PUT /api/v1/bots/{bot}/context - Merge a partial update, return the result

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};

use palaver_types::context::{ContextUpdate, UserContext};

use crate::http::error::AppError;
use crate::http::extractors::session::RequestSession;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// GET /api/v1/bots/{bot}/context
pub async fn get_context(
    State(state): State<AppState>,
    session: RequestSession,
    Path(bot_id): Path<String>,
) -> Result<Json<ApiResponse<UserContext>>, AppError> {
    let start = Instant::now();
    state.bot(&bot_id)?;
    let identity = session.identity();
    let context = state
        .engine
        .context()
        .get_context(&bot_id, identity.key())
        .await;
    Ok(Json(ApiResponse::success(context, start)))
}

/// PUT /api/v1/bots/{bot}/context
pub async fn update_context(
    State(state): State<AppState>,
    session: RequestSession,
    Path(bot_id): Path<String>,
    Json(update): Json<ContextUpdate>,
) -> Result<Json<ApiResponse<UserContext>>, AppError> {
    let start = Instant::now();
    state.bot(&bot_id)?;
    let identity = session.identity();
    let manager = state.engine.context();
    manager.update_context(&bot_id, identity.key(), update).await;
    let context = manager.get_context(&bot_id, identity.key()).await;
    Ok(Json(ApiResponse::success(context, start)))
}
