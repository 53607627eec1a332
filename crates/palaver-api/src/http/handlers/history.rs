//! Conversation history endpoints.
//!
//! - GET    /api/v1/history?bot_id=&group=  - The caller's transcripts, grouped
//! - DELETE /api/v1/history?bot_id=         - Delete the caller's transcripts

use std::time::Instant;

use axum::Json;
use axum::extract::{Query, State};
use serde::Serialize;
use serde_json::json;

use palaver_core::chat::grouping::{
    ClientGroup, DateGroup, HistoryGroup, group_by_client, group_by_date, group_history,
};
use palaver_types::chat::ChatRecord;

use crate::http::error::AppError;
use crate::http::extractors::query::{HistoryGrouping, HistoryQuery};
use crate::http::extractors::session::RequestSession;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// History in the shape the caller asked for.
#[derive(Debug, Serialize)]
#[serde(tag = "grouping", content = "groups", rename_all = "lowercase")]
pub enum HistoryView {
    Full(Vec<HistoryGroup>),
    Date(Vec<DateGroup>),
    Client(Vec<ClientGroup>),
    None(Vec<ChatRecord>),
}

impl HistoryView {
    pub fn build(records: Vec<ChatRecord>, grouping: HistoryGrouping) -> Self {
        match grouping {
            HistoryGrouping::Full => HistoryView::Full(group_history(records)),
            HistoryGrouping::Date => HistoryView::Date(group_by_date(records)),
            HistoryGrouping::Client => HistoryView::Client(group_by_client(records)),
            HistoryGrouping::None => HistoryView::None(records),
        }
    }
}

/// GET /api/v1/history - List the caller's transcripts.
pub async fn list_history(
    State(state): State<AppState>,
    session: RequestSession,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<HistoryView>>, AppError> {
    let start = Instant::now();
    let records = state
        .engine
        .history()
        .list_for(&session.identity(), query.bot_id.as_deref())
        .await?;
    Ok(Json(ApiResponse::success(
        HistoryView::build(records, query.group),
        start,
    )))
}

/// DELETE /api/v1/history - Delete all of the caller's transcripts.
pub async fn clear_history(
    State(state): State<AppState>,
    session: RequestSession,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let history = state.engine.history();
    let records = history
        .list_for(&session.identity(), query.bot_id.as_deref())
        .await?;
    for record in &records {
        history.delete(&record.chat_id).await?;
    }
    Ok(Json(ApiResponse::success(
        json!({ "deleted": records.len() }),
        start,
    )))
}
