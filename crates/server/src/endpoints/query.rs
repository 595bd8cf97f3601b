//! # POST /gpt
//!
//! 法律相談クエリを生成APIへ中継する。

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use lexdesk_types::{QueryRequest, QueryResponse};

use crate::config::AppState;
use crate::error::AppError;

/// POST /gpt — クエリ中継。
///
/// `query` が未指定・空なら400、外部APIの失敗は汎用メッセージの500。
pub async fn handle_query(
    State(state): State<Arc<AppState>>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError> {
    let Json(request) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let response = state.relay.ask(request.query.as_deref()).await?;
    Ok(Json(QueryResponse { response }))
}
