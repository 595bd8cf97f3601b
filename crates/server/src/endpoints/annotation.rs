//! # POST /save_annotation
//!
//! アノテーションを受け取りログに記録する。永続化はしない。

use axum::extract::rejection::JsonRejection;
use axum::{Extension, Json};
use lexdesk_types::{AnnotationRequest, SuccessResponse};

use crate::error::AppError;
use crate::session::Session;

/// POST /save_annotation — アノテーションの受信（記録のみ）。
pub async fn handle_save_annotation(
    Extension(session): Extension<Session>,
    body: Result<Json<AnnotationRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, AppError> {
    let Json(request) = body.map_err(|e| AppError::BadRequest(e.body_text()))?;

    tracing::info!(
        session_id = %session.id,
        count = request.annotations.len(),
        annotations = %serde_json::Value::Array(request.annotations),
        "アノテーションを受信しました"
    );

    Ok(Json(SuccessResponse { success: true }))
}
