//! # GET /get_pdf
//!
//! セッションに紐付いたアップロードをストリームで返す。

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Extension;
use tokio_util::io::ReaderStream;

use crate::config::AppState;
use crate::error::AppError;
use crate::session::Session;

/// GET /get_pdf — 現在のアップロードの取得。
///
/// 未アップロード・ファイル消失のいずれも404として扱う。
pub async fn handle_get_pdf(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Response, AppError> {
    let key = state.sessions.resolve_current(&session.id).await?;
    let artifact = state.store.open(key.as_str()).await?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, artifact.media_type)
        .header(header::CONTENT_LENGTH, artifact.byte_size)
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", key.original_name()),
        )
        .body(Body::from_stream(ReaderStream::new(artifact.file)))
        .map_err(|e| AppError::Internal(format!("レスポンスの構築に失敗: {e}")))
}
