//! # GET /
//!
//! ランディングページ。設定されたHTMLファイルをそのまま返す。

use std::sync::Arc;

use axum::extract::State;
use axum::response::Html;

use crate::config::AppState;
use crate::error::AppError;

/// GET / — ランディングページ。
pub async fn handle_index(State(state): State<Arc<AppState>>) -> Result<Html<String>, AppError> {
    match tokio::fs::read_to_string(&state.index_page).await {
        Ok(html) => Ok(Html(html)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %state.index_page.display(), "ランディングページが見つかりません");
            Err(AppError::NotFound)
        }
        Err(e) => Err(AppError::Internal(format!("ランディングページの読み込みに失敗: {e}"))),
    }
}
