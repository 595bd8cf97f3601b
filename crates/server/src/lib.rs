//! # Lexdesk サーバー
//!
//! 法律相談クエリの中継と、セッション単位のPDF保管を行うHTTPサーバー。
//!
//! ## 役割
//! - 法律相談クエリを外部テキスト生成APIへ中継
//! - PDFアップロードの保存と、セッションへの紐付け
//! - アノテーションの受信（記録のみ）
//!
//! ## API エンドポイント
//! - `GET /` — ランディングページ
//! - `POST /gpt` — クエリ中継
//! - `POST /upload` — PDFアップロード
//! - `GET /get_pdf` — 現在のアップロードの取得
//! - `POST /save_annotation` — アノテーションの受信

pub mod config;
pub mod endpoints;
pub mod error;
pub mod relay;
pub mod session;
pub mod storage;
pub mod sweeper;

#[cfg(test)]
pub(crate) mod test_helpers;

use std::any::Any;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use lexdesk_types::ErrorBody;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppState;
use crate::endpoints::*;
use crate::error::INTERNAL_ERROR_MESSAGE;

/// ルーターを構築する。
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = usize::try_from(upload::request_body_limit(state.store.policy()))
        .unwrap_or(usize::MAX);

    Router::new()
        .route("/", get(handle_index))
        .route("/gpt", post(handle_query))
        .route("/upload", post(handle_upload))
        .route("/get_pdf", get(handle_get_pdf))
        .route("/save_annotation", post(handle_save_annotation))
        .fallback(handle_not_found)
        .method_not_allowed_fallback(handle_method_not_allowed)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            session::session_layer,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

/// ハンドラーのパニックを汎用500に変換する。
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = detail, "ハンドラーがパニックしました");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: INTERNAL_ERROR_MESSAGE.to_string(),
        }),
    )
        .into_response()
}
