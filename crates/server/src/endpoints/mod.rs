//! # HTTPエンドポイント
//!
//! - `GET /` — ランディングページ
//! - `POST /gpt` — 法律相談クエリの中継
//! - `POST /upload` — PDFアップロード
//! - `GET /get_pdf` — 現在のアップロードの取得
//! - `POST /save_annotation` — アノテーションの受信（記録のみ）

pub mod annotation;
pub mod index;
pub mod pdf;
pub mod query;
pub mod upload;

pub use annotation::handle_save_annotation;
pub use index::handle_index;
pub use pdf::handle_get_pdf;
pub use query::handle_query;
pub use upload::handle_upload;

use crate::error::AppError;

/// 未定義ルートのフォールバック。
pub async fn handle_not_found() -> AppError {
    AppError::NotFound
}

/// 既知のルートに対するメソッド不一致のフォールバック。
pub async fn handle_method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}
