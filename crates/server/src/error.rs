//! # サーバーエラー型
//!
//! 各コンポーネントの型付きエラーをHTTPステータスと
//! クライアント向けの固定メッセージへ変換する唯一の境界。
//! 内部の詳細（パス、外部APIの応答本文）はレスポンスに含めない。

use axum::http::StatusCode;
use axum::Json;
use lexdesk_types::ErrorBody;

use crate::relay::RelayError;
use crate::session::SessionError;
use crate::storage::StoreError;

/// サーバーエラー型。
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// アップロードストアのエラー
    #[error(transparent)]
    Store(#[from] StoreError),
    /// セッションのエラー
    #[error(transparent)]
    Session(#[from] SessionError),
    /// クエリ中継のエラー
    #[error(transparent)]
    Relay(#[from] RelayError),
    /// 不正なリクエストボディ
    #[error("不正なリクエスト: {0}")]
    BadRequest(String),
    /// 未定義のルート・存在しないリソース
    #[error("リソースが見つかりません")]
    NotFound,
    /// ルートは存在するがメソッドが異なる
    #[error("許可されていないメソッド")]
    MethodNotAllowed,
    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

/// 予期しない障害に対するクライアント向けメッセージ。
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

impl AppError {
    /// ステータスコードとクライアント向けメッセージ。
    pub fn status_and_message(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Store(e) => match e {
                StoreError::MissingFile => (StatusCode::BAD_REQUEST, "No file part"),
                StoreError::EmptyFileName => (StatusCode::BAD_REQUEST, "No selected file"),
                StoreError::DisallowedExtension(_) => {
                    (StatusCode::BAD_REQUEST, "File type not allowed")
                }
                StoreError::PayloadTooLarge { .. } => {
                    (StatusCode::PAYLOAD_TOO_LARGE, "File too large")
                }
                StoreError::SizeMismatch { .. } => (StatusCode::BAD_REQUEST, "Incomplete upload"),
                StoreError::NotFound(_) => (StatusCode::NOT_FOUND, "No file uploaded"),
                StoreError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE),
            },
            AppError::Session(SessionError::NoCurrentFile) => {
                (StatusCode::NOT_FOUND, "No file uploaded")
            }
            AppError::Relay(e) => match e {
                RelayError::EmptyQuery => (StatusCode::BAD_REQUEST, "No query provided"),
                RelayError::UpstreamFailure => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An error occurred while processing your request",
                ),
            },
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "Invalid request body"),
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found"),
            AppError::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            tracing::error!(error = %self, "リクエスト処理に失敗");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "リクエストを拒否");
        }
        (
            status,
            Json(ErrorBody {
                error: message.to_string(),
            }),
        )
            .into_response()
    }
}
