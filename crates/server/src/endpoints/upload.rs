//! # POST /upload
//!
//! multipartの `file` パートを保存し、セッションの現在のファイルとして紐付ける。

use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::{Extension, Json};
use futures_util::TryStreamExt;
use lexdesk_types::UploadResponse;
use tokio_util::io::StreamReader;

use crate::config::AppState;
use crate::error::AppError;
use crate::session::Session;
use crate::storage::{StoreError, UploadPolicy};

/// ファイルパート名。
pub const FILE_FIELD: &str = "file";

/// multipartの境界・ヘッダー等に許容する余白。
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

/// リクエストボディ全体の上限。ファイル上限にmultipartの余白を足したもの。
pub fn request_body_limit(policy: &UploadPolicy) -> u64 {
    policy.max_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES)
}

/// POST /upload — ファイルアップロード。
///
/// 検証順: ファイルパートの有無 → ファイル名 → 拡張子 → サイズ。
/// 検証に失敗した場合、ファイルは残らない。
pub async fn handle_upload(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<Session>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let policy = state.store.policy();
    let limit = policy.max_bytes;

    // Content-Lengthが分かる場合はボディを読む前に判定する
    if let Some(length) = content_length(&headers) {
        if length > request_body_limit(policy) {
            return Err(StoreError::PayloadTooLarge { limit }.into());
        }
    }

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        // filenameのないパートはフォーム値であり、ファイルとしては扱わない
        let file_name = match (field.name(), field.file_name()) {
            (Some(FILE_FIELD), Some(name)) => name.to_string(),
            _ => continue,
        };
        let mut reader = StreamReader::new(Box::pin(field.map_err(std::io::Error::other)));

        let artifact = state
            .store
            .put(&file_name, &mut reader, None)
            .await
            .map_err(|e| reclassify_body_error(e, limit))?;

        let previous = state
            .sessions
            .bind_current(&session.id, artifact.key.clone())
            .await;
        tracing::info!(
            session_id = %session.id,
            storage_key = %artifact.key,
            replaced = previous.is_some(),
            "セッションにアップロードを紐付けました"
        );

        return Ok(Json(UploadResponse {
            success: true,
            filename: artifact.original_name,
        }));
    }

    Err(StoreError::MissingFile.into())
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// multipartのパースエラーを分類する。ボディ上限超過は413として扱う。
fn multipart_error(e: MultipartError, limit: u64) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        StoreError::PayloadTooLarge { limit }.into()
    } else {
        AppError::BadRequest(e.body_text())
    }
}

/// ストリーム読み込み中のボディ上限超過を `PayloadTooLarge` に読み替える。
fn reclassify_body_error(e: StoreError, limit: u64) -> AppError {
    let too_large = matches!(
        &e,
        StoreError::Io(io) if io
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<MultipartError>())
            .is_some_and(|m| m.status() == StatusCode::PAYLOAD_TOO_LARGE)
    );
    if too_large {
        StoreError::PayloadTooLarge { limit }.into()
    } else {
        e.into()
    }
}
