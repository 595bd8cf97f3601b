//! # Lexdesk 共有型定義
//!
//! HTTP APIでやり取りされるリクエスト・レスポンスのデータ構造を
//! Rust構造体として提供する。
//!
//! ## エンコーディング規則
//! - リクエスト・レスポンスボディはすべてJSON
//! - `/get_pdf` のみバイナリ（`application/pdf`）を返す

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /gpt
// ---------------------------------------------------------------------------

/// /gpt リクエスト。
///
/// `query` が欠落していてもデシリアライズは成功させ、
/// 空クエリの判定はサーバー側で行う。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    /// 自由記述の法律相談クエリ
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

/// /gpt レスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// 生成APIが返したテキスト
    pub response: String,
}

// ---------------------------------------------------------------------------
// /upload
// ---------------------------------------------------------------------------

/// /upload レスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    /// 常に `true`
    pub success: bool,
    /// サニタイズ済みの表示用ファイル名
    pub filename: String,
}

// ---------------------------------------------------------------------------
// /save_annotation
// ---------------------------------------------------------------------------

/// /save_annotation リクエスト。
///
/// アノテーションの中身はクライアント（PDFビューア）が自由に決める。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnotationRequest {
    /// アノテーションレコードの一覧
    #[serde(default)]
    pub annotations: Vec<serde_json::Value>,
}

/// 成功のみを示すレスポンス。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    /// 常に `true`
    pub success: bool,
}

// ---------------------------------------------------------------------------
// エラー
// ---------------------------------------------------------------------------

/// 全エンドポイント共通のエラーボディ。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// クライアント向けの短いエラーメッセージ
    pub error: String,
}
