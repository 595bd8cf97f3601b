//! # テスト用共通ヘルパー
//!
//! モック生成APIと一時ディレクトリを使った `AppState` の構築、
//! 実ポートでのサーバー起動。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use crate::config::AppState;
use crate::relay::tests::RecordingGenerator;
use crate::relay::{QueryRelay, TextGenerator};
use crate::session::{CookieSigner, SessionStore};
use crate::storage::{LocalArtifactStore, UploadPolicy};

/// テスト用モックの固定応答。
pub const MOCK_REPLY: &str = "Under Section 10 of the Indian Contract Act, 1872, the agreement is valid.";

/// 指定した生成器・アップロード上限で `AppState` を構築する。
pub fn test_state_with(
    generator: Box<dyn TextGenerator>,
    max_bytes: u64,
) -> (Arc<AppState>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let store = LocalArtifactStore::new(
        temp_dir.path().join("uploads"),
        UploadPolicy {
            max_bytes,
            ..UploadPolicy::default()
        },
    );
    let state = Arc::new(AppState {
        store: Box::new(store),
        sessions: SessionStore::new(),
        cookie_signer: CookieSigner::new(b"test-secret", false).unwrap(),
        relay: QueryRelay::new(generator, Duration::from_secs(5)),
        index_page: temp_dir.path().join("index.html"),
    });
    (state, temp_dir)
}

/// 固定応答のモック生成器と16 MiB上限で `AppState` を構築する。
pub fn test_state() -> (Arc<AppState>, TempDir) {
    test_state_with(
        Box::new(RecordingGenerator {
            prompts: Arc::new(Mutex::new(Vec::new())),
            reply: MOCK_REPLY.to_string(),
        }),
        crate::storage::DEFAULT_MAX_UPLOAD_BYTES,
    )
}

/// ルーターを `127.0.0.1` の空きポートで起動し、ベースURLを返す。
pub async fn start_server(state: Arc<AppState>) -> String {
    let app = crate::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    format!("http://127.0.0.1:{port}")
}
