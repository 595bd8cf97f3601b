//! # Lexdesk サーバー起動
//!
//! 環境変数から設定を読み込み、スイーパーとHTTPサーバーを起動する。

use std::sync::Arc;

use lexdesk_server::config::{AppState, ServerConfig};
use lexdesk_server::{build_router, sweeper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env()?;
    tracing::debug!(?config, "設定を読み込みました");

    let state = Arc::new(AppState::from_config(&config)?);
    let sweeper = sweeper::spawn(state.clone(), config.upload_retention, config.session_idle);

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(
        production = config.production,
        upload_folder = %config.upload_folder.display(),
        "Lexdeskサーバーを {} で起動します",
        addr
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    tracing::info!("サーバーを停止しました");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "シグナルハンドラーの登録に失敗");
        std::future::pending::<()>().await;
    }
    tracing::info!("停止シグナルを受信しました");
}
