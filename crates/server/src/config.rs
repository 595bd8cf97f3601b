//! # サーバー設定・共有状態
//!
//! 環境変数からの設定読み込みとサーバーの共有状態の定義。
//! 設定は起動時に一度だけ構築し、各コンポーネントへ明示的に渡す。

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use rand::RngCore;

use crate::relay::{self, GeminiGenerator, QueryRelay};
use crate::session::{CookieSigner, SessionStore};
use crate::storage::{self, ArtifactStore, LocalArtifactStore, UploadPolicy};

/// セッションのアイドル破棄時間のデフォルト値（24時間）。
pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(24 * 60 * 60);

/// 起動時に読み込む設定。
#[derive(Clone)]
pub struct ServerConfig {
    /// 生成APIの認証キー
    pub google_api_key: String,
    /// 本番環境かどうか（`APP_ENV=production`）
    pub production: bool,
    /// セッションCookie署名鍵
    pub secret_key: Vec<u8>,
    /// 待ち受けポート
    pub port: u16,
    /// アップロード保存先ディレクトリ
    pub upload_folder: PathBuf,
    /// アップロードサイズ上限（バイト）
    pub max_content_length: u64,
    /// 許可する拡張子（小文字）
    pub allowed_extensions: BTreeSet<String>,
    /// 生成モデルID
    pub generation_model: String,
    /// 生成APIのベースURL
    pub generation_api_base: String,
    /// 生成APIのタイムアウト
    pub generation_timeout: Duration,
    /// ランディングページのHTMLファイル
    pub index_page: PathBuf,
    /// アップロードの保持期間（未設定なら削除しない）
    pub upload_retention: Option<Duration>,
    /// セッションのアイドル破棄時間
    pub session_idle: Duration,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("production", &self.production)
            .field("port", &self.port)
            .field("upload_folder", &self.upload_folder)
            .field("max_content_length", &self.max_content_length)
            .field("allowed_extensions", &self.allowed_extensions)
            .field("generation_model", &self.generation_model)
            .field("generation_api_base", &self.generation_api_base)
            .field("generation_timeout", &self.generation_timeout)
            .field("index_page", &self.index_page)
            .field("upload_retention", &self.upload_retention)
            .field("session_idle", &self.session_idle)
            .finish_non_exhaustive()
    }
}

impl ServerConfig {
    /// プロセス環境変数から構築する。
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意の変数ルックアップから構築する。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let google_api_key = var("GOOGLE_API_KEY")
            .ok_or_else(|| anyhow::anyhow!("GOOGLE_API_KEYが設定されていません"))?;

        let production = var("APP_ENV").is_some_and(|env| env == "production");

        let secret_key = match var("SECRET_KEY") {
            Some(key) => key.into_bytes(),
            None if production => {
                anyhow::bail!("本番環境ではSECRET_KEYの設定が必須です");
            }
            None => {
                // 開発環境用: ランダム鍵を生成（再起動でセッションは無効になる）
                tracing::warn!("SECRET_KEYが未設定です。ランダム鍵を生成します（開発環境用）");
                let mut bytes = [0u8; 16];
                rand::rngs::OsRng.fill_bytes(&mut bytes);
                hex::encode(bytes).into_bytes()
            }
        };

        let port = parse_var(&var, "PORT")?.unwrap_or(8080);
        let upload_folder = var("UPLOAD_FOLDER")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("uploads"));
        let max_content_length =
            parse_var(&var, "MAX_CONTENT_LENGTH")?.unwrap_or(storage::DEFAULT_MAX_UPLOAD_BYTES);

        let allowed_extensions = match var("ALLOWED_EXTENSIONS") {
            Some(list) => parse_extensions(&list)?,
            None => UploadPolicy::default().allowed_extensions,
        };

        let generation_model = var("GENERATION_MODEL")
            .unwrap_or_else(|| relay::gemini::DEFAULT_MODEL.to_string());
        let generation_api_base = var("GENERATION_API_BASE")
            .unwrap_or_else(|| relay::gemini::DEFAULT_API_BASE.to_string());
        let generation_timeout = parse_var(&var, "GENERATION_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(relay::DEFAULT_GENERATION_TIMEOUT);

        let index_page = var("INDEX_PAGE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("templates/index.html"));

        let upload_retention = parse_var(&var, "UPLOAD_RETENTION_SECS")?.map(Duration::from_secs);
        let session_idle = parse_var(&var, "SESSION_IDLE_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SESSION_IDLE);

        Ok(Self {
            google_api_key,
            production,
            secret_key,
            port,
            upload_folder,
            max_content_length,
            allowed_extensions,
            generation_model,
            generation_api_base,
            generation_timeout,
            index_page,
            upload_retention,
            session_idle,
        })
    }

    /// 設定からアップロードの受け入れ条件を作る。
    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy {
            allowed_extensions: self.allowed_extensions.clone(),
            max_bytes: self.max_content_length,
            ..UploadPolicy::default()
        }
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("{name}の値が不正です: {raw}"))
        })
        .transpose()
}

fn parse_extensions(list: &str) -> anyhow::Result<BTreeSet<String>> {
    let extensions: BTreeSet<String> = list
        .split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect();
    if extensions.is_empty() {
        anyhow::bail!("ALLOWED_EXTENSIONSに有効な拡張子がありません: {list}");
    }
    Ok(extensions)
}

/// サーバーの共有状態。
pub struct AppState {
    /// アップロードストア（トレイトで抽象化）
    pub store: Box<dyn ArtifactStore>,
    /// セッションと現在のアーティファクトの紐付け
    pub sessions: SessionStore,
    /// セッションCookie署名
    pub cookie_signer: CookieSigner,
    /// クエリ中継
    pub relay: QueryRelay,
    /// ランディングページのHTMLファイル
    pub index_page: PathBuf,
}

impl AppState {
    /// 設定から本番用のコンポーネントを組み立てる。
    pub fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let store = LocalArtifactStore::new(config.upload_folder.clone(), config.upload_policy());

        let cookie_signer = CookieSigner::new(&config.secret_key, config.production)
            .map_err(|e| anyhow::anyhow!("セッション署名鍵が不正です: {e}"))?;

        let generator = GeminiGenerator::new(
            reqwest::Client::new(),
            config.generation_api_base.clone(),
            config.generation_model.clone(),
            config.google_api_key.clone(),
        );

        Ok(Self {
            store: Box::new(store),
            sessions: SessionStore::new(),
            cookie_signer,
            relay: QueryRelay::new(Box::new(generator), config.generation_timeout),
            index_page: config.index_page.clone(),
        })
    }
}
