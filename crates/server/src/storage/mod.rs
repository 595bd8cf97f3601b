//! # アップロードストア
//!
//! アップロードされたファイルを永続化・取得する抽象インターフェース。
//! ファイルシステム実装は `local` サブモジュールを参照。

pub mod local;
pub mod naming;

pub use local::LocalArtifactStore;
pub use naming::StorageKey;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::AsyncRead;

/// デフォルトのアップロード上限（16 MiB）。
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 16 * 1024 * 1024;

/// ストア操作のエラー型。
///
/// 検証系のバリアントは副作用（ファイル作成）より前に判定される。
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// リクエストにファイルパートがない
    #[error("ファイルパートがありません")]
    MissingFile,
    /// ファイル名が空
    #[error("ファイル名が空です")]
    EmptyFileName,
    /// 許可されていない拡張子
    #[error("許可されていない拡張子です: {0:?}")]
    DisallowedExtension(Option<String>),
    /// サイズ上限超過
    #[error("ペイロードサイズが上限を超えています (上限: {limit} bytes)")]
    PayloadTooLarge { limit: u64 },
    /// 申告サイズと実際に書き込んだサイズの不一致
    #[error("書き込みサイズが申告値と一致しません: 申告 {declared} bytes, 実際 {written} bytes")]
    SizeMismatch { declared: u64, written: u64 },
    /// キーに対応するファイルが存在しない
    #[error("アーティファクトが見つかりません: {0}")]
    NotFound(String),
    /// ファイルシステムI/Oエラー
    #[error("ストレージI/Oエラー: {0}")]
    Io(#[from] std::io::Error),
}

/// アップロードの受け入れ条件。
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    /// 許可する拡張子（小文字）
    pub allowed_extensions: BTreeSet<String>,
    /// 1ファイルあたりの最大バイト数
    pub max_bytes: u64,
    /// 取得時に返すメディアタイプ
    pub media_type: String,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            allowed_extensions: BTreeSet::from(["pdf".to_string()]),
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            media_type: "application/pdf".to_string(),
        }
    }
}

impl UploadPolicy {
    /// ファイル名を検証する（空チェック → 拡張子チェックの順）。
    pub fn validate_name(&self, file_name: &str) -> Result<(), StoreError> {
        if file_name.is_empty() {
            return Err(StoreError::EmptyFileName);
        }
        match naming::extension_of(file_name) {
            Some(ext) if self.allowed_extensions.contains(&ext) => Ok(()),
            ext => Err(StoreError::DisallowedExtension(ext)),
        }
    }

    /// 申告サイズが分かっている場合、読み込み前に上限を判定する。
    pub fn check_declared_size(&self, declared_size: Option<u64>) -> Result<(), StoreError> {
        match declared_size {
            Some(size) if size > self.max_bytes => Err(StoreError::PayloadTooLarge {
                limit: self.max_bytes,
            }),
            _ => Ok(()),
        }
    }
}

/// 保存に成功したアップロード。生成後は変更されない。
#[derive(Debug, Clone)]
pub struct UploadedArtifact {
    /// ストレージキー
    pub key: StorageKey,
    /// サニタイズ済みの表示名
    pub original_name: String,
    /// 書き込んだバイト数
    pub byte_size: u64,
    /// 保存先パス
    pub stored_at: PathBuf,
}

/// 読み出し用に開いたアーティファクト。
#[derive(Debug)]
pub struct StoredArtifact {
    /// 読み出し用ファイルハンドル
    pub file: tokio::fs::File,
    /// ファイルサイズ
    pub byte_size: u64,
    /// レスポンスのContent-Type
    pub media_type: String,
}

/// アップロードストアの抽象インターフェース。
///
/// 書き込みはリーダーから見てアトミックでなければならない
/// （書きかけのファイルが `open` で見えてはいけない）。
#[async_trait::async_trait]
pub trait ArtifactStore: Send + Sync {
    /// 受け入れ条件。
    fn policy(&self) -> &UploadPolicy;

    /// ストリームを検証しつつ保存し、生成したキーを返す。
    ///
    /// `declared_size` が与えられた場合は読み込み前の上限判定と、
    /// 書き込み後のサイズ一致確認に使う。
    async fn put(
        &self,
        file_name: &str,
        body: &mut (dyn AsyncRead + Send + Unpin),
        declared_size: Option<u64>,
    ) -> Result<UploadedArtifact, StoreError>;

    /// キーに対応するファイルを開く。
    /// 形式不正なキー（ルート外を指しうるもの）も `NotFound` として扱う。
    async fn open(&self, raw_key: &str) -> Result<StoredArtifact, StoreError>;

    /// `max_age` より古いファイルを削除し、削除数を返す。
    async fn purge_older_than(&self, max_age: Duration) -> Result<usize, StoreError>;
}
