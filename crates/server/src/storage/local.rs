//! # ローカルファイルシステム アップロードストア
//!
//! `<root>/<storage_key>` にファイルを保存する実装。
//!
//! 書き込みは `<root>/.partial-<uuid>` に対して行い、fsync後に
//! 最終名へrenameする。失敗時はガードが書きかけファイルを削除する。

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use super::naming::StorageKey;
use super::{ArtifactStore, StoreError, StoredArtifact, UploadPolicy, UploadedArtifact};

/// 書きかけファイルの接頭辞。`StorageKey` は `.` で始まらないので衝突しない。
const PARTIAL_PREFIX: &str = ".partial-";

/// ローカルディレクトリにアップロードを保存するストア。
pub struct LocalArtifactStore {
    root: PathBuf,
    policy: UploadPolicy,
}

impl LocalArtifactStore {
    /// 新しいストアを作成する。ルートディレクトリは初回書き込み時に作成される。
    pub fn new(root: impl Into<PathBuf>, policy: UploadPolicy) -> Self {
        Self {
            root: root.into(),
            policy,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// 書きかけファイルのスコープガード。
/// `commit` されずにドロップされた場合はファイルを削除する。
struct PartialFile {
    path: PathBuf,
    file: tokio::fs::File,
    committed: bool,
}

impl PartialFile {
    async fn create(dir: &Path) -> std::io::Result<Self> {
        let path = dir.join(format!("{PARTIAL_PREFIX}{}", uuid::Uuid::new_v4().simple()));
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file,
            committed: false,
        })
    }

    async fn commit(mut self, dest: &Path) -> std::io::Result<()> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        tokio::fs::rename(&self.path, dest).await?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!(path = %self.path.display(), error = %e, "書きかけファイルの削除に失敗");
            }
        }
    }
}

#[async_trait::async_trait]
impl ArtifactStore for LocalArtifactStore {
    fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    async fn put(
        &self,
        file_name: &str,
        body: &mut (dyn AsyncRead + Send + Unpin),
        declared_size: Option<u64>,
    ) -> Result<UploadedArtifact, StoreError> {
        self.policy.validate_name(file_name)?;
        self.policy.check_declared_size(declared_size)?;

        tokio::fs::create_dir_all(&self.root).await?;

        let key = StorageKey::generate(file_name);
        let stored_at = self.root.join(key.as_str());
        let mut partial = PartialFile::create(&self.root).await?;

        // 上限+1バイトまでしか読まないことで、超過時もボディ全体をディスクに載せない
        let limit = self.policy.max_bytes;
        let mut bounded = body.take(limit.saturating_add(1));
        let written = tokio::io::copy(&mut bounded, &mut partial.file).await?;
        if written > limit {
            return Err(StoreError::PayloadTooLarge { limit });
        }
        if let Some(declared) = declared_size {
            if declared != written {
                return Err(StoreError::SizeMismatch { declared, written });
            }
        }

        partial.commit(&stored_at).await?;

        tracing::info!(
            storage_key = %key,
            byte_size = written,
            "アップロードを保存しました"
        );

        Ok(UploadedArtifact {
            original_name: key.original_name().to_string(),
            key,
            byte_size: written,
            stored_at,
        })
    }

    async fn open(&self, raw_key: &str) -> Result<StoredArtifact, StoreError> {
        let key =
            StorageKey::parse(raw_key).ok_or_else(|| StoreError::NotFound(raw_key.to_string()))?;
        let path = self.root.join(key.as_str());

        let file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(StoreError::NotFound(key.to_string()));
        }

        Ok(StoredArtifact {
            file,
            byte_size: metadata.len(),
            media_type: self.policy.media_type.clone(),
        })
    }

    async fn purge_older_than(&self, max_age: Duration) -> Result<usize, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(PARTIAL_PREFIX) && StorageKey::parse(&name).is_none() {
                continue;
            }

            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let expired = metadata
                .modified()
                .ok()
                .and_then(|modified| modified.elapsed().ok())
                .is_some_and(|age| age >= max_age);
            if !expired {
                continue;
            }

            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(removed)
    }
}
