//! # ストレージキー命名
//!
//! クライアントが送ってきたファイル名から、衝突しにくく
//! パスセグメントとして安全なストレージキーを導出する。
//!
//! キー形式: `<UUIDv4 (32桁hex)>_<サニタイズ済みファイル名>`

use std::fmt;

/// UUID部分の桁数（ハイフンなしhex）。
const TOKEN_LEN: usize = 32;

/// サニタイズ結果が空になった場合の表示名。
const FALLBACK_NAME: &str = "upload";

/// Windowsで予約されているデバイス名。
const WINDOWS_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "LPT1", "LPT2", "LPT3",
];

/// ファイル名を単一のパスセグメントとして安全な形に変換する。
///
/// - パス区切り文字と制御文字は空白として扱い、連続する空白は `_` に畳む
/// - ASCIIの `[A-Za-z0-9._-]` 以外は除去する
/// - 先頭・末尾の `.` と `_` は除去する（`..` や隠しファイルを作らない）
/// - Windows予約デバイス名には `_` を前置する
///
/// 結果は空文字列になりうる。
pub fn sanitize_file_name(original: &str) -> String {
    let spaced: String = original
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_control() {
                ' '
            } else {
                c
            }
        })
        .collect();

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let filtered: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let trimmed = filtered.trim_matches(|c| c == '.' || c == '_');

    let stem = trimmed.split('.').next().unwrap_or_default();
    if WINDOWS_DEVICE_NAMES
        .iter()
        .any(|device| device.eq_ignore_ascii_case(stem))
    {
        format!("_{trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// 小文字化した拡張子を返す。`.` を含まない名前は `None`。
pub fn extension_of(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// アップロード済みファイルを指す不透明なキー。
///
/// 生成時・パース時の両方で形式を検証するため、
/// このキーをルートディレクトリに `join` しても外に出ることはない。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    /// 新しいキーを生成する。
    ///
    /// UUIDv4はOSの暗号論的乱数から作られるため、同時アップロード間で衝突しない。
    pub fn generate(original_name: &str) -> Self {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let mut display = sanitize_file_name(original_name);
        if display.is_empty() {
            display = FALLBACK_NAME.to_string();
        }
        Self(format!("{token}_{display}"))
    }

    /// 外部から渡された文字列をキーとして検証する。
    /// 形式に合わないものは `None`。
    pub fn parse(raw: &str) -> Option<Self> {
        let (token, display) = raw.split_at_checked(TOKEN_LEN)?;
        let display = display.strip_prefix('_')?;

        let token_ok = token
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        let display_ok = !display.is_empty()
            && !display.starts_with('.')
            && display
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));

        (token_ok && display_ok).then(|| Self(raw.to_string()))
    }

    /// 表示用の元ファイル名（サニタイズ済み）。
    pub fn original_name(&self) -> &str {
        &self.0[TOKEN_LEN + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
