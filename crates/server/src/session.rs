//! # セッション
//!
//! 呼び出し元のセッションと、直近にアップロードされたアーティファクトの
//! ストレージキーを紐付ける。
//!
//! - セッションIDは128bit乱数のhex。Cookie `lexdesk_session` に
//!   `<id>.<HMAC-SHA256(id)のhex>` として載せる
//! - 署名が一致しないCookieは無視し、新しいセッションを発行する
//! - 紐付けは単一スロット（後勝ち）。過去のアップロード履歴は保持しない

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use tokio::sync::RwLock;

use crate::config::AppState;
use crate::storage::StorageKey;

/// セッションCookie名。
pub const SESSION_COOKIE_NAME: &str = "lexdesk_session";

type HmacSha256 = Hmac<Sha256>;

/// 不透明なセッション識別子。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// OS乱数から新しいIDを生成する。
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    fn parse(raw: &str) -> Option<Self> {
        let valid = raw.len() == 32
            && raw
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// 1セッション分の状態。
#[derive(Debug, Clone)]
pub struct SessionState {
    current_artifact: Option<StorageKey>,
    last_seen: Instant,
}

impl SessionState {
    fn new() -> Self {
        Self {
            current_artifact: None,
            last_seen: Instant::now(),
        }
    }

    /// 現在のアーティファクトを差し替え、直前のものを返す。
    pub fn bind_current(&mut self, key: StorageKey) -> Option<StorageKey> {
        self.last_seen = Instant::now();
        self.current_artifact.replace(key)
    }

    pub fn current(&self) -> Option<&StorageKey> {
        self.current_artifact.as_ref()
    }
}

/// セッション操作のエラー型。
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// まだ何もアップロードされていない
    #[error("セッションにファイルが紐付いていません")]
    NoCurrentFile,
}

/// インメモリのセッションストア。
///
/// セッションは初回の紐付け時に暗黙に作成される。
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, SessionState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// セッションの現在のアーティファクトを上書きする。ファイルシステムには触れない。
    pub async fn bind_current(&self, id: &SessionId, key: StorageKey) -> Option<StorageKey> {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(id.clone())
            .or_insert_with(SessionState::new)
            .bind_current(key)
    }

    /// セッションの現在のアーティファクトを返す。
    pub async fn resolve_current(&self, id: &SessionId) -> Result<StorageKey, SessionError> {
        let mut sessions = self.sessions.write().await;
        let state = sessions.get_mut(id).ok_or(SessionError::NoCurrentFile)?;
        state.last_seen = Instant::now();
        state.current().cloned().ok_or(SessionError::NoCurrentFile)
    }

    /// `max_idle` 以上アクセスのないセッションを破棄し、破棄数を返す。
    pub async fn purge_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, state| state.last_seen.elapsed() < max_idle);
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// セッションCookieの署名・検証を行う。
#[derive(Clone)]
pub struct CookieSigner {
    mac: HmacSha256,
    secure: bool,
}

impl CookieSigner {
    /// 署名鍵から構築する。`secure` が真なら `Secure` 属性を付与する。
    pub fn new(secret: &[u8], secure: bool) -> Result<Self, hmac::digest::InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(secret)?,
            secure,
        })
    }

    /// `<id>.<署名hex>` を返す。
    pub fn sign(&self, id: &SessionId) -> String {
        let mut mac = self.mac.clone();
        mac.update(id.as_str().as_bytes());
        format!("{}.{}", id, hex::encode(mac.finalize().into_bytes()))
    }

    /// Cookie値を検証し、正しければセッションIDを返す。
    pub fn verify(&self, value: &str) -> Option<SessionId> {
        let (raw_id, signature_hex) = value.split_once('.')?;
        let id = SessionId::parse(raw_id)?;
        let signature = hex::decode(signature_hex).ok()?;

        let mut mac = self.mac.clone();
        mac.update(id.as_str().as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(id)
    }

    /// `Set-Cookie` ヘッダー値を組み立てる。
    pub fn set_cookie_value(&self, id: &SessionId) -> String {
        let mut cookie = format!(
            "{SESSION_COOKIE_NAME}={}; Path=/; HttpOnly; SameSite=Lax",
            self.sign(id)
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// `Cookie` ヘッダー群から指定名の値を探す。
fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

/// リクエストに紐付いたセッション。ハンドラーは `Extension<Session>` で受け取る。
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
}

/// セッション解決ミドルウェア。
///
/// 有効なCookieがなければ新しいIDを発行し、レスポンスに `Set-Cookie` を付与する。
pub async fn session_layer(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let existing = cookie_value(request.headers(), SESSION_COOKIE_NAME)
        .and_then(|value| state.cookie_signer.verify(value));
    let (id, is_new) = match existing {
        Some(id) => (id, false),
        None => (SessionId::generate(), true),
    };

    request.extensions_mut().insert(Session { id: id.clone() });
    let mut response = next.run(request).await;

    if is_new {
        match HeaderValue::from_str(&state.cookie_signer.set_cookie_value(&id)) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => tracing::error!(error = %e, "Set-Cookieヘッダーの構築に失敗"),
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> CookieSigner {
        CookieSigner::new(b"test-secret-key", false).unwrap()
    }

    #[test]
    fn test_session_id_format() {
        let id = SessionId::generate();
        assert_eq!(id.as_str().len(), 32);
        assert!(SessionId::parse(id.as_str()).is_some());
        assert_ne!(id, SessionId::generate());
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = signer();
        let id = SessionId::generate();
        let value = signer.sign(&id);
        assert_eq!(signer.verify(&value), Some(id));
    }

    /// 改ざん・別鍵・形式不正のCookieが拒否されること
    #[test]
    fn test_verify_rejects_tampered_values() {
        let signer = signer();
        let id = SessionId::generate();
        let value = signer.sign(&id);

        let other_id = SessionId::generate();
        let (_, sig) = value.split_once('.').unwrap();
        assert!(signer.verify(&format!("{other_id}.{sig}")).is_none());

        let other_signer = CookieSigner::new(b"another-secret", false).unwrap();
        assert!(other_signer.verify(&value).is_none());

        assert!(signer.verify(id.as_str()).is_none());
        assert!(signer.verify("not-hex.zz").is_none());
        assert!(signer.verify("").is_none());
    }

    #[test]
    fn test_set_cookie_attributes() {
        let id = SessionId::generate();
        let plain = signer().set_cookie_value(&id);
        assert!(plain.starts_with("lexdesk_session="));
        assert!(plain.contains("HttpOnly"));
        assert!(!plain.contains("Secure"));

        let secure = CookieSigner::new(b"k", true).unwrap().set_cookie_value(&id);
        assert!(secure.ends_with("; Secure"));
    }

    #[test]
    fn test_cookie_value_lookup() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark; lexdesk_session=abc.def"));
        headers.append(COOKIE, HeaderValue::from_static("other=1"));
        assert_eq!(cookie_value(&headers, SESSION_COOKIE_NAME), Some("abc.def"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[tokio::test]
    async fn test_resolve_without_binding() {
        let store = SessionStore::new();
        let id = SessionId::generate();
        assert!(matches!(
            store.resolve_current(&id).await,
            Err(SessionError::NoCurrentFile)
        ));
        assert_eq!(store.len().await, 0);
    }

    /// 同一セッションへの2回目の紐付けで1回目が見えなくなること
    #[tokio::test]
    async fn test_bind_is_last_write_wins() {
        let store = SessionStore::new();
        let id = SessionId::generate();
        let first = StorageKey::generate("first.pdf");
        let second = StorageKey::generate("second.pdf");

        assert_eq!(store.bind_current(&id, first.clone()).await, None);
        assert_eq!(store.bind_current(&id, second.clone()).await, Some(first));
        assert_eq!(store.resolve_current(&id).await.unwrap(), second);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SessionStore::new();
        let alice = SessionId::generate();
        let bob = SessionId::generate();
        let key = StorageKey::generate("alice.pdf");

        store.bind_current(&alice, key.clone()).await;
        assert_eq!(store.resolve_current(&alice).await.unwrap(), key);
        assert!(store.resolve_current(&bob).await.is_err());
    }

    #[tokio::test]
    async fn test_purge_idle() {
        let store = SessionStore::new();
        store
            .bind_current(&SessionId::generate(), StorageKey::generate("a.pdf"))
            .await;
        assert_eq!(store.purge_idle(Duration::from_secs(3600)).await, 0);
        assert_eq!(store.purge_idle(Duration::ZERO).await, 1);
        assert_eq!(store.len().await, 0);
    }
}
