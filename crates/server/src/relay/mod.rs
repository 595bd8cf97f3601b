//! # クエリ中継
//!
//! 法律相談クエリに固定の指示文を前置し、外部のテキスト生成APIへ中継する。
//!
//! 外部APIの失敗理由はログにのみ記録し、呼び出し元には
//! 汎用の `UpstreamFailure` だけを返す。

pub mod gemini;

pub use gemini::GeminiGenerator;

use std::time::Duration;

/// プロンプトに前置する指示文。
pub const LEGAL_PROMPT_PREFIX: &str =
    "As an AI assistant specialized in Indian law, please provide a response to the following query: ";

/// 生成APIの呼び出しタイムアウトのデフォルト値。
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// クエリから生成APIへ送るプロンプトを組み立てる。
pub fn build_prompt(query: &str) -> String {
    format!("{LEGAL_PROMPT_PREFIX}{query}")
}

/// 外部生成APIのエラー型。ログ出力専用でクライアントには返さない。
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// HTTP送信・受信に失敗
    #[error("HTTP通信に失敗: {0}")]
    Transport(String),
    /// 非2xxレスポンス
    #[error("生成APIがエラーを返しました: HTTP {status} - {body}")]
    Status { status: u16, body: String },
    /// レスポンスボディが想定外の形式
    #[error("レスポンスのパースに失敗: {0}")]
    Malformed(String),
    /// 候補にテキストが含まれていない（ブロック等）
    #[error("生成結果にテキストが含まれていません")]
    Empty,
}

/// テキスト生成APIの抽象インターフェース。
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// プロンプトからテキストを生成する。
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// クエリ中継のエラー型。
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// クエリが未指定または空
    #[error("クエリが指定されていません")]
    EmptyQuery,
    /// 外部API呼び出しの失敗（詳細はログ参照）
    #[error("生成APIの呼び出しに失敗しました")]
    UpstreamFailure,
}

/// クエリ中継。内部状態は持たない。
pub struct QueryRelay {
    generator: Box<dyn TextGenerator>,
    timeout: Duration,
}

impl QueryRelay {
    pub fn new(generator: Box<dyn TextGenerator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    /// クエリを生成APIへ中継し、生成されたテキストを返す。
    ///
    /// 呼び出し元のリクエストが中断されると、このfutureごと破棄され
    /// 外部API呼び出しもキャンセルされる。
    pub async fn ask(&self, query: Option<&str>) -> Result<String, RelayError> {
        let query = match query {
            Some(q) if !q.is_empty() => q,
            _ => return Err(RelayError::EmptyQuery),
        };

        let prompt = build_prompt(query);
        match tokio::time::timeout(self.timeout, self.generator.generate(&prompt)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "生成APIの呼び出しに失敗");
                Err(RelayError::UpstreamFailure)
            }
            Err(_) => {
                tracing::error!(
                    timeout_secs = self.timeout.as_secs_f64(),
                    "生成APIの呼び出しがタイムアウトしました"
                );
                Err(RelayError::UpstreamFailure)
            }
        }
    }
}
