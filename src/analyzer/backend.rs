//! モデル呼び出しの抽象化
//!
//! ゲートウェイはこのトレイト越しにモデルを呼び出す。
//! 本番は GeminiClient、テストは台本どおりに応答するモックを使う。

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// リクエストに添付する画像
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Arc<Vec<u8>>,
}

/// 1回のモデル呼び出し
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub prompt: String,
    pub image: Option<InlineImage>,
}

impl ModelRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            image: None,
        }
    }

    pub fn with_image(prompt: impl Into<String>, mime_type: &str, data: Arc<Vec<u8>>) -> Self {
        Self {
            prompt: prompt.into(),
            image: Some(InlineImage {
                mime_type: mime_type.to_string(),
                data,
            }),
        }
    }
}

/// 呼び出し失敗の分類（ゲートウェイの外には出さない）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("レート制限: {0}")]
    RateLimited(String),

    #[error("利用上限に到達: {0}")]
    QuotaExhausted(String),

    #[error("サーバーエラー (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("通信エラー: {0}")]
    Network(String),

    #[error("タイムアウト")]
    Timeout,

    #[error("モデルが利用できません: {0}")]
    ModelUnavailable(String),

    #[error("リクエストが拒否されました (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("不正なレスポンス: {0}")]
    InvalidResponse(String),
}

impl CallError {
    /// 同じモデルで再試行してよいエラー
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CallError::RateLimited(_)
                | CallError::Server { .. }
                | CallError::Network(_)
                | CallError::Timeout
        )
    }

    /// 予備モデルへ切り替えてよいエラー
    pub fn is_escalation_eligible(&self) -> bool {
        self.is_transient()
            || matches!(self, CallError::QuotaExhausted(_) | CallError::ModelUnavailable(_))
    }

    /// HTTPステータスとレスポンス本文から分類
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = truncate(body, 200);
        match status {
            429 if body.to_lowercase().contains("quota") => CallError::QuotaExhausted(message),
            429 => CallError::RateLimited(message),
            404 => CallError::ModelUnavailable(message),
            408 => CallError::Timeout,
            500..=599 => CallError::Server { status, message },
            _ => CallError::Rejected { status, message },
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

/// モデル呼び出しの実装
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// `model` に `request` を送り、応答テキストを返す
    async fn generate(&self, model: &str, request: &ModelRequest) -> Result<String, CallError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(CallError::from_status(429, "slow down"), CallError::RateLimited("slow down".into()));
        assert!(matches!(
            CallError::from_status(429, "You exceeded your current quota"),
            CallError::QuotaExhausted(_)
        ));
        assert!(matches!(CallError::from_status(404, ""), CallError::ModelUnavailable(_)));
        assert!(matches!(CallError::from_status(503, ""), CallError::Server { status: 503, .. }));
        assert!(matches!(CallError::from_status(401, ""), CallError::Rejected { status: 401, .. }));
    }

    #[test]
    fn test_transient_and_escalation() {
        assert!(CallError::Timeout.is_transient());
        assert!(CallError::Network("reset".into()).is_escalation_eligible());

        let quota = CallError::QuotaExhausted("quota".into());
        assert!(!quota.is_transient());
        assert!(quota.is_escalation_eligible());

        let rejected = CallError::Rejected { status: 400, message: "bad".into() };
        assert!(!rejected.is_transient());
        assert!(!rejected.is_escalation_eligible());
        assert!(!CallError::InvalidResponse("empty".into()).is_escalation_eligible());
    }

    #[test]
    fn test_long_body_truncated() {
        let body = "x".repeat(500);
        match CallError::from_status(400, &body) {
            CallError::Rejected { message, .. } => assert_eq!(message.chars().count(), 203),
            other => panic!("Expected Rejected, got {:?}", other),
        }
    }
}
