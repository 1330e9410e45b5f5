//! モデルゲートウェイ
//!
//! 主モデルを RetryPolicy の範囲で呼び出し、切り替え可能なエラーで終わったら
//! 予備モデルへ1度だけ切り替える（予備モデルにも同じ試行回数を与える）。
//! 送信前には必ず RateLimiter で api_delay の間隔を空ける。

use super::backend::{CallError, ModelBackend, ModelRequest};
use super::retry::RetryPolicy;
use crate::config::Config;
use crate::error::HairAiError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// 全タスク共通の送信間隔
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_call: Mutex::new(None),
        }
    }

    /// 前回の送信から interval 経つまで待つ
    pub async fn wait(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.interval {
                tokio::time::sleep(self.interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// ゲートウェイの失敗（呼び出し側に返すのはこれだけ）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// 切り替え対象外のエラーで終了
    #[error("{model} の呼び出しに失敗: {cause}")]
    Failed { model: String, cause: String },

    /// 主・予備モデルとも失敗
    #[error("主モデル・予備モデルとも失敗 ({primary}: {primary_cause} / {fallback}: {fallback_cause})")]
    Exhausted {
        primary: String,
        primary_cause: String,
        fallback: String,
        fallback_cause: String,
    },
}

impl From<GatewayError> for HairAiError {
    fn from(err: GatewayError) -> Self {
        HairAiError::ModelCall(err.to_string())
    }
}

pub struct ModelGateway {
    backend: Arc<dyn ModelBackend>,
    primary_model: String,
    fallback_model: String,
    retry: RetryPolicy,
    limiter: Arc<RateLimiter>,
}

impl ModelGateway {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        primary_model: impl Into<String>,
        fallback_model: impl Into<String>,
        retry: RetryPolicy,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            backend,
            primary_model: primary_model.into(),
            fallback_model: fallback_model.into(),
            retry,
            limiter,
        }
    }

    pub fn from_config(backend: Arc<dyn ModelBackend>, config: &Config) -> Self {
        Self::new(
            backend,
            config.gemini.model.clone(),
            config.gemini.fallback_model.clone(),
            RetryPolicy::from_config(&config.processing),
            Arc::new(RateLimiter::new(config.processing.api_delay())),
        )
    }

    pub async fn invoke(&self, request: &ModelRequest) -> Result<String, GatewayError> {
        let primary_err = match self.call_model(&self.primary_model, request).await {
            Ok(text) => return Ok(text),
            Err(e) => e,
        };

        if !primary_err.is_escalation_eligible() {
            return Err(GatewayError::Failed {
                model: self.primary_model.clone(),
                cause: primary_err.to_string(),
            });
        }

        warn!(
            primary = %self.primary_model,
            fallback = %self.fallback_model,
            error = %primary_err,
            "予備モデルに切り替えます"
        );

        self.call_model(&self.fallback_model, request)
            .await
            .map_err(|fallback_err| GatewayError::Exhausted {
                primary: self.primary_model.clone(),
                primary_cause: primary_err.to_string(),
                fallback: self.fallback_model.clone(),
                fallback_cause: fallback_err.to_string(),
            })
    }

    async fn call_model(&self, model: &str, request: &ModelRequest) -> Result<String, CallError> {
        self.retry
            .execute(
                |attempt| self.call_once(model, request, attempt),
                CallError::is_transient,
            )
            .await
    }

    async fn call_once(&self, model: &str, request: &ModelRequest, attempt: u32) -> Result<String, CallError> {
        self.limiter.wait().await;
        debug!(model, attempt, "モデル呼び出し");
        self.backend.generate(model, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// モデル名ごとに同じ結果を返し続けるバックエンド
    struct FixedBackend {
        primary: Result<String, CallError>,
        fallback: Result<String, CallError>,
        calls: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl ModelBackend for FixedBackend {
        async fn generate(&self, model: &str, _request: &ModelRequest) -> Result<String, CallError> {
            self.calls.lock().unwrap().push(model.to_string());
            if model == "primary" {
                self.primary.clone()
            } else {
                self.fallback.clone()
            }
        }
    }

    fn gateway(backend: Arc<FixedBackend>, attempts: u32) -> ModelGateway {
        ModelGateway::new(
            backend,
            "primary",
            "fallback",
            RetryPolicy::new(attempts, Duration::ZERO),
            Arc::new(RateLimiter::new(Duration::ZERO)),
        )
    }

    fn count(backend: &FixedBackend, model: &str) -> usize {
        backend.calls.lock().unwrap().iter().filter(|m| *m == model).count()
    }

    #[tokio::test]
    async fn test_escalates_after_primary_exhausted() {
        let backend = Arc::new(FixedBackend {
            primary: Err(CallError::Server { status: 503, message: "overloaded".into() }),
            fallback: Ok("{}".into()),
            calls: StdMutex::new(Vec::new()),
        });

        let result = gateway(backend.clone(), 3).invoke(&ModelRequest::text("p")).await;

        assert_eq!(result, Ok("{}".to_string()));
        assert_eq!(count(&backend, "primary"), 3);
        assert_eq!(count(&backend, "fallback"), 1);
    }

    #[tokio::test]
    async fn test_fallback_exhausts_its_own_budget() {
        let backend = Arc::new(FixedBackend {
            primary: Err(CallError::Network("reset".into())),
            fallback: Err(CallError::Server { status: 500, message: "internal".into() }),
            calls: StdMutex::new(Vec::new()),
        });

        let result = gateway(backend.clone(), 3).invoke(&ModelRequest::text("p")).await;

        assert!(matches!(result, Err(GatewayError::Exhausted { .. })));
        assert_eq!(count(&backend, "primary"), 3);
        assert_eq!(count(&backend, "fallback"), 3);
    }

    /// 予備モデルの一時エラーは予備モデル内で再試行される
    struct FlakyFallback {
        calls: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl ModelBackend for FlakyFallback {
        async fn generate(&self, model: &str, _request: &ModelRequest) -> Result<String, CallError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(model.to_string());
            if model == "primary" {
                return Err(CallError::Server { status: 503, message: "overloaded".into() });
            }
            if calls.iter().filter(|m| *m == "fallback").count() == 1 {
                Err(CallError::Server { status: 503, message: "blip".into() })
            } else {
                Ok("{}".into())
            }
        }
    }

    #[tokio::test]
    async fn test_fallback_retries_transient_error() {
        let backend = Arc::new(FlakyFallback {
            calls: StdMutex::new(Vec::new()),
        });
        let gateway = ModelGateway::new(
            backend.clone(),
            "primary",
            "fallback",
            RetryPolicy::new(3, Duration::ZERO),
            Arc::new(RateLimiter::new(Duration::ZERO)),
        );

        let result = gateway.invoke(&ModelRequest::text("p")).await;

        assert_eq!(result, Ok("{}".to_string()));
        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.iter().filter(|m| *m == "primary").count(), 3);
        assert_eq!(calls.iter().filter(|m| *m == "fallback").count(), 2);
    }

    #[tokio::test]
    async fn test_rejected_does_not_escalate() {
        let backend = Arc::new(FixedBackend {
            primary: Err(CallError::Rejected { status: 401, message: "bad key".into() }),
            fallback: Ok("{}".into()),
            calls: StdMutex::new(Vec::new()),
        });

        let result = gateway(backend.clone(), 3).invoke(&ModelRequest::text("p")).await;

        assert!(matches!(result, Err(GatewayError::Failed { .. })));
        assert_eq!(count(&backend, "primary"), 1);
        assert_eq!(count(&backend, "fallback"), 0);
    }

    #[tokio::test]
    async fn test_quota_escalates_without_retry() {
        let backend = Arc::new(FixedBackend {
            primary: Err(CallError::QuotaExhausted("quota".into())),
            fallback: Err(CallError::Timeout),
            calls: StdMutex::new(Vec::new()),
        });

        let result = gateway(backend.clone(), 2).invoke(&ModelRequest::text("p")).await;

        assert!(matches!(result, Err(GatewayError::Exhausted { .. })));
        assert_eq!(count(&backend, "primary"), 1);
        assert_eq!(count(&backend, "fallback"), 2);
    }

    #[tokio::test]
    async fn test_rate_limiter_spaces_calls() {
        let limiter = RateLimiter::new(Duration::from_millis(50));
        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
