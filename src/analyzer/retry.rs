//! 一時的なエラーに対する再試行

use crate::config::ProcessingConfig;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// 試行回数の上限と試行間の待機
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 初回を含む試行回数（1以上）
    max_attempts: u32,
    retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            retry_delay,
        }
    }

    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// `op` を実行し、`is_transient` が真のエラーだけ再試行する
    ///
    /// 一時的でないエラーは即座に返す。上限に達したら最後のエラーを返す。
    /// `op` には0始まりの試行番号が渡される。
    pub async fn execute<T, E, F, Fut, P>(&self, mut op: F, is_transient: P) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempt, "再試行で成功しました");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let last = attempt + 1 >= self.max_attempts;
                    if !is_transient(&err) || last {
                        return Err(err);
                    }
                    warn!(
                        attempt,
                        delay_ms = self.retry_delay.as_millis() as u64,
                        error = %err,
                        "一時的なエラーのため再試行します"
                    );
                    if !self.retry_delay.is_zero() {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}
