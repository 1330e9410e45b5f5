pub mod attributes;
pub mod backend;
pub mod cache;
pub mod features;
pub mod gateway;
pub mod gemini;
pub mod retry;

pub use attributes::AttributeClassifier;
pub use backend::{CallError, InlineImage, ModelBackend, ModelRequest};
pub use cache::{content_key, CacheEntry, CacheStore, CachedSelection};
pub use features::FeatureExtractor;
pub use gateway::{GatewayError, ModelGateway, RateLimiter};
pub use gemini::GeminiClient;
pub use retry::RetryPolicy;

use crate::error::{HairAiError, Result};
use tracing::warn;

/// 検証エラー時に同じリクエストを出し直す回数（初回を含む）
const VALIDATION_ATTEMPTS: u32 = 2;

/// ゲートウェイを呼び出し、`parse` が通るまで1回だけ出し直す
///
/// ゲートウェイの失敗は `ModelCall`、2回とも検証に失敗したら `Validation`。
/// モデル出力の不備以外のエラーは出し直さずにそのまま返す。
pub(crate) async fn invoke_with_validation<T, F>(
    gateway: &ModelGateway,
    request: &ModelRequest,
    label: &str,
    parse: F,
) -> Result<T>
where
    F: Fn(&str) -> hair_ai_common::Result<T>,
{
    let mut last_error = String::new();

    for attempt in 0..VALIDATION_ATTEMPTS {
        let text = gateway.invoke(request).await?;
        match parse(&text) {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_model_output_error() => return Err(e.into()),
            Err(e) => {
                warn!(stage = label, attempt, error = %e, "モデル出力の検証に失敗しました");
                last_error = e.to_string();
            }
        }
    }

    Err(HairAiError::Validation(last_error))
}
