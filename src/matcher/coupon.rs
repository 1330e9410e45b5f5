use crate::analyzer::{invoke_with_validation, ModelGateway, ModelRequest};
use hair_ai_common::prompts::{feature_slots, format_coupons};
use hair_ai_common::{parse_coupon_response, AnalysisResult, CouponChoice, CouponOption, PromptTemplate, Slot};
use std::sync::Arc;
use tracing::warn;

/// 番号付きクーポン一覧から1つ選ぶ
///
/// 失敗したら1番をデフォルトとして返す。
pub struct CouponSelector {
    gateway: Arc<ModelGateway>,
    prompt: PromptTemplate,
    coupons: Arc<Vec<CouponOption>>,
}

impl CouponSelector {
    pub fn new(gateway: Arc<ModelGateway>, prompt: PromptTemplate, coupons: Arc<Vec<CouponOption>>) -> Self {
        Self {
            gateway,
            prompt,
            coupons,
        }
    }

    pub async fn select(&self, analysis: &AnalysisResult) -> Option<CouponChoice> {
        if self.coupons.is_empty() {
            return None;
        }

        let mut values = feature_slots(analysis);
        values.insert(Slot::Coupons, format_coupons(&self.coupons));
        values.insert(Slot::CouponCount, self.coupons.len().to_string());
        let prompt = match self.prompt.render(&values) {
            Ok(p) => p,
            Err(e) => return self.default_choice(&e.to_string()),
        };

        let request = ModelRequest::text(prompt);
        let result = invoke_with_validation(&self.gateway, &request, "coupon", |text| {
            parse_coupon_response(text, &self.coupons)
        })
        .await;

        match result {
            Ok((ordinal, reason)) => self.choice(ordinal, reason, false),
            Err(e) => {
                warn!(error = %e, "クーポン選択に失敗、1番のクーポンを使用します");
                self.default_choice(&e.to_string())
            }
        }
    }

    /// 前回のクーポン名から現在の番号を引き直す
    pub fn resolve_cached(&self, name: Option<&str>) -> Option<CouponChoice> {
        let position = name.and_then(|name| self.coupons.iter().position(|c| c.name == name));
        match position {
            Some(index) => self.choice(index + 1, "前回の選択を再利用".to_string(), false),
            None => self.default_choice("前回のクーポンがカタログにありません"),
        }
    }

    fn choice(&self, ordinal: usize, reason: String, is_default: bool) -> Option<CouponChoice> {
        let coupon = self.coupons.get(ordinal.checked_sub(1)?)?;
        Some(CouponChoice {
            ordinal,
            coupon: coupon.clone(),
            reason,
            is_default,
        })
    }

    fn default_choice(&self, cause: &str) -> Option<CouponChoice> {
        self.choice(1, format!("デフォルト（{}）", cause), true)
    }
}
