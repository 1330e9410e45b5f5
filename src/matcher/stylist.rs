use crate::analyzer::{invoke_with_validation, ModelGateway, ModelRequest};
use hair_ai_common::prompts::{feature_slots, format_stylists};
use hair_ai_common::{
    parse_stylist_response, AnalysisResult, PromptTemplate, Slot, StylistChoice, StylistProfile,
};
use std::sync::Arc;
use tracing::warn;

/// スタイル解析結果に合うスタイリストを選ぶ
///
/// 失敗したら先頭のスタイリストをデフォルトとして返す（is_default = true）。
pub struct StylistSelector {
    gateway: Arc<ModelGateway>,
    prompt: PromptTemplate,
    stylists: Arc<Vec<StylistProfile>>,
}

impl StylistSelector {
    pub fn new(gateway: Arc<ModelGateway>, prompt: PromptTemplate, stylists: Arc<Vec<StylistProfile>>) -> Self {
        Self {
            gateway,
            prompt,
            stylists,
        }
    }

    /// カタログが空なら呼び出さずに None
    pub async fn select(&self, analysis: &AnalysisResult) -> Option<StylistChoice> {
        if self.stylists.is_empty() {
            return None;
        }

        let mut values = feature_slots(analysis);
        values.insert(Slot::Stylists, format_stylists(&self.stylists));
        let prompt = match self.prompt.render(&values) {
            Ok(p) => p,
            Err(e) => return self.default_choice(&e.to_string()),
        };

        let request = ModelRequest::text(prompt);
        let result = invoke_with_validation(&self.gateway, &request, "stylist", |text| {
            parse_stylist_response(text, &self.stylists)
        })
        .await;

        match result {
            Ok((index, reason)) => Some(StylistChoice {
                stylist: self.stylists[index].clone(),
                reason,
                is_default: false,
            }),
            Err(e) => {
                warn!(error = %e, "スタイリスト選択に失敗、先頭のスタイリストを使用します");
                self.default_choice(&e.to_string())
            }
        }
    }

    /// 前回選んだ名前で引き直す（見つからなければデフォルト）
    pub fn resolve_cached(&self, name: Option<&str>) -> Option<StylistChoice> {
        let found = name.and_then(|name| self.stylists.iter().find(|s| s.name == name));
        match found {
            Some(stylist) => Some(StylistChoice {
                stylist: stylist.clone(),
                reason: "前回の選択を再利用".to_string(),
                is_default: false,
            }),
            None => self.default_choice("前回のスタイリストがカタログにありません"),
        }
    }

    fn default_choice(&self, cause: &str) -> Option<StylistChoice> {
        self.stylists.first().map(|stylist| StylistChoice {
            stylist: stylist.clone(),
            reason: format!("デフォルト（{}）", cause),
            is_default: true,
        })
    }
}
