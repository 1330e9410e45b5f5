//! テンプレート照合
//!
//! AIモード: カテゴリで絞り込んだ候補（最大 max_templates 件）をモデルに渡し、
//! 優先度順に min(3, 候補数) 件選ばせる。timeout_seconds で打ち切る。
//! 無効・失敗・タイムアウト時はスコアリングで上位3件を選ぶ
//! （fallback_on_failure が false なら失敗を返す）。

use crate::analyzer::{ModelGateway, ModelRequest};
use crate::config::TemplateMatchingConfig;
use crate::error::{HairAiError, Result, Stage};
use hair_ai_common::prompts::{format_analysis_info, format_templates};
use hair_ai_common::{
    parse_template_response, rank_templates, AnalysisResult, AttributeResult, MatchDecision,
    MatchMode, PromptTemplate, Slot, TemplateCandidate, TemplateCatalog, TemplateMatch,
    TOP_TEMPLATES,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct TemplateMatcher {
    gateway: Arc<ModelGateway>,
    prompt: PromptTemplate,
    catalog: Arc<TemplateCatalog>,
    settings: TemplateMatchingConfig,
}

impl TemplateMatcher {
    pub fn new(
        gateway: Arc<ModelGateway>,
        prompt: PromptTemplate,
        catalog: Arc<TemplateCatalog>,
        settings: TemplateMatchingConfig,
    ) -> Self {
        Self {
            gateway,
            prompt,
            catalog,
            settings,
        }
    }

    /// カタログが空なら Ok(None)
    pub async fn match_templates(
        &self,
        analysis: &AnalysisResult,
        attributes: Option<&AttributeResult>,
    ) -> Result<Option<TemplateMatch>> {
        if self.catalog.is_empty() {
            return Ok(None);
        }
        if !self.settings.enabled {
            return Ok(Some(self.score(analysis, attributes)));
        }

        let ai_result = tokio::time::timeout(
            self.settings.timeout(),
            self.match_with_ai(analysis, attributes),
        )
        .await
        .unwrap_or_else(|_| {
            Err(HairAiError::ModelCall(format!(
                "タイムアウト（{}秒）",
                self.settings.timeout_seconds
            )))
        });

        match ai_result {
            Ok(decisions) => Ok(Some(TemplateMatch {
                mode: MatchMode::Ai,
                decisions,
            })),
            Err(e) if self.settings.fallback_on_failure => {
                warn!(error = %e, "AIテンプレート照合に失敗、スコアリングで選択します");
                Ok(Some(self.score(analysis, attributes)))
            }
            Err(e) => Err(HairAiError::terminal(Stage::Template, e)),
        }
    }

    /// モデルに渡す候補（絞り込みで空になったら全件）
    pub fn candidates(&self, category: &str) -> Vec<TemplateCandidate> {
        let mut list = if self.settings.use_category_filter {
            self.catalog.filter_by_category(category)
        } else {
            Vec::new()
        };
        if list.is_empty() {
            list = self.catalog.templates().iter().collect();
        }
        list.truncate(self.settings.max_templates);
        list.into_iter().cloned().collect()
    }

    async fn match_with_ai(
        &self,
        analysis: &AnalysisResult,
        attributes: Option<&AttributeResult>,
    ) -> Result<Vec<MatchDecision>> {
        let candidates = self.candidates(&analysis.category);
        let expected = candidates.len().min(TOP_TEMPLATES);
        let ids: Vec<u32> = candidates.iter().map(|t| t.id).collect();
        debug!(candidates = candidates.len(), expected, "AIテンプレート照合");

        let mut values = HashMap::new();
        values.insert(Slot::AnalysisInfo, format_analysis_info(analysis, attributes));
        values.insert(Slot::Templates, format_templates(&candidates));
        let prompt = self.prompt.render(&values)?;

        let text = self.gateway.invoke(&ModelRequest::text(prompt)).await?;
        let decisions = parse_template_response(&text, &ids, expected)?;
        Ok(decisions)
    }

    fn score(&self, analysis: &AnalysisResult, attributes: Option<&AttributeResult>) -> TemplateMatch {
        TemplateMatch {
            mode: MatchMode::Scoring,
            decisions: rank_templates(self.catalog.templates(), analysis, attributes),
        }
    }

    /// 前回のテンプレートIDを現在の候補内で引き直す
    /// （件数が合わない・候補外のIDがあればスコアリング）
    pub fn resolve_cached(
        &self,
        template_ids: &[u32],
        analysis: &AnalysisResult,
        attributes: Option<&AttributeResult>,
    ) -> Option<TemplateMatch> {
        if self.catalog.is_empty() {
            return None;
        }

        let candidates = self.candidates(&analysis.category);
        let expected = candidates.len().min(TOP_TEMPLATES);
        let all_present = template_ids
            .iter()
            .all(|id| candidates.iter().any(|t| t.id == *id));
        if template_ids.len() != expected || !all_present {
            return Some(self.score(analysis, attributes));
        }

        let decisions = template_ids
            .iter()
            .enumerate()
            .map(|(i, id)| MatchDecision {
                template_id: *id,
                rank: (i + 1) as u8,
                reason: "前回の選択を再利用".to_string(),
            })
            .collect();
        Some(TemplateMatch {
            mode: MatchMode::Cached,
            decisions,
        })
    }

    /// 照合結果の順にテンプレート本体を取り出す
    pub fn details(&self, matched: &TemplateMatch) -> Vec<TemplateCandidate> {
        matched
            .decisions
            .iter()
            .filter_map(|d| self.catalog.get(d.template_id).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{CallError, ModelBackend, RateLimiter, RetryPolicy};
    use async_trait::async_trait;
    use hair_ai_common::prompts::DEFAULT_TEMPLATE_MATCH_PROMPT;
    use hair_ai_common::PromptKind;
    use std::time::Duration;

    struct Unreachable;

    #[async_trait]
    impl ModelBackend for Unreachable {
        async fn generate(&self, _model: &str, _request: &ModelRequest) -> std::result::Result<String, CallError> {
            Err(CallError::Network("offline".into()))
        }
    }

    /// 応答が timeout_seconds より遅いバックエンド
    struct Slow;

    #[async_trait]
    impl ModelBackend for Slow {
        async fn generate(&self, _model: &str, _request: &ModelRequest) -> std::result::Result<String, CallError> {
            tokio::time::sleep(Duration::from_secs(120)).await;
            Ok(r#"{"selections": [{"template_id": 1, "reason": "遅延"}]}"#.into())
        }
    }

    fn matcher(settings: TemplateMatchingConfig) -> TemplateMatcher {
        matcher_with(Arc::new(Unreachable), settings)
    }

    fn matcher_with(backend: Arc<dyn ModelBackend>, settings: TemplateMatchingConfig) -> TemplateMatcher {
        let gateway = ModelGateway::new(
            backend,
            "primary",
            "fallback",
            RetryPolicy::new(1, Duration::ZERO),
            Arc::new(RateLimiter::new(Duration::ZERO)),
        );
        let catalog = TemplateCatalog::from_csv_str(
            "category,title,menu,comment,hashtag\n\
             ボブ,ボブA,カット,,\n\
             ボブ,ボブB,カット,,\n\
             ショート,ショートA,カット,,\n",
        )
        .unwrap();
        TemplateMatcher::new(
            Arc::new(gateway),
            PromptTemplate::new(PromptKind::TemplateMatch, DEFAULT_TEMPLATE_MATCH_PROMPT).unwrap(),
            Arc::new(catalog),
            settings,
        )
    }

    fn analysis(category: &str) -> AnalysisResult {
        AnalysisResult {
            category: category.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_candidates_filtered_by_category() {
        let m = matcher(TemplateMatchingConfig::default());
        let ids: Vec<u32> = m.candidates("ボブ").iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_empty_filter_uses_full_catalog() {
        let m = matcher(TemplateMatchingConfig::default());
        assert_eq!(m.candidates("パーマ").len(), 3);
    }

    #[test]
    fn test_candidates_capped() {
        let m = matcher(TemplateMatchingConfig {
            max_templates: 2,
            use_category_filter: false,
            ..Default::default()
        });
        let ids: Vec<u32> = m.candidates("ボブ").iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_unreachable_model_falls_back_to_scoring() {
        let m = matcher(TemplateMatchingConfig::default());
        let matched = m.match_templates(&analysis("ショート"), None).await.unwrap().unwrap();
        assert_eq!(matched.mode, MatchMode::Scoring);
        assert_eq!(matched.decisions[0].template_id, 3);
    }

    #[tokio::test]
    async fn test_unreachable_model_without_fallback_fails() {
        let m = matcher(TemplateMatchingConfig {
            fallback_on_failure: false,
            ..Default::default()
        });
        let result = m.match_templates(&analysis("ショート"), None).await;
        assert!(matches!(
            result,
            Err(HairAiError::TerminalStage { stage: Stage::Template, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_back_to_scoring() {
        let m = matcher_with(
            Arc::new(Slow),
            TemplateMatchingConfig {
                timeout_seconds: 5,
                ..Default::default()
            },
        );
        let matched = m.match_templates(&analysis("ショート"), None).await.unwrap().unwrap();
        assert_eq!(matched.mode, MatchMode::Scoring);
        assert_eq!(matched.decisions[0].template_id, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_without_fallback_fails() {
        let m = matcher_with(
            Arc::new(Slow),
            TemplateMatchingConfig {
                timeout_seconds: 5,
                fallback_on_failure: false,
                ..Default::default()
            },
        );
        let result = m.match_templates(&analysis("ショート"), None).await;
        assert!(matches!(
            result,
            Err(HairAiError::TerminalStage { stage: Stage::Template, .. })
        ));
    }

    #[test]
    fn test_cached_ids_missing_from_catalog_rescored() {
        let m = matcher(TemplateMatchingConfig::default());
        let resolved = m.resolve_cached(&[1, 99], &analysis("ボブ"), None).unwrap();
        assert_eq!(resolved.mode, MatchMode::Scoring);

        let resolved = m.resolve_cached(&[2, 1], &analysis("ボブ"), None).unwrap();
        assert_eq!(resolved.mode, MatchMode::Cached);
        assert_eq!(m.details(&resolved)[0].title, "ボブB");
    }

    #[test]
    fn test_cached_ids_outside_candidates_rescored() {
        let m = matcher(TemplateMatchingConfig::default());
        // ショートAはボブの候補に含まれない
        let resolved = m.resolve_cached(&[3, 1], &analysis("ボブ"), None).unwrap();
        assert_eq!(resolved.mode, MatchMode::Scoring);
    }
}
