use super::{invoke_with_validation, ModelGateway, ModelRequest};
use crate::error::{HairAiError, Result, Stage};
use crate::scanner::ImageHandle;
use hair_ai_common::{parse_analysis_response, AnalysisResult, PromptTemplate, Slot};
use std::collections::HashMap;
use std::sync::Arc;

/// 画像からカテゴリ・4特徴・キーワードを抽出
pub struct FeatureExtractor {
    gateway: Arc<ModelGateway>,
    prompt: PromptTemplate,
    categories: Vec<String>,
}

impl FeatureExtractor {
    pub fn new(gateway: Arc<ModelGateway>, prompt: PromptTemplate, categories: Vec<String>) -> Self {
        Self {
            gateway,
            prompt,
            categories,
        }
    }

    pub async fn extract(&self, image: &ImageHandle) -> Result<AnalysisResult> {
        let categories = self
            .categories
            .iter()
            .map(|c| format!("- {}", c))
            .collect::<Vec<_>>()
            .join("\n");
        let mut values = HashMap::new();
        values.insert(Slot::Categories, categories);
        let prompt = self.prompt.render(&values)?;

        let request = ModelRequest::with_image(prompt, image.mime_type, image.content.clone());
        invoke_with_validation(&self.gateway, &request, "features", |text| {
            parse_analysis_response(text, &self.categories)
        })
        .await
        .map_err(|e| HairAiError::terminal(Stage::Features, e))
    }
}
