use super::{invoke_with_validation, ModelGateway, ModelRequest};
use crate::error::{HairAiError, Result, Stage};
use crate::scanner::ImageHandle;
use hair_ai_common::{parse_attribute_response, AttributeResult, PromptTemplate, Slot};
use std::collections::HashMap;
use std::sync::Arc;

/// 画像から性別・長さを判定
pub struct AttributeClassifier {
    gateway: Arc<ModelGateway>,
    prompt: PromptTemplate,
    length_choices: Vec<String>,
}

impl AttributeClassifier {
    pub fn new(gateway: Arc<ModelGateway>, prompt: PromptTemplate, length_choices: Vec<String>) -> Self {
        Self {
            gateway,
            prompt,
            length_choices,
        }
    }

    pub async fn classify(&self, image: &ImageHandle) -> Result<AttributeResult> {
        let mut values = HashMap::new();
        values.insert(Slot::LengthChoices, self.length_choices.join(", "));
        let prompt = self.prompt.render(&values)?;

        let request = ModelRequest::with_image(prompt, image.mime_type, image.content.clone());
        invoke_with_validation(&self.gateway, &request, "attributes", |text| {
            parse_attribute_response(text, &self.length_choices)
        })
        .await
        .map_err(|e| HairAiError::terminal(Stage::Attributes, e))
    }
}
