use base64::{engine::general_purpose, Engine as _};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::config::VisionConfig;
use crate::error::RecognitionError;

const PROMPT: &str = "You are helping a pawn shop catalogue an item from a photo. \
Reply with a single JSON object with the keys name, category, brand, model, condition, \
description and estimated_value (a number in the shop's currency, or null). \
Use null for anything you cannot tell from the photo.";

/// 识别出的商品建议, 所有字段均可为空
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductSuggestion {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub estimated_value: Option<BigDecimal>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// 商品图片识别 (OpenAI 兼容的 chat completions 接口)
pub struct RecognitionService {
    client: reqwest::Client,
    config: VisionConfig,
}

impl RecognitionService {
    pub fn new(config: VisionConfig) -> Result<Self, RecognitionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    /// 上传图片, 返回商品建议
    pub async fn recognize(&self, image: &[u8], mime_type: &str) -> Result<ProductSuggestion, RecognitionError> {
        let api_key = match self.config.api_key.as_deref() {
            Some(k) if !k.trim().is_empty() => k,
            _ => return Err(RecognitionError::NotConfigured),
        };

        let url = format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'));
        let body = build_request(&self.config.model, image, mime_type);

        tracing::info!("Vision request: {} bytes of {} to {}", image.len(), mime_type, url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Vision API returned {}: {}", status, body);
            return Err(RecognitionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletion = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RecognitionError::InvalidResponse("response has no message content".to_string()))?;

        parse_suggestion(&content)
    }
}

fn build_request(model: &str, image: &[u8], mime_type: &str) -> serde_json::Value {
    let data_url = format!("data:{};base64,{}", mime_type, general_purpose::STANDARD.encode(image));
    json!({
        "model": model,
        "response_format": { "type": "json_object" },
        "messages": [
            { "role": "system", "content": PROMPT },
            {
                "role": "user",
                "content": [
                    { "type": "text", "text": "Identify this item." },
                    { "type": "image_url", "image_url": { "url": data_url } }
                ]
            }
        ]
    })
}

/// 解析模型回复, 兼容 ```json 代码块包裹
pub fn parse_suggestion(content: &str) -> Result<ProductSuggestion, RecognitionError> {
    let trimmed = content.trim();
    let json_text = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str(json_text).map_err(|e| RecognitionError::InvalidResponse(e.to_string()))
}
