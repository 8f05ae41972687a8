use crate::config::{UnderwritingConfig, DEFAULT_MODEL};
use crate::error::{Result, UnderwritingError};
use crate::llm::types::*;
use crate::llm::TextGenerator;
use async_trait::async_trait;
use log::{debug, info};
use reqwest::Client;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn from_config(config: &UnderwritingConfig) -> Self {
        Self::new(config.api_key.clone()).with_model(config.model.clone())
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn build_request(&self, prompt: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::user(prompt)],
        }
    }

    pub async fn generate_content(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let payload = self.build_request(prompt);
        debug!(
            "Sending {} prompt characters to model {}",
            prompt.len(),
            self.model
        );

        let res = self.client.post(&url).json(&payload).send().await?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text().await?;
            return Err(UnderwritingError::GenerationFailed(format!(
                "Gemini API Error (status {}): {}",
                status, err_text
            )));
        }

        let body: GenerateContentResponse = res.json().await?;
        let text = extract_text(body)?;

        info!("Model {} returned {} characters", self.model, text.len());
        Ok(text)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_content(prompt).await
    }
}

fn extract_text(body: GenerateContentResponse) -> Result<String> {
    let candidate = body
        .candidates
        .ok_or_else(|| UnderwritingError::GenerationFailed("No candidates returned".to_string()))?
        .into_iter()
        .next()
        .ok_or_else(|| UnderwritingError::GenerationFailed("Empty candidates list".to_string()))?;

    let content = candidate.content.ok_or_else(|| {
        UnderwritingError::GenerationFailed(format!(
            "Candidate has no content (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        ))
    })?;

    let text: String = content
        .parts
        .into_iter()
        .filter_map(|part| match part {
            Part::Text { text } => Some(text),
            Part::Other(_) => None,
        })
        .collect();

    if text.is_empty() {
        return Err(UnderwritingError::GenerationFailed(
            "Model returned non-text content".to_string(),
        ));
    }

    Ok(text)
}
