use crate::config::Settings;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("HTTP error: {0}")] Http(String),
    #[error("API error: status={status} body={body}")] Status { status: u16, body: String },
    #[error("parse error: {0}")] Parse(String),
    #[error("model returned no content")] Empty,
}

/// Shortens long upstream bodies for log lines.
pub fn preview(text: &str, max: usize) -> String {
    let total = text.chars().count();
    if total <= max {
        text.to_string()
    } else {
        let head: String = text.chars().take(max).collect();
        format!("{head}...[{total} chars total]")
    }
}

pub struct ChatClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

impl ChatClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: Client::new(),
            api_key: settings.hf_api_key.clone(),
            base_url: settings.hf_api_base.trim_end_matches('/').to_string(),
            model: settings.chat_model.clone(),
            max_tokens: settings.chat_max_tokens,
        }
    }

    /// One non-streaming chat completion with a single user message.
    pub async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!("{}/models/{}/v1/chat/completions", self.base_url, self.model);
        info!("🔗 Chat completion request to: {}", url);

        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            max_tokens: self.max_tokens,
            stream: false,
        };

        let response = self.client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationError::Http(e.to_string()))?;

        let status = response.status();
        let response_text = response.text().await.map_err(|e| GenerationError::Http(e.to_string()))?;
        info!("📥 Response status: {}", status);

        if !status.is_success() {
            error!("❌ Chat completion failed with status {}: {}", status, preview(&response_text, 500));
            return Err(GenerationError::Status { status: status.as_u16(), body: response_text });
        }

        let parsed: ChatResponse = serde_json::from_str(&response_text)
            .map_err(|e| GenerationError::Parse(format!("{}: {}", e, preview(&response_text, 200))))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(GenerationError::Empty)
    }

    /// Asks the model for a four-section dish concept themed on an anime.
    pub async fn generate_dish(&self, anime_name: &str, dish_type: &str) -> Result<String, GenerationError> {
        let prompt = build_dish_prompt(anime_name, dish_type);
        info!("🍜 Generating '{}' dish inspired by '{}'", dish_type, anime_name);
        match self.complete(&prompt).await {
            Ok(description) => {
                info!("✅ Dish description generated ({} chars)", description.len());
                Ok(description)
            }
            Err(e) => {
                error!("❌ Dish generation failed: {}", e);
                Err(e)
            }
        }
    }
}

pub fn build_dish_prompt(anime_name: &str, dish_type: &str) -> String {
    format!(
        "Create a unique food dish inspired by the anime '{anime_name}'. \
        It should be a '{dish_type}' dish. \
        Include the following details in a clear enumeration structure: \
        1. **Dish Name**: Provide a catchy name for the dish. \
        2. **Ingredients**: List all key ingredients with specific quantities in grams and only in grams. \
        3. **Preparation Steps**: Outline the cooking process in concise steps. \
        4. **Cultural Significance**: Explain how the dish reflects the themes or characters of the anime, \
        highlighting any specific scenes or elements that inspired it. \
        Ensure the description is no longer than 500 characters."
    )
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice { #[serde(default)] message: Message }

#[derive(Debug, Deserialize, Default)]
struct Message { #[serde(default)] content: Option<String> }
