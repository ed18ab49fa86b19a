use crate::{chat::preview, config::Settings, models::{GeneratedImage, IngredientMap, NutritionTotals, PublicationResult}};
use reqwest::{multipart, Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum PublicationError {
    #[error("Error uploading to Imgur: {0}")] Upload(String),
    #[error("Error uploading image: {0}")] Create(String),
    #[error("Error publishing image: {0}")] Publish(String),
}

pub fn build_caption(description: &str, ingredients: Option<&IngredientMap>, totals: &NutritionTotals) -> String {
    let mut caption = format!("Check out this delicious anime-inspired dish! 🍜✨ #AnimeFood #FoodArt\n\n{description}\n\n");
    if let Some(map) = ingredients.filter(|m| !m.is_empty()) {
        caption.push_str("Ingredients:\n");
        for (name, quantity) in map.iter() {
            caption.push_str(&format!("- {name}: {quantity}\n"));
        }
        caption.push('\n');
    }
    caption.push_str("Nutritional Information:");
    for (label, value) in totals.labelled() {
        caption.push_str(&format!("\n{label}: {}", format_amount(value)));
    }
    caption
}

/// At most two decimals, trailing zeros dropped.
fn format_amount(value: f64) -> String {
    let fixed = format!("{value:.2}");
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

pub struct Publisher {
    client: Client,
    imgur_client_id: String,
    imgur_base: String,
    access_token: String,
    account_id: String,
    graph_base: String,
}

impl Publisher {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: Client::new(),
            imgur_client_id: settings.imgur_client_id.clone(),
            imgur_base: settings.imgur_api_base.trim_end_matches('/').to_string(),
            access_token: settings.instagram_access_token.clone(),
            account_id: settings.instagram_account_id.clone(),
            graph_base: settings.graph_api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Hosts the image publicly, then creates and publishes the post. Stops
    /// at the first failing call. Uploads the bytes the cycle holds, not the
    /// shared file on disk, which a later cycle may have overwritten.
    pub async fn publish(&self, image: &GeneratedImage, caption: &str) -> PublicationResult {
        let outcome = async {
            let image_url = self.upload_image(image).await?;
            let creation_id = self.create_media(&image_url, caption).await?;
            self.publish_media(&creation_id).await
        }
        .await;

        match outcome {
            Ok(()) => {
                info!("✅ Image published successfully to Instagram!");
                PublicationResult::ok("Image published successfully to Instagram!")
            }
            Err(e) => {
                error!("❌ Publication failed: {}", e);
                PublicationResult::failed(e.to_string())
            }
        }
    }

    pub async fn upload_image(&self, image: &GeneratedImage) -> Result<String, PublicationError> {
        let file_name = image
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image.png".into());
        let part = multipart::Part::bytes(image.bytes.to_vec())
            .file_name(file_name)
            .mime_str("image/png")
            .map_err(|e| PublicationError::Upload(e.to_string()))?;
        let form = multipart::Form::new().part("image", part);

        let response = self.client
            .post(format!("{}/3/image", self.imgur_base))
            .header("Authorization", format!("Client-ID {}", self.imgur_client_id))
            .multipart(form)
            .send()
            .await
            .map_err(|e| PublicationError::Upload(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| PublicationError::Upload(e.to_string()))?;
        if status != StatusCode::OK {
            return Err(PublicationError::Upload(body));
        }

        let parsed: ImgurResponse = serde_json::from_str(&body)
            .map_err(|e| PublicationError::Upload(format!("{}: {}", e, preview(&body, 200))))?;
        info!("🌐 Image uploaded to Imgur. URL: {}", parsed.data.link);
        Ok(parsed.data.link)
    }

    async fn create_media(&self, image_url: &str, caption: &str) -> Result<String, PublicationError> {
        let response = self.client
            .post(format!("{}/{}/media", self.graph_base, self.account_id))
            .form(&[("image_url", image_url), ("caption", caption), ("access_token", self.access_token.as_str())])
            .send()
            .await
            .map_err(|e| PublicationError::Create(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| PublicationError::Create(e.to_string()))?;
        if status != StatusCode::OK {
            return Err(PublicationError::Create(graph_error_message(&body)));
        }

        let created: MediaCreated = serde_json::from_str(&body)
            .map_err(|e| PublicationError::Create(format!("{}: {}", e, preview(&body, 200))))?;
        info!("📸 Media container created. Media ID: {}", created.id);
        Ok(created.id)
    }

    async fn publish_media(&self, creation_id: &str) -> Result<(), PublicationError> {
        let response = self.client
            .post(format!("{}/{}/media_publish", self.graph_base, self.account_id))
            .form(&[("creation_id", creation_id), ("access_token", self.access_token.as_str())])
            .send()
            .await
            .map_err(|e| PublicationError::Publish(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(PublicationError::Publish(graph_error_message(&body)));
        }
        Ok(())
    }
}

/// `error.message` from a Graph API error envelope.
pub fn graph_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| "Unknown error".to_string())
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct ImgurResponse { data: ImgurData }

#[derive(Debug, Deserialize)]
struct ImgurData { link: String }

#[derive(Debug, Deserialize)]
struct MediaCreated {
    #[serde(deserialize_with = "id_as_string")]
    id: String,
}

fn id_as_string<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("unexpected media id {other}"))),
    }
}
