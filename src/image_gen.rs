use crate::{chat::preview, config::Settings, models::GeneratedImage};
use async_trait::async_trait;
use bytes::Bytes;
use image::ImageFormat;
use reqwest::Client;
use serde_json::json;
use std::{fmt, io::Cursor, path::PathBuf, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("invalid image request: {0}")] Validation(String),
    #[error("failed to generate image after {attempts} attempts")] ExhaustedRetries { attempts: u32 },
}

/// Pause between attempts. Swapped out in tests so retries run instantly.
#[async_trait]
pub trait Delay: Send + Sync {
    async fn wait(&self, duration: Duration);
}

pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Why a single attempt did not produce an image.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptFailure {
    Timeout,
    Request(String),
    Unexpected(String),
    EmptyBody,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "request timed out"),
            Self::Request(e) => write!(f, "request error: {e}"),
            Self::Unexpected(e) => write!(f, "unexpected error: {e}"),
            Self::EmptyBody => write!(f, "no image data returned"),
        }
    }
}

#[derive(Debug)]
pub enum SynthesisState {
    Attempting { attempt: u32 },
    Succeeded(GeneratedImage),
    ExhaustedRetries { attempts: u32 },
}

pub fn build_image_prompt(description: &str) -> Result<String, ImageError> {
    if description.trim().is_empty() {
        return Err(ImageError::Validation("dish description must be a non-empty string".into()));
    }
    Ok(format!(
        "Create a visually stunning and appetizing image based on the following dish description: {description}. \
        Use vibrant colors, anime-style aesthetics, and include elements that reflect the cultural significance of the dish. \
        Present the dish in an artistic way, with a decorative background that enhances its appeal. \
        Make it Instagram-worthy with emphasis on details and presentation."
    ))
}

pub struct ImageClient {
    client: Client,
    api_key: String,
    url: String,
    retries: u32,
    retry_delay: Duration,
    timeout: Duration,
    output_path: PathBuf,
    delay: Arc<dyn Delay>,
}

impl ImageClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            client: Client::new(),
            api_key: settings.hf_api_key.clone(),
            url: format!("{}/models/{}", settings.hf_api_base.trim_end_matches('/'), settings.image_model),
            retries: settings.image_retries.max(1),
            retry_delay: settings.image_retry_delay,
            timeout: settings.image_timeout,
            output_path: settings.image_output_path.clone(),
            delay: Arc::new(TokioDelay),
        }
    }

    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    /// Illustrates a dish description and writes the picture to the output
    /// path, overwriting the previous one.
    pub async fn synthesize(&self, description: &str) -> Result<GeneratedImage, ImageError> {
        let prompt = build_image_prompt(description)?;
        info!("🎨 Generating image with prompt: {}", preview(&prompt, 100));

        let mut state = SynthesisState::Attempting { attempt: 1 };
        loop {
            state = match state {
                SynthesisState::Attempting { attempt } => match self.attempt(&prompt).await {
                    Ok(image) => SynthesisState::Succeeded(image),
                    Err(failure) => {
                        warn!("⚠️ Image attempt {}/{} failed: {}", attempt, self.retries, failure);
                        if attempt >= self.retries {
                            SynthesisState::ExhaustedRetries { attempts: attempt }
                        } else {
                            self.delay.wait(self.retry_delay).await;
                            SynthesisState::Attempting { attempt: attempt + 1 }
                        }
                    }
                },
                SynthesisState::Succeeded(image) => {
                    info!("✅ Image generated successfully: {}", image.path.display());
                    return Ok(image);
                }
                SynthesisState::ExhaustedRetries { attempts } => {
                    error!("❌ Failed to generate image after {} attempts", attempts);
                    return Err(ImageError::ExhaustedRetries { attempts });
                }
            };
        }
    }

    async fn attempt(&self, prompt: &str) -> Result<GeneratedImage, AttemptFailure> {
        let response = self.client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "inputs": prompt }))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptFailure::Request(format!("status={} body={}", status, preview(&body, 200))));
        }

        let body = response.bytes().await.map_err(classify)?;
        if body.is_empty() {
            return Err(AttemptFailure::EmptyBody);
        }
        self.persist(&body).await
    }

    async fn persist(&self, body: &[u8]) -> Result<GeneratedImage, AttemptFailure> {
        let decoded = image::load_from_memory(body)
            .map_err(|e| AttemptFailure::Unexpected(format!("undecodable image: {e}")))?;
        let mut png = Vec::new();
        decoded
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| AttemptFailure::Unexpected(e.to_string()))?;
        tokio::fs::write(&self.output_path, &png)
            .await
            .map_err(|e| AttemptFailure::Unexpected(format!("could not save {}: {e}", self.output_path.display())))?;

        Ok(GeneratedImage { path: self.output_path.clone(), bytes: Bytes::from(png) })
    }
}

fn classify(e: reqwest::Error) -> AttemptFailure {
    if e.is_timeout() {
        AttemptFailure::Timeout
    } else {
        AttemptFailure::Request(e.to_string())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::chat::tests::test_settings;
    use image::{DynamicImage, Rgb, RgbImage};
    use parking_lot::Mutex;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    pub(crate) struct RecordingDelay {
        pub(crate) waits: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Delay for RecordingDelay {
        async fn wait(&self, duration: Duration) {
            self.waits.lock().push(duration);
        }
    }

    pub(crate) fn png_bytes() -> Vec<u8> {
        solid_png([255, 75, 75])
    }

    pub(crate) fn solid_png(color: [u8; 3]) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb(color)));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    fn client_for(server: &MockServer, dir: &tempfile::TempDir) -> (ImageClient, Arc<RecordingDelay>) {
        let settings = Settings {
            image_timeout: Duration::from_millis(200),
            image_output_path: dir.path().join("generated_image.png"),
            image_model: "sd".into(),
            ..test_settings(server)
        };
        let delay = Arc::new(RecordingDelay::default());
        (ImageClient::new(&settings).with_delay(delay.clone()), delay)
    }

    #[test]
    fn prompt_embeds_description_and_style() {
        let prompt = build_image_prompt("Zangetsu Layer Cake").unwrap();
        assert!(prompt.contains("Zangetsu Layer Cake"));
        assert!(prompt.contains("anime-style"));
        assert!(prompt.contains("decorative background"));
    }

    #[tokio::test]
    async fn empty_description_fails_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;
        let dir = tempfile::tempdir().unwrap();
        let (client, delay) = client_for(&server, &dir);

        assert!(matches!(client.synthesize("").await, Err(ImageError::Validation(_))));
        assert!(matches!(client.synthesize("   ").await, Err(ImageError::Validation(_))));
        assert!(delay.waits.lock().is_empty());
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt_after_two_timeouts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/sd"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes()).set_delay(Duration::from_secs(2)))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/models/sd"))
            .and(header("authorization", "Bearer hf_test"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes()))
            .expect(1)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let (client, delay) = client_for(&server, &dir);

        let image = client.synthesize("A cake").await.unwrap();
        assert_eq!(*delay.waits.lock(), vec![Duration::from_secs(5), Duration::from_secs(5)]);
        assert_eq!(image.path, dir.path().join("generated_image.png"));
        assert_eq!(std::fs::read(&image.path).unwrap(), image.bytes.to_vec());
        assert!(image::load_from_memory(&image.bytes).is_ok());
    }

    #[tokio::test]
    async fn every_failure_class_is_retried_until_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("loading"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not an image".to_vec()))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let (client, delay) = client_for(&server, &dir);

        let err = client.synthesize("A cake").await.unwrap_err();
        assert!(matches!(err, ImageError::ExhaustedRetries { attempts: 3 }));
        assert_eq!(delay.waits.lock().len(), 2);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
        assert!(!dir.path().join("generated_image.png").exists());
    }
}
