use std::collections::BTreeMap;
use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use muse_contracts::{EngineError, GenerationOutput, ImageReference};
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-image-preview";

/// Boundary to the external generation service. One call per task: a set of
/// reference images plus a text prompt in, decoded image bytes and an
/// optional caption out.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        images: &[ImageReference],
        prompt: &str,
    ) -> Result<GenerationOutput, EngineError>;
}

#[derive(Default, Clone)]
pub struct ClientRegistry {
    clients: BTreeMap<String, Arc<dyn GenerationClient>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, client: Arc<dyn GenerationClient>) {
        self.clients.insert(client.name().to_string(), client);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn GenerationClient>> {
        self.clients.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.clients.keys().cloned().collect()
    }
}

/// Client for the Gemini `generateContent` image endpoint.
pub struct GeminiClient {
    api_base: String,
    model: String,
    api_key: String,
    http: HttpClient,
}

impl GeminiClient {
    /// Resolves the API key and base URL from the environment. A missing key
    /// is a configuration failure surfaced before any batch is dispatched.
    pub fn from_env(model: impl Into<String>) -> Result<Self, EngineError> {
        let api_key = non_empty_env("GEMINI_API_KEY")
            .or_else(|| non_empty_env("GOOGLE_API_KEY"))
            .ok_or_else(|| {
                EngineError::Configuration(
                    "GEMINI_API_KEY environment variable not set".to_string(),
                )
            })?;
        Ok(Self {
            api_base: env::var("GEMINI_API_BASE")
                .ok()
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| {
                    "https://generativelanguage.googleapis.com/v1beta".to_string()
                }),
            model: model.into(),
            api_key,
            http: HttpClient::new(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }

    fn build_request_body(images: &[ImageReference], prompt: &str) -> Value {
        let mut parts: Vec<Value> = images
            .iter()
            .map(|image| {
                json!({
                    "inlineData": {
                        "mimeType": image.mime_type,
                        "data": image.payload,
                    }
                })
            })
            .collect();
        parts.push(json!({ "text": prompt }));
        json!({
            "contents": { "parts": parts },
            "generationConfig": {
                "responseModalities": ["IMAGE", "TEXT"],
            },
        })
    }
}

#[async_trait]
impl GenerationClient for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(
        &self,
        images: &[ImageReference],
        prompt: &str,
    ) -> Result<GenerationOutput, EngineError> {
        let endpoint = self.endpoint();
        let body = Self::build_request_body(images, prompt);
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                EngineError::Generation(format!("Failed to generate image: {err}"))
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|err| {
            EngineError::Generation(format!("Failed to generate image: {err}"))
        })?;
        if !status.is_success() {
            return Err(EngineError::Generation(format!(
                "Gemini request failed ({}): {}",
                status.as_u16(),
                truncate_text(&text, 512)
            )));
        }

        let payload: Value = serde_json::from_str(&text).map_err(|_| {
            EngineError::Generation("Gemini returned an invalid JSON payload.".to_string())
        })?;
        parse_generate_response(&payload)
    }
}

/// Maps a `generateContent` response body to an output, reproducing the
/// service's failure vocabulary: block reasons, empty candidate lists and
/// image-free responses each get their own message.
pub(crate) fn parse_generate_response(payload: &Value) -> Result<GenerationOutput, EngineError> {
    let candidates = payload
        .get("candidates")
        .and_then(Value::as_array)
        .filter(|candidates| !candidates.is_empty());
    let Some(candidates) = candidates else {
        if let Some(reason) = payload
            .pointer("/promptFeedback/blockReason")
            .and_then(Value::as_str)
        {
            let detail = payload
                .pointer("/promptFeedback/blockReasonMessage")
                .and_then(Value::as_str)
                .unwrap_or_default();
            return Err(EngineError::Generation(format!(
                "Request was blocked. Reason: {reason}. {detail}"
            )));
        }
        return Err(EngineError::Generation(
            "No candidates returned from the API. The request might have been blocked."
                .to_string(),
        ));
    };

    let candidate = &candidates[0];
    let parts = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut image: Option<Vec<u8>> = None;
    let mut caption: Option<String> = None;
    for part in &parts {
        let inline_data = part
            .pointer("/inlineData/data")
            .or_else(|| part.pointer("/inline_data/data"))
            .and_then(Value::as_str);
        if let Some(data) = inline_data {
            let bytes = BASE64.decode(data.as_bytes()).map_err(|_| {
                EngineError::Generation(
                    "Failed to generate image: response image was not valid base64."
                        .to_string(),
                )
            })?;
            image = Some(bytes);
        } else if let Some(text) = part.get("text").and_then(Value::as_str) {
            caption = Some(text.to_string());
        }
    }

    let Some(image) = image else {
        let finish_reason = candidate
            .get("finishReason")
            .and_then(Value::as_str)
            .unwrap_or("STOP");
        if finish_reason != "STOP" {
            return Err(EngineError::Generation(format!(
                "API response did not contain an image. Generation failed with reason: \
                 '{finish_reason}'. This is often due to safety settings or an unsupported \
                 prompt."
            )));
        }
        return Err(EngineError::Generation(
            "API response did not contain an image. It might have been blocked due to safety \
             settings or an issue with the prompt."
                .to_string(),
        ));
    };

    Ok(GenerationOutput {
        image,
        caption,
    })
}

/// Offline client: renders a deterministic solid-color PNG derived from the
/// prompt. Lets the CLI and tests run a full batch without credentials.
pub struct DryrunClient;

#[async_trait]
impl GenerationClient for DryrunClient {
    fn name(&self) -> &str {
        "dryrun"
    }

    async fn generate(
        &self,
        _images: &[ImageReference],
        prompt: &str,
    ) -> Result<GenerationOutput, EngineError> {
        let (r, g, b) = color_from_prompt(prompt);
        let mut canvas = image::RgbImage::new(64, 64);
        for pixel in canvas.pixels_mut() {
            *pixel = image::Rgb([r, g, b]);
        }
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(canvas)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .map_err(|err| {
                EngineError::Generation(format!("Failed to generate image: {err}"))
            })?;
        Ok(GenerationOutput {
            image: bytes,
            caption: Some(format!("dryrun render of: {prompt}")),
        })
    }
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}…")
}
