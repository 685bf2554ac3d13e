//! Reagent label scanning
//!
//! A photographed label is sent to a hosted vision model which answers with
//! `{name, brand, presentation}`. The result only pre-fills the entry and
//! withdrawal forms; on failure the caller falls back to manual entry.

use crate::error::LabelError;
use crate::model::{LabelAnalysis, Presentation};
use async_trait::async_trait;
use serde::Deserialize;

#[cfg(feature = "web")]
use base64::{Engine as _, engine::general_purpose::STANDARD};
#[cfg(feature = "web")]
use image::ImageFormat;
#[cfg(feature = "web")]
use serde_json::{Value, json};

/// Instruction sent along with the image
pub const LABEL_PROMPT: &str = "Analiza esta etiqueta de reactivo de laboratorio. Extrae el nombre del reactivo, la marca y clasifica su presentación como 'Líquido', 'Sólido' o 'Paquete'. Responde únicamente en formato JSON.";

/// Default vision model
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

#[async_trait]
pub trait LabelAnalyzer: Send + Sync {
    /// Analyze a base64 image, with or without a `data:` URL prefix
    async fn analyze(&self, image_base64: &str) -> Result<LabelAnalysis, LabelError>;
}

/// Drop a `data:image/...;base64,` prefix if present
pub fn strip_data_url(image: &str) -> &str {
    let trimmed = image.trim();
    if trimmed.starts_with("data:") {
        if let Some((_, payload)) = trimmed.split_once(',') {
            return payload;
        }
    }
    trimmed
}

#[derive(Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    name: String,
    #[serde(default)]
    brand: String,
    #[serde(default)]
    presentation: String,
}

/// Parse the model's JSON text; unknown presentations become `Líquido`
pub fn parse_analysis(text: &str) -> Result<LabelAnalysis, LabelError> {
    let raw: RawAnalysis =
        serde_json::from_str(text.trim()).map_err(|e| LabelError::Response(e.to_string()))?;
    Ok(LabelAnalysis {
        name: raw.name.trim().to_string(),
        brand: raw.brand.trim().to_string(),
        presentation: Presentation::from_label(&raw.presentation),
    })
}

/// Used when no API key is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledAnalyzer;

#[async_trait]
impl LabelAnalyzer for DisabledAnalyzer {
    async fn analyze(&self, _image_base64: &str) -> Result<LabelAnalysis, LabelError> {
        Err(LabelError::NotConfigured)
    }
}

/// Decode the image and guess its MIME type, defaulting to JPEG
#[cfg(feature = "web")]
pub fn sniff_mime(image_base64: &str) -> Result<&'static str, LabelError> {
    let bytes = STANDARD
        .decode(image_base64)
        .map_err(|e| LabelError::InvalidImage(e.to_string()))?;
    if bytes.is_empty() {
        return Err(LabelError::InvalidImage("empty image".to_string()));
    }
    Ok(match image::guess_format(&bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::WebP) => "image/webp",
        _ => "image/jpeg",
    })
}

#[cfg(feature = "web")]
const GENERATE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Hosted vision model client using the `generateContent` endpoint
#[cfg(feature = "web")]
#[derive(Debug, Clone)]
pub struct GeminiAnalyzer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[cfg(feature = "web")]
impl GeminiAnalyzer {
    pub fn new(api_key: &str, model: &str) -> Self {
        GeminiAnalyzer {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            base_url: GENERATE_URL.to_string(),
        }
    }

    /// Point the client at another endpoint root
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Request body for one image
    pub fn request_body(mime_type: &str, data: &str) -> Value {
        json!({
            "contents": [{
                "parts": [
                    { "inlineData": { "mimeType": mime_type, "data": data } },
                    { "text": LABEL_PROMPT }
                ]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "name": { "type": "STRING" },
                        "brand": { "type": "STRING" },
                        "presentation": {
                            "type": "STRING",
                            "description": "Must be 'Líquido', 'Sólido', or 'Paquete'"
                        }
                    },
                    "required": ["name", "brand", "presentation"]
                }
            }
        })
    }
}

/// Text of the first candidate part, `"{}"` when absent
#[cfg(feature = "web")]
pub fn response_text(body: &Value) -> &str {
    body.pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .unwrap_or("{}")
}

#[cfg(feature = "web")]
#[async_trait]
impl LabelAnalyzer for GeminiAnalyzer {
    async fn analyze(&self, image_base64: &str) -> Result<LabelAnalysis, LabelError> {
        let data = strip_data_url(image_base64);
        let mime_type = sniff_mime(data)?;
        let url = format!("{}/{}:generateContent", self.base_url, self.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::request_body(mime_type, data))
            .send()
            .await
            .map_err(|e| LabelError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            log::error!("label analysis failed with status {}: {}", status, text);
            return Err(LabelError::Request(format!("status {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| LabelError::Response(e.to_string()))?;
        parse_analysis(response_text(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_prefix_is_removed() {
        assert_eq!(strip_data_url("data:image/png;base64,AAAA"), "AAAA");
        assert_eq!(strip_data_url("  AAAA "), "AAAA");
    }

    #[test]
    fn unknown_presentation_falls_back_to_liquid() {
        let a = parse_analysis(r#"{"name":"Etanol","brand":"Merck","presentation":"Gas"}"#).unwrap();
        assert_eq!(a.presentation, Presentation::Liquid);
        assert_eq!(a.suggested_base_unit(), "mL");

        let a = parse_analysis(r#"{"name":"NaCl","brand":"Sigma","presentation":"Sólido"}"#).unwrap();
        assert_eq!(a.presentation, Presentation::Solid);
        assert_eq!(a.suggested_base_unit(), "g");
    }

    #[test]
    fn malformed_response_is_an_error() {
        assert!(matches!(parse_analysis("no json"), Err(LabelError::Response(_))));
    }

    #[cfg(feature = "web")]
    #[test]
    fn mime_type_is_sniffed() {
        let png = STANDARD.encode([0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0]);
        assert_eq!(sniff_mime(&png).unwrap(), "image/png");
        let other = STANDARD.encode(b"not an image");
        assert_eq!(sniff_mime(&other).unwrap(), "image/jpeg");
        assert!(sniff_mime("%%%").is_err());
    }

    #[cfg(feature = "web")]
    #[test]
    fn response_text_reads_first_candidate() {
        let body = json!({"candidates":[{"content":{"parts":[{"text":"{\"name\":\"X\"}"}]}}]});
        assert_eq!(response_text(&body), "{\"name\":\"X\"}");
        assert_eq!(response_text(&json!({})), "{}");
    }
}
