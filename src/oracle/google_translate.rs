//! Translation through the public Google Translate endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::{Oracle, OracleRequest};
use crate::config::OracleConfig;

const TRANSLATE_URL: &str = "https://translate.googleapis.com/translate_a/single";

/// Language code for a display name
pub fn language_code(language: &str) -> Option<&'static str> {
    let code = match language.trim().to_ascii_lowercase().as_str() {
        "arabic" => "ar",
        "chinese" => "zh-cn",
        "english" => "en",
        "french" => "fr",
        "german" => "de",
        "hindi" => "hi",
        "japanese" => "ja",
        "portuguese" => "pt",
        "russian" => "ru",
        "spanish" => "es",
        "swahili" => "sw",
        _ => return None,
    };
    Some(code)
}

/// Google Translate client
pub struct GoogleTranslateOracle {
    url: String,
    client: reqwest::Client,
}

impl GoogleTranslateOracle {
    /// Create from stage configuration
    pub fn from_config(config: &OracleConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            url: config
                .base_url
                .clone()
                .unwrap_or_else(|| TRANSLATE_URL.to_string()),
            client,
        })
    }
}

#[async_trait]
impl Oracle for GoogleTranslateOracle {
    fn name(&self) -> &str {
        "google_translate"
    }

    async fn call(&self, request: &OracleRequest) -> Result<String> {
        let OracleRequest::Translate {
            text,
            source_language,
            target_language,
        } = request
        else {
            anyhow::bail!("google_translate only serves translation requests");
        };

        // Unknown source languages fall back to auto-detection
        let source = language_code(source_language).unwrap_or("auto");
        let target = language_code(target_language)
            .with_context(|| format!("No language code for target '{}'", target_language))?;

        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("client", "gtx"),
                ("sl", source),
                ("tl", target),
                ("dt", "t"),
                ("q", text.as_str()),
            ])
            .send()
            .await
            .context("Failed to reach Google Translate")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Google Translate returned {}", status);
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to decode Google Translate response")?;

        join_segments(&body).context("Google Translate response has no translated segments")
    }
}

/// Concatenate the translated segments of a `translate_a/single` response.
///
/// The payload is `[[[translated, original, ...], ...], ...]`.
fn join_segments(body: &Value) -> Option<String> {
    let segments = body.get(0)?.as_array()?;
    let text: String = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(Value::as_str))
        .collect();
    (!text.is_empty()).then_some(text)
}
