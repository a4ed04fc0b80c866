//! Translation service used by translator mode

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use url::Url;

const TRANSLATE_ENDPOINT: &str = "https://translate.googleapis.com/translate_a/single";

/// Opaque text translation
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` into the language with ISO code `target`
    async fn translate(&self, text: &str, target: &str) -> Result<String>;
}

/// Map a spoken language name to its ISO 639-1 code
pub fn language_code(name: &str) -> Option<&'static str> {
    let code = match name.trim().to_lowercase().as_str() {
        "english" | "inglés" | "ingles" => "en",
        "spanish" | "español" | "espanol" => "es",
        "french" | "francés" | "frances" => "fr",
        "german" | "alemán" | "aleman" => "de",
        "italian" | "italiano" => "it",
        "portuguese" | "portugués" | "portugues" => "pt",
        _ => return None,
    };
    Some(code)
}

/// Public web translation endpoint, source language auto-detected
#[derive(Debug, Clone)]
pub struct WebTranslator {
    client: Client,
}

impl WebTranslator {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Translator for WebTranslator {
    async fn translate(&self, text: &str, target: &str) -> Result<String> {
        let url = Url::parse_with_params(
            TRANSLATE_ENDPOINT,
            &[("client", "gtx"), ("sl", "auto"), ("tl", target), ("dt", "t"), ("q", text)],
        )?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Translation request failed")?;

        if !response.status().is_success() {
            bail!("Translation service returned {}", response.status());
        }

        let body: Value = response.json().await.context("Invalid translation response")?;
        parse_translation(&body)
    }
}

/// Join the translated segments of a `translate_a/single` response
pub fn parse_translation(body: &Value) -> Result<String> {
    let Some(segments) = body.get(0).and_then(|s| s.as_array()) else {
        bail!("Translation response has no segments");
    };

    let text: String = segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(|t| t.as_str()))
        .collect();

    if text.trim().is_empty() {
        bail!("Empty translation");
    }
    Ok(text)
}
