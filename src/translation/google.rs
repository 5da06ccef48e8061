//! Google Translate backend (public "gtx" endpoint)
//!
//! A blocking facade over async `reqwest`, driven by a private tokio runtime.

use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::debug;

use super::error::BackendError;
use super::TranslationBackend;

pub struct GoogleTranslateBackend {
    runtime: Runtime,
    client: reqwest::Client,
    endpoint: String,
}

impl GoogleTranslateBackend {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let runtime = Runtime::new().context("Failed to create tokio runtime")?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            runtime,
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn request(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String, BackendError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("client", "gtx"),
                ("sl", source_lang),
                ("tl", target_lang),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("Translation service returned {}", status);
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                BackendError::Transient(message)
            } else {
                BackendError::Permanent(message)
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| BackendError::Permanent(format!("Unreadable translation response: {}", e)))?;
        parse_gtx_response(&body)
    }
}

impl TranslationBackend for GoogleTranslateBackend {
    fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String, BackendError> {
        debug!(source_lang, target_lang, chars = text.chars().count(), "Requesting translation");
        self.runtime.block_on(self.request(text, source_lang, target_lang))
    }
}

fn classify_request_error(error: reqwest::Error) -> BackendError {
    if error.is_builder() {
        BackendError::Permanent(format!("Invalid translation request: {}", error))
    } else {
        BackendError::Transient(format!("Translation request failed: {}", error))
    }
}

/// Join the translated segments of a gtx response.
///
/// The body looks like `[[["你好","hello",null,null,10], ...], null, "en", ...]`.
pub fn parse_gtx_response(body: &Value) -> Result<String, BackendError> {
    let segments = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| BackendError::Permanent("Unexpected translation response layout".to_string()))?;

    Ok(segments
        .iter()
        .filter_map(|segment| segment.get(0).and_then(Value::as_str))
        .collect())
}
