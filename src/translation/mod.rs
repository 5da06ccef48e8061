//! Machine translation of recognized text
//!
//! [`Translator`] puts a TTL/capacity bounded cache in front of a
//! [`TranslationBackend`] and retries transient backend failures with a
//! linearly growing delay.

pub mod cache;
pub mod error;
pub mod google;

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::TranslationSettings;

pub use cache::{CacheStats, TranslationCache};
pub use error::{BackendError, TranslationError};
pub use google::GoogleTranslateBackend;

/// External translation service
pub trait TranslationBackend: Send {
    fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String, BackendError>;
}

/// Cached, retrying translator for one language pair
pub struct Translator {
    backend: Box<dyn TranslationBackend>,
    cache: TranslationCache,
    max_retries: u32,
    retry_delay: Duration,
    source_lang: String,
    target_lang: String,
}

impl Translator {
    pub fn new(backend: Box<dyn TranslationBackend>, settings: &TranslationSettings) -> Self {
        Self {
            backend,
            cache: TranslationCache::new(settings.cache_size, settings.cache_ttl()),
            max_retries: settings.max_retries.max(1),
            retry_delay: settings.retry_delay(),
            source_lang: settings.source_lang.clone(),
            target_lang: settings.target_lang.clone(),
        }
    }

    /// Translator backed by the Google endpoint from `settings`
    pub fn google(settings: &TranslationSettings) -> anyhow::Result<Self> {
        let backend = GoogleTranslateBackend::new(settings.endpoint.clone(), settings.request_timeout())?;
        Ok(Self::new(Box::new(backend), settings))
    }

    /// Translate `text` from the source to the target language.
    ///
    /// Blank input is returned unchanged without touching the cache or the
    /// backend. Failures are never cached.
    pub fn translate_text(&mut self, text: &str) -> Result<String, TranslationError> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }

        if let Some(cached) = self.cache.get(text) {
            debug!("Using cached translation for: '{}'", preview(text));
            return Ok(cached);
        }

        let translated = self.translate_with_retry(text)?;
        self.cache.insert(text, translated.clone());
        Ok(translated)
    }

    /// Translate recognized screen text with the configured language pair
    pub fn translate_ocr_text(&mut self, ocr_text: &str) -> Result<String, TranslationError> {
        self.translate_text(ocr_text)
    }

    /// Change the language pair. Cached translations belong to the old pair and are dropped.
    pub fn set_languages(&mut self, source_lang: impl Into<String>, target_lang: impl Into<String>) {
        self.source_lang = source_lang.into();
        self.target_lang = target_lang.into();
        self.cache.clear();
    }

    pub fn languages(&self) -> (&str, &str) {
        (&self.source_lang, &self.target_lang)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
        info!("Translation cache cleared");
    }

    fn translate_with_retry(&self, text: &str) -> Result<String, TranslationError> {
        let mut last_error = BackendError::Transient("no attempt made".to_string());

        for attempt in 1..=self.max_retries {
            debug!("Translation attempt {} for text: '{}'", attempt, preview(text));

            match self.backend.translate(text, &self.source_lang, &self.target_lang) {
                Ok(translated) if !translated.is_empty() => {
                    debug!("Translation successful: '{}' -> '{}'", preview(text), preview(&translated));
                    return Ok(translated);
                }
                Ok(_) => last_error = BackendError::Transient("Empty translation result".to_string()),
                Err(error) if !error.is_retryable() => {
                    warn!("Translation rejected: {}", error);
                    return Err(TranslationError::Rejected {
                        original_text: text.to_string(),
                        error,
                    });
                }
                Err(error) => last_error = error,
            }

            warn!("Translation attempt {} failed: {}", attempt, last_error);
            if attempt < self.max_retries {
                std::thread::sleep(self.retry_delay * attempt);
            }
        }

        Err(TranslationError::RetriesExhausted {
            original_text: text.to_string(),
            attempts: self.max_retries,
            last_error,
        })
    }
}

/// First 50 characters, for log lines
fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(50).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
