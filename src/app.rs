//! Application Coordinator
//!
//! Drives the OCR processor from the consumer side: polls the result slot on
//! a fixed tick, reacts to processor events and renders the merged
//! paragraphs, optionally with their translations. Configuration changes
//! published through the [`ConfigHandle`] are applied while running.

use anyhow::Result;
use crossbeam_channel::{select, tick, unbounded, Receiver};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::capture::FrameSource;
use crate::config::{AppConfig, ConfigHandle};
use crate::processor::{OcrDataProvider, OcrProcessor};
use crate::shared::OcrEvent;
use crate::translation::Translator;
use crate::vision::{Paragraph, Recognizer};

/// A paragraph ready for display
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedParagraph {
    pub paragraph: Paragraph,
    /// Absent when translation is disabled or failed for this paragraph
    pub translation: Option<String>,
}

impl fmt::Display for RenderedParagraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.paragraph;
        let (page, block, par) = p.key();
        let (x, y, width, height) = p.bounds();
        write!(
            f,
            "#{}.{}.{} [{},{} {}x{}] ({:.1}) {}",
            page, block, par, x, y, width, height, p.conf, p.text
        )?;
        if let Some(translation) = &self.translation {
            write!(f, "\n    -> {}", translation)?;
        }
        Ok(())
    }
}

/// Main application coordinator
pub struct OverlayApp {
    config: ConfigHandle,
    processor: OcrProcessor,
    events: Receiver<OcrEvent>,
    translator: Option<Translator>,
    /// Translations for the batch currently on screen
    batch_translations: HashMap<String, String>,
    config_changes: Receiver<AppConfig>,
    poll_interval: Duration,
}

impl OverlayApp {
    pub fn new(
        config: ConfigHandle,
        source: Box<dyn FrameSource>,
        recognizer: Arc<dyn Recognizer>,
        translator: Option<Translator>,
    ) -> Self {
        let (events_tx, events) = unbounded();
        let config_changes = config.subscribe();
        let poll_interval = config.snapshot().poll_interval();
        let processor = OcrProcessor::new(config.clone(), source, recognizer, events_tx);

        Self {
            config,
            processor,
            events,
            translator,
            batch_translations: HashMap::new(),
            config_changes,
            poll_interval,
        }
    }

    pub fn processor(&self) -> &OcrProcessor {
        &self.processor
    }

    pub fn processor_mut(&mut self) -> &mut OcrProcessor {
        &mut self.processor
    }

    /// Run until `shutdown` fires or its sender is dropped
    pub fn run(&mut self, shutdown: Receiver<()>) -> Result<()> {
        self.processor.start()?;
        self.poll_interval = self.processor.poll_interval();
        let mut ticker = tick(self.poll_interval);
        let config_changes = self.config_changes.clone();
        info!(state = ?self.processor.state(), "Overlay running, waiting for OCR results");

        loop {
            select! {
                recv(ticker) -> _ => {
                    self.processor.poll();
                    for rendered in self.drain_events() {
                        self.present(&rendered);
                    }
                }
                recv(config_changes) -> change => {
                    if let Ok(config) = change {
                        if let Some(interval) = self.apply_config_change(&config) {
                            ticker = tick(interval);
                        }
                    }
                }
                recv(shutdown) -> _ => break,
            }
        }

        self.processor.stop();
        self.drain_events();
        if self.processor.is_running() {
            warn!(state = ?self.processor.state(), "OCR worker is still shutting down");
        }
        let stats = self.processor.stats();
        info!(
            cycles = stats.cycles,
            failed = stats.failed_cycles,
            overruns = stats.overruns,
            published = stats.published,
            "Overlay stopped"
        );
        if let Some(translator) = &self.translator {
            let cache = translator.cache_stats();
            info!(
                entries = cache.total_entries,
                valid = cache.valid_entries,
                expired = cache.expired_entries,
                "Translation cache"
            );
        }
        Ok(())
    }

    /// Apply a published configuration, returning the new poll interval
    /// when the tick has to be rebuilt.
    ///
    /// Recognition settings need no handling here: the worker reads a fresh
    /// snapshot every cycle.
    fn apply_config_change(&mut self, config: &AppConfig) -> Option<Duration> {
        if let Some(translator) = self.translator.as_mut() {
            let wanted = (
                config.translation.source_lang.as_str(),
                config.translation.target_lang.as_str(),
            );
            if translator.languages() != wanted {
                info!("Translation languages changed: {} -> {}", wanted.0, wanted.1);
                translator.set_languages(wanted.0, wanted.1);
                self.batch_translations.clear();
            }
        }

        let interval = config.poll_interval();
        if interval == self.poll_interval {
            return None;
        }
        info!(interval_ms = interval.as_millis() as u64, "Poll interval changed");
        self.poll_interval = interval;
        Some(interval)
    }

    /// Handle pending processor events, returning the frames to draw
    fn drain_events(&mut self) -> Vec<Vec<RenderedParagraph>> {
        let pending: Vec<OcrEvent> = self.events.try_iter().collect();
        let mut frames = Vec::new();
        for event in pending {
            match event {
                OcrEvent::NewResult => frames.push(self.render_latest()),
                OcrEvent::Stopped => debug!("OCR processor reported stop"),
            }
        }
        frames
    }

    /// Merge the latest batch and attach translations
    pub fn render_latest(&mut self) -> Vec<RenderedParagraph> {
        self.batch_translations.clear();
        if self.config.snapshot().translation.clear_cache_on_new_batch {
            if let Some(translator) = self.translator.as_mut() {
                translator.clear_cache();
            }
        }

        let paragraphs = self.processor.merged_ocr_data();
        debug!(paragraphs = paragraphs.len(), "Rendering OCR result");
        paragraphs
            .into_iter()
            .map(|paragraph| {
                let translation = self.translate(&paragraph.text);
                RenderedParagraph {
                    paragraph,
                    translation,
                }
            })
            .collect()
    }

    fn translate(&mut self, text: &str) -> Option<String> {
        let translator = self.translator.as_mut()?;
        if let Some(done) = self.batch_translations.get(text) {
            return Some(done.clone());
        }

        match translator.translate_ocr_text(text) {
            Ok(translated) => {
                self.batch_translations
                    .insert(text.to_string(), translated.clone());
                Some(translated)
            }
            Err(e) => {
                warn!("Translation failed for '{}': {}", e.original_text(), e);
                None
            }
        }
    }

    fn present(&self, frame: &[RenderedParagraph]) {
        println!("--- {} paragraph(s) ---", frame.len());
        for rendered in frame {
            println!("{}", rendered);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::CapturedFrame;
    use crate::capture::CaptureError;
    use crate::config::AppConfig;
    use crate::translation::{BackendError, TranslationBackend};
    use crate::vision::{word, RecognizeError, WordDetection};
    use crossbeam_channel::bounded;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    struct StillFrame;

    impl FrameSource for StillFrame {
        fn capture(&mut self) -> Result<CapturedFrame, CaptureError> {
            Ok(CapturedFrame::new(vec![255; 4], 1, 1))
        }
    }

    struct FixedRecognizer {
        words: Vec<WordDetection>,
        calls: AtomicUsize,
    }

    impl Recognizer for FixedRecognizer {
        fn recognize(&self, _: &CapturedFrame, _: &str) -> Result<Vec<WordDetection>, RecognizeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.words.clone())
        }
    }

    /// Upper-cases text, failing for anything containing "fail"
    struct ShoutingBackend {
        calls: Arc<AtomicUsize>,
    }

    impl TranslationBackend for ShoutingBackend {
        fn translate(&self, text: &str, _: &str, _: &str) -> Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text.contains("fail") {
                Err(BackendError::Permanent("unsupported".into()))
            } else {
                Ok(text.to_uppercase())
            }
        }
    }

    fn two_paragraphs() -> Vec<WordDetection> {
        vec![
            word("Hello", 90.0, (0, 0, 50, 10), (1, 1, 1, 1, 1)),
            word("World", 95.0, (55, 0, 50, 10), (1, 1, 1, 1, 2)),
            word("please", 80.0, (0, 40, 60, 10), (1, 2, 1, 1, 1)),
            word("fail", 80.0, (65, 40, 40, 10), (1, 2, 1, 1, 2)),
        ]
    }

    fn fast_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.ocr.fps = 100.0;
        config.ocr.poll_interval_ms = 10;
        config.ocr.stop_timeout_ms = 100;
        config.translation.retry_delay_secs = 0.0;
        config
    }

    fn app_with(config: AppConfig, translate: bool) -> (OverlayApp, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let translator = translate.then(|| {
            let backend = ShoutingBackend {
                calls: Arc::clone(&calls),
            };
            Translator::new(Box::new(backend), &config.translation)
        });
        let recognizer = Arc::new(FixedRecognizer {
            words: two_paragraphs(),
            calls: AtomicUsize::new(0),
        });
        let app = OverlayApp::new(ConfigHandle::new(config), Box::new(StillFrame), recognizer, translator);
        (app, calls)
    }

    #[test]
    fn test_render_without_translator() {
        let (mut app, _) = app_with(fast_config(), false);
        app.processor_mut().recognize_once().unwrap();

        let frame = app.render_latest();

        assert_eq!(frame.len(), 2);
        assert_eq!(frame[0].paragraph.text, "Hello World");
        assert!(frame.iter().all(|r| r.translation.is_none()));
    }

    #[test]
    fn test_failed_translation_is_omitted() {
        let (mut app, _) = app_with(fast_config(), true);
        app.processor_mut().recognize_once().unwrap();

        let frame = app.render_latest();

        assert_eq!(frame[0].translation.as_deref(), Some("HELLO WORLD"));
        assert_eq!(frame[1].paragraph.text, "please fail");
        assert_eq!(frame[1].translation, None);
    }

    #[test]
    fn test_cache_survives_new_batch_by_default() {
        let (mut app, calls) = app_with(fast_config(), true);
        app.processor_mut().recognize_once().unwrap();

        app.render_latest();
        app.render_latest();

        // The failing paragraph is asked for again, the good one comes from cache
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_cache_cleared_on_new_batch_when_configured() {
        let mut config = fast_config();
        config.translation.clear_cache_on_new_batch = true;
        let (mut app, calls) = app_with(config, true);
        app.processor_mut().recognize_once().unwrap();

        app.render_latest();
        app.render_latest();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_run_renders_and_stops_on_shutdown() {
        let (mut app, calls) = app_with(fast_config(), true);
        let (shutdown_tx, shutdown_rx) = bounded(1);

        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            let _ = shutdown_tx.send(());
        });

        let started = Instant::now();
        app.run(shutdown_rx).unwrap();
        stopper.join().unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!app.processor().is_running());
        // Identical batches render once: one call per paragraph
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_run_stops_when_shutdown_sender_dropped() {
        let (mut app, _) = app_with(fast_config(), false);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        drop(shutdown_tx);

        app.run(shutdown_rx).unwrap();

        assert!(!app.processor().is_running());
    }

    #[test]
    fn test_rendered_paragraph_display() {
        let rendered = RenderedParagraph {
            paragraph: Paragraph {
                page_num: 1,
                block_num: 1,
                par_num: 1,
                text: "Hello World".to_string(),
                left: 0,
                top: 0,
                width: 105,
                height: 10,
                conf: 92.5,
            },
            translation: Some("你好世界".to_string()),
        };

        assert_eq!(rendered.to_string(), "#1.1.1 [0,0 105x10] (92.5) Hello World\n    -> 你好世界");
    }

    #[test]
    fn test_language_change_reaches_translator() {
        let (mut app, calls) = app_with(fast_config(), true);
        app.processor_mut().recognize_once().unwrap();
        app.render_latest();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        app.config.update(|c| c.translation.target_lang = "fr".to_string());
        let change = app.config_changes.try_recv().unwrap();

        assert_eq!(app.apply_config_change(&change), None);
        let translator = app.translator.as_ref().unwrap();
        assert_eq!(translator.languages(), ("en", "fr"));
        assert_eq!(translator.cache_stats().total_entries, 0);

        // Nothing cached for the new pair, so both paragraphs go out again
        app.render_latest();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_poll_interval_change_rebuilds_tick() {
        let (mut app, _) = app_with(fast_config(), false);

        app.config.update(|c| c.ocr.poll_interval_ms = 25);
        let change = app.config_changes.try_recv().unwrap();

        assert_eq!(app.apply_config_change(&change), Some(Duration::from_millis(25)));
        // Same interval again needs no new tick
        assert_eq!(app.apply_config_change(&change), None);
    }

    #[test]
    fn test_run_applies_config_changes() {
        let (mut app, _) = app_with(fast_config(), true);
        let handle = app.config.clone();
        let (shutdown_tx, shutdown_rx) = bounded(1);

        let changer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            handle.update(|c| {
                c.translation.source_lang = "de".to_string();
                c.ocr.poll_interval_ms = 20;
            });
            std::thread::sleep(Duration::from_millis(100));
            let _ = shutdown_tx.send(());
        });

        app.run(shutdown_rx).unwrap();
        changer.join().unwrap();

        assert_eq!(app.translator.as_ref().unwrap().languages(), ("de", "zh-cn"));
        assert_eq!(app.poll_interval, Duration::from_millis(20));
    }
}
