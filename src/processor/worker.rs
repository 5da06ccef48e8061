//! Recognition worker loop
//!
//! Runs on its own thread: capture, recognize, filter, publish, then sleep
//! for the rest of the target interval. The sleep waits on the shutdown
//! channel so a stop request wakes the worker immediately.

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::slot::LatestSlot;
use crate::capture::FrameSource;
use crate::config::{AppConfig, ConfigHandle};
use crate::shared::RuntimeStats;
use crate::vision::{filter_words, Recognizer, WordDetection};

/// One capture + recognize + filter pass
pub fn run_cycle(
    config: &AppConfig,
    source: &mut dyn FrameSource,
    recognizer: &dyn Recognizer,
) -> Result<Vec<WordDetection>> {
    let frame = source.capture().context("Screen capture failed")?;
    let words = recognizer
        .recognize(&frame, &config.ocr.language)
        .context("Recognition failed")?;
    let total = words.len();
    let kept = filter_words(words, config.ocr.conf_threshold);
    debug!(
        total,
        kept = kept.len(),
        frame_age_ms = frame.timestamp.elapsed().as_secs_f64() * 1000.0,
        "Word-level filter applied"
    );
    Ok(kept)
}

/// State owned by the worker thread
pub struct RecognitionWorker {
    pub(super) config: ConfigHandle,
    pub(super) source: Arc<Mutex<Box<dyn FrameSource>>>,
    pub(super) recognizer: Arc<dyn Recognizer>,
    pub(super) slot: LatestSlot<Vec<WordDetection>>,
    pub(super) stats: Arc<Mutex<RuntimeStats>>,
    pub(super) shutdown: Receiver<()>,
    /// Dropped when the thread exits, which is how the processor observes exit
    pub(super) _done: Sender<()>,
}

impl RecognitionWorker {
    pub fn run(self) {
        info!("OCR worker thread starting...");

        loop {
            let config = self.config.snapshot();
            let target = config.target_interval();
            let start = Instant::now();

            let outcome = self.guarded_cycle(&config);

            // A batch finished after a stop request belongs to no run
            if self.shutdown_requested() {
                debug!("Discarding cycle that finished after stop was requested");
                break;
            }

            match outcome {
                Ok(words) => {
                    let count = words.len();
                    let superseded = self.slot.publish(words);
                    let mut stats = self.stats.lock();
                    stats.published += 1;
                    if superseded {
                        stats.superseded += 1;
                    }
                    stats.clear_error();
                    debug!(words = count, superseded, "Published recognition batch");
                }
                Err(e) => {
                    warn!("OCR cycle failed: {:#}", e);
                    self.stats.lock().set_error(format!("{:#}", e));
                }
            }

            let elapsed = start.elapsed();
            self.stats.lock().record_cycle(elapsed, target);
            if config.general.debug_mode {
                info!(elapsed_ms = elapsed.as_secs_f64() * 1000.0, "OCR recognition time");
            }

            let wait = match target.checked_sub(elapsed) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => {
                    warn!(
                        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                        target_ms = target.as_secs_f64() * 1000.0,
                        "OCR recognition took too long"
                    );
                    Duration::ZERO
                }
            };

            match self.shutdown.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        info!("OCR worker thread exiting...");
    }

    fn shutdown_requested(&self) -> bool {
        !matches!(self.shutdown.try_recv(), Err(TryRecvError::Empty))
    }

    /// Run one cycle, turning a panic into an ordinary cycle failure
    fn guarded_cycle(&self, config: &AppConfig) -> Result<Vec<WordDetection>> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut source = self.source.lock();
            run_cycle(config, source.as_mut(), self.recognizer.as_ref())
        }));

        outcome.unwrap_or_else(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(anyhow!("OCR cycle panicked: {}", message))
        })
    }
}
