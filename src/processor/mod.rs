//! OCR Processor
//!
//! Owns the recognition worker's lifecycle and the consumer side of the
//! result slot. The consumer calls [`OcrProcessor::poll`] on a fixed
//! interval; when a batch that differs from the last one arrives it is
//! stored and an [`OcrEvent::NewResult`] is published for the renderer.

pub mod slot;
pub mod worker;

use anyhow::Result;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::capture::FrameSource;
use crate::config::ConfigHandle;
use crate::shared::{OcrEvent, ProcessorState, RuntimeStats};
use crate::vision::{aggregate_paragraphs, Paragraph, Recognizer, WordDetection};

pub use slot::LatestSlot;
use worker::RecognitionWorker;

#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("OCR processor is already running")]
    AlreadyRunning,
    #[error("OCR worker from the previous run has not exited yet")]
    StillStopping,
    #[error("Failed to spawn OCR worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Source of the most recent paragraph-level OCR result
pub trait OcrDataProvider {
    fn merged_ocr_data(&self) -> Vec<Paragraph>;
}

/// Handles to a running worker thread
struct WorkerHandle {
    thread: JoinHandle<()>,
    shutdown: Sender<()>,
    done: Receiver<()>,
}

impl WorkerHandle {
    /// Wait up to `timeout` for the worker thread to finish
    fn wait_for_exit(&self, timeout: Duration) -> bool {
        matches!(
            self.done.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }
}

/// Recognition loop orchestrator
pub struct OcrProcessor {
    config: ConfigHandle,
    source: Arc<Mutex<Box<dyn FrameSource>>>,
    recognizer: Arc<dyn Recognizer>,
    slot: LatestSlot<Vec<WordDetection>>,
    stats: Arc<Mutex<RuntimeStats>>,
    events: Sender<OcrEvent>,
    state: ProcessorState,
    worker: Option<WorkerHandle>,
    /// Last batch handed to the renderer
    ocr_data: Vec<WordDetection>,
}

impl OcrProcessor {
    /// Create a stopped processor
    pub fn new(
        config: ConfigHandle,
        source: Box<dyn FrameSource>,
        recognizer: Arc<dyn Recognizer>,
        events: Sender<OcrEvent>,
    ) -> Self {
        Self {
            config,
            source: Arc::new(Mutex::new(source)),
            recognizer,
            slot: LatestSlot::new(),
            stats: Arc::new(Mutex::new(RuntimeStats::default())),
            events,
            state: ProcessorState::Stopped,
            worker: None,
            ocr_data: Vec::new(),
        }
    }

    /// Spawn the recognition worker.
    ///
    /// Each run publishes into its own slot, so nothing from an earlier run
    /// can reach the consumer.
    pub fn start(&mut self) -> Result<(), ProcessorError> {
        self.reap_detached_worker();
        match self.state {
            ProcessorState::Stopped => {}
            ProcessorState::Running => return Err(ProcessorError::AlreadyRunning),
            ProcessorState::Stopping => return Err(ProcessorError::StillStopping),
        }

        self.slot = LatestSlot::new();
        let (shutdown_tx, shutdown_rx) = bounded(1);
        let (done_tx, done_rx) = bounded(0);
        let worker = RecognitionWorker {
            config: self.config.clone(),
            source: Arc::clone(&self.source),
            recognizer: Arc::clone(&self.recognizer),
            slot: self.slot.clone(),
            stats: Arc::clone(&self.stats),
            shutdown: shutdown_rx,
            _done: done_tx,
        };

        let thread = std::thread::Builder::new()
            .name("ocr-worker".to_string())
            .spawn(move || worker.run())?;

        self.worker = Some(WorkerHandle {
            thread,
            shutdown: shutdown_tx,
            done: done_rx,
        });
        self.state = ProcessorState::Running;

        let config = self.config.snapshot();
        info!(
            fps = config.ocr.fps,
            language = %config.ocr.language,
            "OCR processor started"
        );
        Ok(())
    }

    /// Non-blocking check for a new batch.
    ///
    /// Returns `true` and publishes [`OcrEvent::NewResult`] when the pending
    /// batch differs from the last one seen.
    pub fn poll(&mut self) -> bool {
        self.reap_detached_worker();
        let Some(batch) = self.slot.take() else {
            return false;
        };
        if batch == self.ocr_data {
            return false;
        }

        self.ocr_data = batch;
        let _ = self.events.send(OcrEvent::NewResult);
        true
    }

    /// Stop the worker, forcing it down if it does not exit in time.
    ///
    /// Safe to call repeatedly and before [`start`](Self::start). A worker
    /// that ignores both the stop request and the abort is detached; the
    /// processor stays [`ProcessorState::Stopping`] until that thread exits.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            self.state = ProcessorState::Stopped;
            return;
        };

        if self.state == ProcessorState::Running {
            info!("Stopping OCR recognition worker...");
            self.state = ProcessorState::Stopping;
            let _ = worker.shutdown.try_send(());
        }

        let timeout = self.config.snapshot().stop_timeout();
        if worker.wait_for_exit(timeout) {
            let _ = worker.thread.join();
            info!("OCR worker stopped");
        } else {
            // Kill the engine run the worker is blocked on
            self.recognizer.abort();
            if !worker.wait_for_exit(timeout) {
                warn!(
                    "OCR worker did not respond within {:?}; detaching thread, cleanup may not have run",
                    timeout.saturating_mul(2)
                );
                self.slot.take();
                self.worker = Some(worker);
                return;
            }
            let _ = worker.thread.join();
            warn!("OCR worker was forcibly terminated; capture and recognition cleanup may not have run");
        }

        self.finish_stop();
    }

    /// Complete a stop whose detached worker has since exited
    fn reap_detached_worker(&mut self) {
        if self.state != ProcessorState::Stopping {
            return;
        }
        let exited = self
            .worker
            .as_ref()
            .map_or(true, |w| w.thread.is_finished());
        if !exited {
            return;
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.thread.join();
        }
        info!("Detached OCR worker has exited");
        self.finish_stop();
    }

    fn finish_stop(&mut self) {
        // Unconsumed results die with the run
        self.slot.take();
        self.state = ProcessorState::Stopped;
        let _ = self.events.send(OcrEvent::Stopped);
    }

    /// Current lifecycle state; a detached worker that has exited counts as stopped
    pub fn state(&self) -> ProcessorState {
        match (&self.state, &self.worker) {
            (ProcessorState::Stopping, Some(w)) if w.thread.is_finished() => ProcessorState::Stopped,
            (state, _) => *state,
        }
    }

    /// Whether the worker thread is alive
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .map(|w| !w.thread.is_finished())
            .unwrap_or(false)
    }

    pub fn stats(&self) -> RuntimeStats {
        self.stats.lock().clone()
    }

    /// Interval at which [`poll`](Self::poll) should be driven
    pub fn poll_interval(&self) -> Duration {
        self.config.snapshot().poll_interval()
    }

    /// Most recent word-level batch
    pub fn ocr_data(&self) -> Vec<WordDetection> {
        self.ocr_data.clone()
    }

    /// Run one cycle on the calling thread and store its result
    pub fn recognize_once(&mut self) -> Result<Vec<Paragraph>> {
        let config = self.config.snapshot();
        let words = {
            let mut source = self.source.lock();
            worker::run_cycle(&config, source.as_mut(), self.recognizer.as_ref())?
        };
        self.ocr_data = words;
        Ok(self.merged_ocr_data())
    }
}

impl OcrDataProvider for OcrProcessor {
    /// Most recent batch merged into paragraphs
    fn merged_ocr_data(&self) -> Vec<Paragraph> {
        let threshold = self.config.snapshot().ocr.par_conf_threshold;
        aggregate_paragraphs(&self.ocr_data, threshold)
    }
}

impl Drop for OcrProcessor {
    fn drop(&mut self) {
        self.stop();
    }
}
