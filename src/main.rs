//! OcrSketch - Live screen OCR with paragraph merging and translation
//!
//! Captures the screen on a fixed cadence, recognizes words with tesseract,
//! merges them into paragraphs and prints each new result, optionally
//! translated.

#[cfg(test)]
#[macro_use]
extern crate quickcheck;

mod app;
mod capture;
mod config;
mod processor;
mod shared;
mod translation;
mod vision;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app::OverlayApp;
use crate::capture::CommandCapture;
use crate::config::{AppConfig, ConfigHandle};
use crate::translation::Translator;
use crate::vision::tesseract::TesseractRecognizer;

/// OcrSketch - Live screen OCR overlay
#[derive(Parser, Debug)]
#[command(name = "ocr-sketch")]
#[command(about = "Recognize on-screen text into paragraphs, optionally translated")]
struct Args {
    /// Configuration file (defaults to the per-user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log per-cycle timings and debug output
    #[arg(long)]
    debug: bool,

    /// Translate recognized paragraphs
    #[arg(long)]
    translate: bool,

    /// Run a single recognition cycle, print paragraphs as JSON and exit
    #[arg(long)]
    once: bool,

    /// Write the default configuration to the config path and exit
    #[arg(long)]
    write_default_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => config::default_config_path()?,
    };

    if args.write_default_config {
        config::save_config(&AppConfig::default(), &config_path)?;
        println!("Wrote default configuration to {}", config_path.display());
        return Ok(());
    }

    let loaded = config_path
        .exists()
        .then(|| config::load_config(&config_path));
    let handle = ConfigHandle::new(match &loaded {
        Some(Ok(config)) => config.clone(),
        _ => AppConfig::default(),
    });
    let (debug_flag, translate_flag) = (args.debug, args.translate);
    let overrides = move |config: &mut AppConfig| {
        config.general.debug_mode |= debug_flag;
        config.translation.enabled |= translate_flag;
    };
    handle.update(overrides);
    let config = handle.snapshot();

    init_logging(&config)?;
    info!("OcrSketch starting...");
    match loaded {
        Some(Ok(_)) => info!("Loaded configuration from {:?}", config_path),
        Some(Err(e)) => warn!("Ignoring invalid configuration {:?}: {:#}", config_path, e),
        None => info!("Using default configuration"),
    }

    let translator = if config.translation.enabled {
        let translator = Translator::google(&config.translation)?;
        let (source, target) = translator.languages();
        info!("Translation enabled: {} -> {}", source, target);
        Some(translator)
    } else {
        None
    };

    let source = Box::new(CommandCapture::new(&config.capture));
    let recognizer = Arc::new(TesseractRecognizer::new(config.ocr.tesseract_cmd.clone()));
    info!("Using OCR engine `{}`", recognizer.program());
    let mut app = OverlayApp::new(handle.clone(), source, recognizer, translator);

    if args.once {
        app.processor_mut().recognize_once()?;
        debug!(words = app.processor().ocr_data().len(), "One-shot recognition done");
        let paragraphs: Vec<_> = app
            .render_latest()
            .into_iter()
            .map(|r| {
                serde_json::json!({
                    "paragraph": r.paragraph,
                    "translation": r.translation,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&paragraphs)?);
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
    std::thread::Builder::new()
        .name("stdin-watch".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) if line.trim() == "r" => {
                        if let Err(e) = handle.reload_from(&config_path, overrides) {
                            warn!("Keeping current configuration: {:#}", e);
                        }
                    }
                    // Enter or a read error
                    _ => break,
                }
            }
            // Also reached on EOF
            let _ = shutdown_tx.send(());
        })
        .context("Failed to spawn stdin watcher")?;

    info!("Press Enter to stop, or type r and Enter to reload the configuration");
    app.run(shutdown_rx)?;

    info!("OcrSketch shutdown complete");
    Ok(())
}

/// `RUST_LOG` wins; otherwise the configured level, or debug in debug mode
fn init_logging(config: &AppConfig) -> Result<()> {
    let level = if config.general.debug_mode {
        "debug"
    } else {
        config.general.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}
