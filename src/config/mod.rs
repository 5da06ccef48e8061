//! Application Configuration
//!
//! User settings stored in TOML format. Every section falls back to its
//! defaults, so a partial file is a valid configuration.

use anyhow::{bail, Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Lowest accepted recognition rate
pub const MIN_FPS: f64 = 0.01;
/// Highest accepted recognition rate
pub const MAX_FPS: f64 = 1000.0;
/// Upper bound on the base translation retry delay, in seconds
pub const MAX_RETRY_DELAY_SECS: f64 = 60.0;

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// General settings
    pub general: GeneralConfig,
    /// Recognition settings
    pub ocr: OcrSettings,
    /// Screen capture settings
    pub capture: CaptureSettings,
    /// Machine translation settings
    pub translation: TranslationSettings,
}

impl AppConfig {
    /// Target duration of one recognition cycle (`1 / fps`).
    ///
    /// Non-positive or non-finite fps means 1 fps; the rate is clamped to
    /// `MIN_FPS..=MAX_FPS`.
    pub fn target_interval(&self) -> Duration {
        let fps = if self.ocr.fps.is_finite() && self.ocr.fps > 0.0 {
            self.ocr.fps.clamp(MIN_FPS, MAX_FPS)
        } else {
            1.0
        };
        Duration::from_secs_f64(1.0 / fps)
    }

    /// Interval at which the consumer polls for new results
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.ocr.poll_interval_ms.max(1))
    }

    /// Bounded wait for a graceful worker exit
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.ocr.stop_timeout_ms)
    }

    /// Reject values that would make the pipeline misbehave
    pub fn validate(&self) -> Result<()> {
        if !(0..=100).contains(&self.ocr.conf_threshold) {
            bail!("ocr.conf_threshold must be within 0..=100, got {}", self.ocr.conf_threshold);
        }
        if !(0..=100).contains(&self.ocr.par_conf_threshold) {
            bail!(
                "ocr.par_conf_threshold must be within 0..=100, got {}",
                self.ocr.par_conf_threshold
            );
        }
        if !(MIN_FPS..=MAX_FPS).contains(&self.ocr.fps) {
            bail!(
                "ocr.fps must be within {}..={}, got {}",
                MIN_FPS,
                MAX_FPS,
                self.ocr.fps
            );
        }
        if self.ocr.language.trim().is_empty() {
            bail!("ocr.language must not be empty");
        }
        if self.translation.cache_size == 0 {
            bail!("translation.cache_size must be at least 1");
        }
        if self.translation.max_retries == 0 {
            bail!("translation.max_retries must be at least 1");
        }
        if !(0.0..=MAX_RETRY_DELAY_SECS).contains(&self.translation.retry_delay_secs) {
            bail!(
                "translation.retry_delay_secs must be within 0..={}, got {}",
                MAX_RETRY_DELAY_SECS,
                self.translation.retry_delay_secs
            );
        }
        Ok(())
    }
}

/// General application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Verbose per-cycle timing logs
    pub debug_mode: bool,
    /// Log filter used when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            debug_mode: false,
            log_level: "info".to_string(),
        }
    }
}

/// Recognition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Tesseract language hint (e.g. "eng", "eng+chi_sim")
    pub language: String,
    /// Word-level keep threshold (exclusive)
    pub conf_threshold: i32,
    /// Paragraph-level keep threshold (exclusive)
    pub par_conf_threshold: i32,
    /// Target recognition cycles per second
    pub fps: f64,
    /// Path or name of the tesseract executable
    pub tesseract_cmd: String,
    /// Consumer poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Graceful stop timeout in milliseconds
    pub stop_timeout_ms: u64,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            conf_threshold: 25,
            par_conf_threshold: 50,
            fps: 2.0,
            tesseract_cmd: "tesseract".to_string(),
            poll_interval_ms: 100,
            stop_timeout_ms: 1000,
        }
    }
}

/// Capture-related settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Screenshot command; `{output}` is replaced with the PNG path
    pub command: Vec<String>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        let command: &[&str] = if cfg!(target_os = "macos") {
            &["screencapture", "-x", "-t", "png", "{output}"]
        } else {
            &["grim", "{output}"]
        };
        Self {
            command: command.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Machine translation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationSettings {
    /// Show translations under recognized paragraphs
    pub enabled: bool,
    /// Maximum number of cached translations
    pub cache_size: usize,
    /// Cached translation lifetime in seconds
    pub cache_ttl_secs: u64,
    /// Attempts per translation before giving up
    pub max_retries: u32,
    /// Base delay between attempts in seconds (multiplied by the attempt number)
    pub retry_delay_secs: f64,
    /// Source language code
    pub source_lang: String,
    /// Target language code
    pub target_lang: String,
    /// Translation endpoint
    pub endpoint: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Drop every cached translation whenever a new recognition batch arrives
    pub clear_cache_on_new_batch: bool,
}

impl TranslationSettings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Base retry delay, clamped to `0..=MAX_RETRY_DELAY_SECS`
    pub fn retry_delay(&self) -> Duration {
        let secs = if self.retry_delay_secs.is_finite() {
            self.retry_delay_secs.clamp(0.0, MAX_RETRY_DELAY_SECS)
        } else {
            0.0
        };
        Duration::from_secs_f64(secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            cache_size: 1000,
            cache_ttl_secs: 3600,
            max_retries: 3,
            retry_delay_secs: 1.0,
            source_lang: "en".to_string(),
            target_lang: "zh-cn".to_string(),
            endpoint: "https://translate.googleapis.com/translate_a/single".to_string(),
            request_timeout_secs: 10,
            clear_cache_on_new_batch: false,
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Default location of `config.toml` in the per-user configuration directory
pub fn default_config_path() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "ocrsketch", "OcrSketch")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    Ok(proj_dirs.config_dir().join("config.toml"))
}

/// Shared, observable configuration.
///
/// Components hold a clone of the handle and take a [`snapshot`](Self::snapshot)
/// whenever they need current values. Every change is pushed to all
/// subscribers.
#[derive(Clone)]
pub struct ConfigHandle {
    current: Arc<RwLock<AppConfig>>,
    subscribers: Arc<Mutex<Vec<Sender<AppConfig>>>>,
}

impl ConfigHandle {
    pub fn new(config: AppConfig) -> Self {
        Self {
            current: Arc::new(RwLock::new(config)),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Copy of the current configuration
    pub fn snapshot(&self) -> AppConfig {
        self.current.read().clone()
    }

    /// Replace the configuration and notify subscribers
    pub fn replace(&self, config: AppConfig) {
        *self.current.write() = config.clone();
        self.notify(config);
    }

    /// Modify the configuration in place and notify subscribers
    pub fn update(&self, f: impl FnOnce(&mut AppConfig)) {
        let config = {
            let mut current = self.current.write();
            f(&mut current);
            current.clone()
        };
        self.notify(config);
    }

    /// Reload from a file, keeping the current values if the file is invalid.
    ///
    /// `adjust` runs on the loaded values before they are published, so
    /// command line overrides survive a reload.
    pub fn reload_from(&self, path: &Path, adjust: impl FnOnce(&mut AppConfig)) -> Result<()> {
        let mut config = load_config(path)?;
        adjust(&mut config);
        info!("Configuration reloaded from {:?}", path);
        self.replace(config);
        Ok(())
    }

    /// Receive every future configuration change
    pub fn subscribe(&self) -> Receiver<AppConfig> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    fn notify(&self, config: AppConfig) {
        let mut subscribers = self.subscribers.lock();
        // Dropped receivers are pruned here
        subscribers.retain(|tx| tx.send(config.clone()).is_ok());
        debug!(subscribers = subscribers.len(), "Configuration change published");
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}
