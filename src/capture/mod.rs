//! Screen Capture Layer
//!
//! Grabs the screen through an external screenshot command. This is a
//! read-only operation: the command writes a PNG which is decoded into an
//! RGBA frame.

pub mod frame;

use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::debug;

use crate::config::CaptureSettings;
use frame::CapturedFrame;

/// Placeholder in the capture command replaced with the output path
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Capture command is empty")]
    EmptyCommand,
    #[error("Failed to create temporary file: {0}")]
    TempFile(std::io::Error),
    #[error("Failed to execute capture command `{program}`: {source}")]
    CommandExecution {
        program: String,
        source: std::io::Error,
    },
    #[error("Capture command failed: {0}")]
    CommandFailed(String),
    #[error("Failed to decode screenshot: {0}")]
    Decode(#[from] image::ImageError),
}

/// Anything that can produce screen frames
pub trait FrameSource: Send {
    fn capture(&mut self) -> Result<CapturedFrame, CaptureError>;
}

/// Screen capture via an external screenshot command
#[derive(Debug, Clone)]
pub struct CommandCapture {
    command: Vec<String>,
}

impl CommandCapture {
    /// Create a new screen capture instance
    pub fn new(settings: &CaptureSettings) -> Self {
        Self {
            command: settings.command.clone(),
        }
    }

    /// Build the argv for one capture into `output`
    fn argv(&self, output: &Path) -> Result<(String, Vec<String>), CaptureError> {
        let (program, args) = self.command.split_first().ok_or(CaptureError::EmptyCommand)?;
        let output = output.to_string_lossy();
        let mut args: Vec<String> = args
            .iter()
            .map(|arg| arg.replace(OUTPUT_PLACEHOLDER, &output))
            .collect();
        if !self.command.iter().any(|arg| arg.contains(OUTPUT_PLACEHOLDER)) {
            args.push(output.into_owned());
        }
        Ok((program.clone(), args))
    }
}

impl FrameSource for CommandCapture {
    fn capture(&mut self) -> Result<CapturedFrame, CaptureError> {
        let temp = tempfile::Builder::new()
            .prefix("ocr-sketch-capture-")
            .suffix(".png")
            .tempfile()
            .map_err(CaptureError::TempFile)?;
        let (program, args) = self.argv(temp.path())?;

        let output = Command::new(&program)
            .args(&args)
            .output()
            .map_err(|source| CaptureError::CommandExecution {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                format!("{} exited with {}", program, output.status)
            } else {
                format!("{}: {}", program, stderr.trim())
            };
            return Err(CaptureError::CommandFailed(message));
        }

        let image = image::open(temp.path())?.into_rgba8();
        let frame = CapturedFrame::from_rgba(image);
        debug!(width = frame.width, height = frame.height, "Screen captured");
        Ok(frame)
    }
}
