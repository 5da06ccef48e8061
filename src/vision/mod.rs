//! Vision/OCR Layer
//!
//! Turns captured frames into word-level detections and merges those into
//! paragraphs. Recognition goes through the [`Recognizer`] trait; the
//! shipped backend drives the Tesseract command line.

pub mod paragraphs;
pub mod tesseract;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::frame::CapturedFrame;

pub use paragraphs::aggregate_paragraphs;
pub use tesseract::TesseractRecognizer;

/// Grouping key of a paragraph: `(page_num, block_num, par_num)`
pub type ParagraphKey = (u32, u32, u32);

/// One recognized token in screen coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordDetection {
    pub text: String,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    /// Confidence score (0 - 100)
    pub conf: f32,
    pub page_num: u32,
    pub block_num: u32,
    pub par_num: u32,
    pub line_num: u32,
    pub word_num: u32,
}

impl WordDetection {
    /// Paragraph this word belongs to
    pub fn paragraph_key(&self) -> ParagraphKey {
        (self.page_num, self.block_num, self.par_num)
    }

    /// Position in reading order within its paragraph
    pub fn reading_order(&self) -> (u32, u32) {
        (self.line_num, self.word_num)
    }

    pub fn right(&self) -> i32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height
    }

    /// First-stage noise gate: confident and not blank
    pub fn passes_filter(&self, conf_threshold: i32) -> bool {
        self.conf > conf_threshold as f32 && !self.text.trim().is_empty()
    }
}

/// Paragraph-level aggregation of word detections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    pub page_num: u32,
    pub block_num: u32,
    pub par_num: u32,
    /// Member words joined with single spaces in reading order
    pub text: String,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    /// Mean confidence of the member words
    pub conf: f64,
}

impl Paragraph {
    pub fn key(&self) -> ParagraphKey {
        (self.page_num, self.block_num, self.par_num)
    }

    /// Bounding box as (x, y, width, height)
    pub fn bounds(&self) -> (i32, i32, i32, i32) {
        (self.left, self.top, self.width, self.height)
    }
}

#[derive(Error, Debug)]
pub enum RecognizeError {
    #[error("Captured frame is not a valid image")]
    InvalidFrame,
    #[error("Failed to prepare OCR input: {0}")]
    Input(String),
    #[error("Failed to execute OCR engine `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("OCR engine failed: {0}")]
    Engine(String),
    #[error("OCR run was aborted")]
    Aborted,
}

/// OCR engine producing word-level detections
pub trait Recognizer: Send + Sync {
    /// Recognize all words in a frame. Blocks for the duration of the engine run.
    fn recognize(
        &self,
        frame: &CapturedFrame,
        language: &str,
    ) -> Result<Vec<WordDetection>, RecognizeError>;

    /// Cancel an in-flight [`recognize`](Self::recognize) call from another thread
    fn abort(&self) {}
}

/// Drop words at or below the word-level threshold and blank tokens
pub fn filter_words(words: Vec<WordDetection>, conf_threshold: i32) -> Vec<WordDetection> {
    words
        .into_iter()
        .filter(|w| w.passes_filter(conf_threshold))
        .collect()
}

#[cfg(test)]
pub(crate) fn word(
    text: &str,
    conf: f32,
    bounds: (i32, i32, i32, i32),
    position: (u32, u32, u32, u32, u32),
) -> WordDetection {
    WordDetection {
        text: text.to_string(),
        left: bounds.0,
        top: bounds.1,
        width: bounds.2,
        height: bounds.3,
        conf,
        page_num: position.0,
        block_num: position.1,
        par_num: position.2,
        line_num: position.3,
        word_num: position.4,
    }
}
