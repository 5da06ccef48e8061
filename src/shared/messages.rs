//! Message types for communication between the OCR processor and the renderer

/// Events published by the OCR processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrEvent {
    /// A recognition batch that differs from the previous one is available
    NewResult,
    /// The recognition worker has stopped
    Stopped,
}
