//! Shared state and messaging between the recognition worker and the renderer
//!
//! This module provides the events published to the rendering side and the
//! runtime bookkeeping both sides can read.

pub mod messages;
pub mod state;

pub use messages::OcrEvent;
pub use state::{ProcessorState, RuntimeStats};
