//! Streaming completion consumption.

pub mod consumer;
pub mod lines;

pub use consumer::{DATA_MARKER, DONE_SENTINEL, FragmentStream, consume};
pub use lines::LineBuffer;
