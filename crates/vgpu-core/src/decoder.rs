//! Lifecycle of the video-decode interpreter.
//!
//! ```text
//! Absent --buffer--> Active --sentinel--> Absent --buffer--> Active (fresh)
//! ```

use std::sync::Arc;

use log::{debug, trace};
use vgpu_hal::{ChCommandHeader, ChCommandHeaderList, DecodeInterpreter};

/// First word of a decode buffer that marks the end of a video stream.
/// Seeing it discards the interpreter and all its intermediate state.
pub const END_OF_STREAM_SENTINEL: u32 = 0xDEAD_B33F;

/// Builds a fresh interpreter for a new video stream.
pub type DecoderFactory = Arc<dyn Fn() -> Box<dyn DecodeInterpreter> + Send + Sync>;

/// Returns true if `entries` is an end-of-stream marker.
pub fn is_end_of_stream(entries: &[ChCommandHeader]) -> bool {
    entries
        .first()
        .is_some_and(|header| header.raw == END_OF_STREAM_SENTINEL)
}

/// Owns at most one decode interpreter, created lazily and reset at end of stream.
#[derive(Default)]
pub enum DecoderSlot {
    #[default]
    Absent,
    Active(Box<dyn DecodeInterpreter>),
}

impl DecoderSlot {
    pub fn is_active(&self) -> bool {
        matches!(self, DecoderSlot::Active(_))
    }

    /// Drop the current interpreter, if any.
    pub fn reset(&mut self) {
        if self.is_active() {
            debug!("Video stream ended, discarding decode interpreter");
        }
        *self = DecoderSlot::Absent;
    }

    /// Handle one submitted buffer: reset on the sentinel, otherwise interpret
    /// it on the calling thread, creating an interpreter first if needed.
    pub fn submit(&mut self, entries: ChCommandHeaderList, factory: &DecoderFactory) {
        if entries.is_empty() {
            trace!("Ignoring empty decode buffer");
            return;
        }
        if is_end_of_stream(&entries) {
            self.reset();
            return;
        }
        if let DecoderSlot::Absent = self {
            debug!("Creating decode interpreter");
            *self = DecoderSlot::Active(factory());
        }
        if let DecoderSlot::Active(interpreter) = self {
            interpreter.push(entries);
            interpreter.dispatch_calls();
        }
    }
}
