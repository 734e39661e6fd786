//! Emulation settings that shape GPU pipeline behavior.

use core::fmt;
use core::str::FromStr;

/// Accuracy level for guest-visible GPU cache coherency.
///
/// Higher levels trade CPU-thread latency for fresher guest memory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GpuAccuracy {
    /// Region flushes are skipped; the guest may read stale GPU output.
    #[default]
    Normal,
    /// Region flushes are queued to the GPU thread without waiting.
    High,
    /// Region flushes block the caller until the GPU thread has written back.
    Extreme,
}

impl GpuAccuracy {
    pub fn is_level_high(self) -> bool {
        self >= GpuAccuracy::High
    }

    pub fn is_level_extreme(self) -> bool {
        self == GpuAccuracy::Extreme
    }
}

impl fmt::Display for GpuAccuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GpuAccuracy::Normal => "normal",
            GpuAccuracy::High => "high",
            GpuAccuracy::Extreme => "extreme",
        };
        f.write_str(name)
    }
}

/// Returned when parsing an unknown accuracy level name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown GPU accuracy level: {0}")]
pub struct ParseAccuracyError(pub String);

impl FromStr for GpuAccuracy {
    type Err = ParseAccuracyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(GpuAccuracy::Normal),
            "high" => Ok(GpuAccuracy::High),
            "extreme" => Ok(GpuAccuracy::Extreme),
            _ => Err(ParseAccuracyError(s.to_string())),
        }
    }
}

/// GPU-related emulation settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Settings {
    pub gpu_accuracy: GpuAccuracy,
    /// Run GPU commands on a dedicated worker thread.
    pub use_asynchronous_gpu: bool,
    /// Interpret video-decode command buffers.
    pub use_nvdec: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gpu_accuracy: GpuAccuracy::Normal,
            use_asynchronous_gpu: true,
            use_nvdec: true,
        }
    }
}
