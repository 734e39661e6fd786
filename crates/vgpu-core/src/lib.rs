//! Asynchronous GPU command submission.
//!
//! Emulated-CPU threads submit work through a [`Gpu`] front end. In
//! asynchronous mode each submission is tagged with a monotonically
//! increasing fence and queued to a single GPU worker thread, which executes
//! commands in fence order against the backend collaborators defined in
//! `vgpu_hal` and publishes each fence once its effects are complete.

pub mod cdma;
pub mod command;
pub mod decoder;
mod dispatch;
pub mod error;
pub mod fence;
pub mod flush;
pub mod gpu;
pub mod queue;
pub mod settings;
pub mod synch;
pub mod syncpoint;
pub mod thread;

pub use cdma::CdmaPusher;
pub use command::{CommandData, CommandDataContainer, RegionCommand};
pub use decoder::{DecoderFactory, DecoderSlot, END_OF_STREAM_SENTINEL};
pub use error::GpuError;
pub use gpu::{create_gpu, AsyncGpu, Gpu, GpuParts, SyncGpu};
pub use settings::{GpuAccuracy, Settings};
pub use synch::SynchState;
pub use syncpoint::{SyncpointManager, MAX_SYNCPOINTS};
pub use thread::{GpuThreadResources, ThreadManager, GPU_THREAD_NAME};
