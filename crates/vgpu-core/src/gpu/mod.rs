//! Public GPU interface used by the emulated CPU side.
//!
//! Two implementations: [`AsyncGpu`] runs commands on a dedicated worker
//! thread, [`SyncGpu`] runs everything inline on the caller.

pub mod async_gpu;
pub mod sync_gpu;

use std::sync::Arc;

use vgpu_hal::{
    ChCommandHeaderList, CommandList, CommandListProcessor, FramebufferConfig, Renderer, VAddr,
};

use crate::decoder::DecoderFactory;
use crate::error::GpuError;
use crate::settings::Settings;
use crate::syncpoint::SyncpointManager;

pub use async_gpu::AsyncGpu;
pub use sync_gpu::SyncGpu;

/// Backend pieces a GPU front end is built from.
pub struct GpuParts {
    pub renderer: Box<dyn Renderer>,
    pub dma_pusher: Box<dyn CommandListProcessor>,
    /// Builds a decode interpreter for each new video stream.
    pub decoder_factory: DecoderFactory,
    pub syncpoints: Arc<SyncpointManager>,
}

/// GPU front end driven by the emulated CPU.
///
/// Submission methods return a fence: once the implementation reports that
/// fence as signaled, the submission's effects are complete.
pub trait Gpu: Send + Sync {
    /// Bring up the backend. Must be called once before submitting work.
    fn start(&mut self) -> Result<(), GpuError>;

    /// Bind the CPU-side graphics context to the calling thread.
    fn obtain_context(&self);

    /// Unbind the CPU-side graphics context.
    fn release_context(&self);

    /// Submit a GPU command list.
    fn push_gpu_entries(&self, entries: CommandList) -> u64;

    /// Submit a video-decode command buffer.
    fn push_command_buffer(&self, entries: ChCommandHeaderList);

    /// Present `framebuffer`, or the backend default.
    fn swap_buffers(&self, framebuffer: Option<&FramebufferConfig>) -> u64;

    /// Make GPU writes to the range visible to the guest.
    fn flush_region(&self, addr: VAddr, size: u64);

    /// Make guest writes to the range visible to the GPU.
    fn invalidate_region(&self, addr: VAddr, size: u64);

    fn flush_and_invalidate_region(&self, addr: VAddr, size: u64);

    /// Block until all submitted work has completed.
    fn wait_idle(&self);

    fn on_command_list_end(&self) -> u64;

    /// Raise the guest interrupt for `syncpoint_id` reaching `value`.
    fn trigger_cpu_interrupt(&self, syncpoint_id: u32, value: u32);

    fn syncpoints(&self) -> &Arc<SyncpointManager>;
}

/// Build the front end selected by `settings`.
pub fn create_gpu(settings: Settings, parts: GpuParts) -> Box<dyn Gpu> {
    if settings.use_asynchronous_gpu {
        Box::new(AsyncGpu::new(settings, parts))
    } else {
        Box::new(SyncGpu::new(settings, parts))
    }
}
