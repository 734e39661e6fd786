//! Producer-side handle to the GPU worker thread.

use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, error, info};
use vgpu_hal::{
    ChCommandHeaderList, CommandList, CommandListProcessor, DecodeInterpreter, FramebufferConfig,
    GraphicsContext, Renderer, VAddr,
};

use crate::command::{CommandData, RegionCommand};
use crate::dispatch;
use crate::error::GpuError;
use crate::flush::FlushRequests;
use crate::queue::CommandConsumer;
use crate::synch::SynchState;

/// Name given to the worker thread.
pub const GPU_THREAD_NAME: &str = "vgpu:GPU";

/// Everything the worker takes ownership of when it starts.
pub struct GpuThreadResources {
    pub renderer: Box<dyn Renderer>,
    /// Context the worker binds before dispatching its first command.
    pub context: Box<dyn GraphicsContext>,
    pub dma_pusher: Box<dyn CommandListProcessor>,
    pub cdma_pusher: Box<dyn DecodeInterpreter>,
    pub flush_requests: Arc<FlushRequests>,
}

/// Owns the GPU worker and assigns a fence to every queued command.
///
/// All submission methods take `&self` and may be called from any number of
/// threads; fences come out unique, gap-free and in queue order.
pub struct ThreadManager {
    state: Arc<SynchState>,
    consumer: Option<CommandConsumer>,
    thread: Option<JoinHandle<()>>,
}

impl Default for ThreadManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadManager {
    pub fn new() -> Self {
        let (state, consumer) = SynchState::new();
        Self {
            state: Arc::new(state),
            consumer: Some(consumer),
            thread: None,
        }
    }

    /// Spawn the worker. Commands queued before this call are processed first.
    pub fn start_thread(&mut self, resources: GpuThreadResources) -> Result<(), GpuError> {
        let consumer = self.consumer.take().ok_or(GpuError::AlreadyStarted)?;
        let state = Arc::clone(&self.state);

        let handle = std::thread::Builder::new()
            .name(GPU_THREAD_NAME.to_string())
            .spawn(move || dispatch::run_thread(resources, state, consumer))
            .map_err(GpuError::ThreadSpawn)?;

        self.thread = Some(handle);
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.thread.is_some()
    }

    /// Queue a GPU command list.
    pub fn submit_list(&self, entries: CommandList) -> u64 {
        self.state.push_command(CommandData::SubmitCommandList(entries))
    }

    /// Queue a video-decode command buffer.
    pub fn submit_command_buffer(&self, entries: ChCommandHeaderList) -> u64 {
        self.state.push_command(CommandData::SubmitDecodeBuffer(entries))
    }

    /// Queue a present of `framebuffer`, or of the backend default.
    pub fn swap_buffers(&self, framebuffer: Option<&FramebufferConfig>) -> u64 {
        self.state
            .push_command(CommandData::SwapBuffers(framebuffer.copied()))
    }

    /// Queue a write-back of GPU caches overlapping the range.
    pub fn flush_region(&self, addr: VAddr, size: u64) -> u64 {
        self.state
            .push_command(CommandData::FlushRegion(RegionCommand::new(addr, size)))
    }

    /// Queue an invalidation of GPU caches overlapping the range.
    pub fn invalidate_region(&self, addr: VAddr, size: u64) -> u64 {
        self.state
            .push_command(CommandData::InvalidateRegion(RegionCommand::new(addr, size)))
    }

    /// Ask the worker to service pending deferred work.
    pub fn gpu_tick(&self) -> u64 {
        self.state.push_command(CommandData::GpuTick)
    }

    pub fn on_command_list_end(&self) -> u64 {
        self.state.push_command(CommandData::OnCommandListEnd)
    }

    /// Block until every command queued before this call has been processed.
    /// Returns immediately if the worker never started or has exited.
    pub fn wait_idle(&self) {
        if !self.is_started() {
            return;
        }
        self.state.wait_idle();
    }

    /// Tell a worker that has not received work yet to exit without
    /// acquiring its context. Has no effect once it is dispatching.
    pub fn cancel(&self) {
        self.state.set_running(false);
    }

    pub fn last_fence(&self) -> u64 {
        self.state.last_fence()
    }

    pub fn signaled_fence(&self) -> u64 {
        self.state.signaled_fence()
    }

    /// Queue `EndProcessing` and join the worker. Commands queued earlier are
    /// processed first; anything queued afterwards is dropped.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };

        // Notify GPU thread that a shutdown is pending.
        let fence = self.state.push_command(CommandData::EndProcessing);
        debug!("Shutting down GPU thread at fence {}", fence);

        match handle.join() {
            Ok(()) => info!("GPU thread joined"),
            Err(_) => error!("GPU thread panicked"),
        }
    }
}

impl Drop for ThreadManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
