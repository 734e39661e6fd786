//! GPU front end that runs work on the GPU worker thread.
//!
//! Cache coherency follows the configured accuracy level:
//!
//! | Level   | `flush_region`                                   |
//! |---------|--------------------------------------------------|
//! | Normal  | skipped                                          |
//! | High    | queued to the worker, caller does not wait       |
//! | Extreme | caller blocks until the worker has written back  |
//!
//! Invalidation is always applied inline on the caller, ahead of any queued
//! work, since it only touches tracking state and must precede the caller's
//! next guest access.

use std::sync::Arc;

use log::{debug, info};
use parking_lot::Mutex;
use vgpu_hal::{
    ChCommandHeaderList, CommandList, CommandListProcessor, FramebufferConfig, GraphicsContext,
    Rasterizer, Renderer, VAddr,
};

use super::{Gpu, GpuParts};
use crate::decoder::{DecoderFactory, DecoderSlot};
use crate::error::GpuError;
use crate::flush::FlushRequests;
use crate::settings::{GpuAccuracy, Settings};
use crate::syncpoint::SyncpointManager;
use crate::thread::{GpuThreadResources, ThreadManager};

/// Backend pieces held until `start()` hands them to the worker.
struct PendingBackend {
    renderer: Box<dyn Renderer>,
    dma_pusher: Box<dyn CommandListProcessor>,
}

pub struct AsyncGpu {
    settings: Settings,
    gpu_thread: ThreadManager,
    rasterizer: Arc<dyn Rasterizer>,
    flush_requests: Arc<FlushRequests>,
    syncpoints: Arc<SyncpointManager>,
    decoder_factory: DecoderFactory,
    /// Decode interpreter driven inline from `push_command_buffer`.
    cdma_pusher: Mutex<DecoderSlot>,
    pending: Mutex<Option<PendingBackend>>,
    cpu_context: Mutex<Option<Box<dyn GraphicsContext>>>,
}

impl AsyncGpu {
    pub fn new(settings: Settings, parts: GpuParts) -> Self {
        let GpuParts {
            renderer,
            dma_pusher,
            decoder_factory,
            syncpoints,
        } = parts;

        Self {
            settings,
            gpu_thread: ThreadManager::new(),
            rasterizer: renderer.rasterizer(),
            flush_requests: Arc::new(FlushRequests::new()),
            syncpoints,
            decoder_factory,
            cdma_pusher: Mutex::new(DecoderSlot::Absent),
            pending: Mutex::new(Some(PendingBackend {
                renderer,
                dma_pusher,
            })),
            cpu_context: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Producer-side view of the worker, for fence queries.
    pub fn thread_manager(&self) -> &ThreadManager {
        &self.gpu_thread
    }

    /// True while a decode interpreter is alive.
    pub fn has_decoder(&self) -> bool {
        self.cdma_pusher.lock().is_active()
    }

    fn flush_region_and_wait(&self, addr: VAddr, size: u64) {
        if !self.rasterizer.must_flush_region(addr, size) {
            return;
        }
        if !self.gpu_thread.is_started() {
            // No worker to rendezvous with.
            self.rasterizer.flush_region(addr, size);
            return;
        }
        let fence = self.flush_requests.request_flush(addr, size);
        self.gpu_thread.gpu_tick();
        if !self.flush_requests.wait_for(fence) {
            debug!("GPU thread exited before flush request {} completed", fence);
        }
    }
}

impl Gpu for AsyncGpu {
    fn start(&mut self) -> Result<(), GpuError> {
        let PendingBackend {
            mut renderer,
            dma_pusher,
        } = self.pending.get_mut().take().ok_or(GpuError::AlreadyStarted)?;

        let context = renderer.context();
        let mut cpu_context = renderer.create_shared_context();
        let resources = GpuThreadResources {
            renderer,
            context,
            dma_pusher,
            cdma_pusher: (self.decoder_factory)(),
            flush_requests: Arc::clone(&self.flush_requests),
        };
        self.gpu_thread.start_thread(resources)?;

        cpu_context.make_current();
        *self.cpu_context.get_mut() = Some(cpu_context);
        info!(
            "Asynchronous GPU started (accuracy: {}, nvdec: {})",
            self.settings.gpu_accuracy, self.settings.use_nvdec
        );
        Ok(())
    }

    fn obtain_context(&self) {
        if let Some(context) = self.cpu_context.lock().as_mut() {
            context.make_current();
        }
    }

    fn release_context(&self) {
        if let Some(context) = self.cpu_context.lock().as_mut() {
            context.done_current();
        }
    }

    fn push_gpu_entries(&self, entries: CommandList) -> u64 {
        self.gpu_thread.submit_list(entries)
    }

    fn push_command_buffer(&self, entries: ChCommandHeaderList) {
        if !self.settings.use_nvdec {
            return;
        }
        // Decode runs inline on the caller rather than through the worker.
        self.cdma_pusher
            .lock()
            .submit(entries, &self.decoder_factory);
    }

    fn swap_buffers(&self, framebuffer: Option<&FramebufferConfig>) -> u64 {
        self.gpu_thread.swap_buffers(framebuffer)
    }

    fn flush_region(&self, addr: VAddr, size: u64) {
        match self.settings.gpu_accuracy {
            GpuAccuracy::Normal => {}
            GpuAccuracy::High => {
                self.gpu_thread.flush_region(addr, size);
            }
            GpuAccuracy::Extreme => self.flush_region_and_wait(addr, size),
        }
    }

    fn invalidate_region(&self, addr: VAddr, size: u64) {
        self.rasterizer.on_cpu_write(addr, size);
    }

    fn flush_and_invalidate_region(&self, addr: VAddr, size: u64) {
        // The flush half is skipped in asynchronous mode.
        self.rasterizer.on_cpu_write(addr, size);
    }

    fn wait_idle(&self) {
        self.gpu_thread.wait_idle();
    }

    fn on_command_list_end(&self) -> u64 {
        self.gpu_thread.on_command_list_end()
    }

    fn trigger_cpu_interrupt(&self, syncpoint_id: u32, value: u32) {
        self.syncpoints.raise_interrupt(syncpoint_id, value);
    }

    fn syncpoints(&self) -> &Arc<SyncpointManager> {
        &self.syncpoints
    }
}
