//! GPU front end that executes every request inline on the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{info, trace};
use parking_lot::Mutex;
use vgpu_hal::{
    ChCommandHeaderList, CommandList, CommandListProcessor, FramebufferConfig, GraphicsContext,
    Rasterizer, Renderer, VAddr,
};

use super::{Gpu, GpuParts};
use crate::decoder::{DecoderFactory, DecoderSlot};
use crate::error::GpuError;
use crate::settings::Settings;
use crate::syncpoint::SyncpointManager;

pub struct SyncGpu {
    settings: Settings,
    renderer: Mutex<Box<dyn Renderer>>,
    rasterizer: Arc<dyn Rasterizer>,
    dma_pusher: Mutex<Box<dyn CommandListProcessor>>,
    context: Mutex<Option<Box<dyn GraphicsContext>>>,
    syncpoints: Arc<SyncpointManager>,
    decoder_factory: DecoderFactory,
    cdma_pusher: Mutex<DecoderSlot>,
    /// Work completes before the submitting call returns, so this is both
    /// the last issued and the last signaled fence.
    fence: AtomicU64,
}

impl SyncGpu {
    pub fn new(settings: Settings, parts: GpuParts) -> Self {
        let GpuParts {
            renderer,
            dma_pusher,
            decoder_factory,
            syncpoints,
        } = parts;

        Self {
            settings,
            rasterizer: renderer.rasterizer(),
            renderer: Mutex::new(renderer),
            dma_pusher: Mutex::new(dma_pusher),
            context: Mutex::new(None),
            syncpoints,
            decoder_factory,
            cdma_pusher: Mutex::new(DecoderSlot::Absent),
            fence: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn last_fence(&self) -> u64 {
        self.fence.load(Ordering::Acquire)
    }

    pub fn has_decoder(&self) -> bool {
        self.cdma_pusher.lock().is_active()
    }

    fn next_fence(&self) -> u64 {
        self.fence.fetch_add(1, Ordering::AcqRel) + 1
    }
}

impl Gpu for SyncGpu {
    fn start(&mut self) -> Result<(), GpuError> {
        let context = self.context.get_mut();
        if context.is_some() {
            return Err(GpuError::AlreadyStarted);
        }
        *context = Some(self.renderer.get_mut().context());
        info!("Synchronous GPU started (nvdec: {})", self.settings.use_nvdec);
        Ok(())
    }

    fn obtain_context(&self) {
        if let Some(context) = self.context.lock().as_mut() {
            context.make_current();
        }
    }

    fn release_context(&self) {
        if let Some(context) = self.context.lock().as_mut() {
            context.done_current();
        }
    }

    fn push_gpu_entries(&self, entries: CommandList) -> u64 {
        let mut dma_pusher = self.dma_pusher.lock();
        dma_pusher.push(entries);
        dma_pusher.dispatch_calls();
        self.next_fence()
    }

    fn push_command_buffer(&self, entries: ChCommandHeaderList) {
        if !self.settings.use_nvdec {
            trace!("NVDEC disabled, dropping decode buffer");
            return;
        }
        self.cdma_pusher
            .lock()
            .submit(entries, &self.decoder_factory);
    }

    fn swap_buffers(&self, framebuffer: Option<&FramebufferConfig>) -> u64 {
        self.renderer.lock().swap_buffers(framebuffer);
        self.next_fence()
    }

    fn flush_region(&self, addr: VAddr, size: u64) {
        self.rasterizer.flush_region(addr, size);
    }

    fn invalidate_region(&self, addr: VAddr, size: u64) {
        self.rasterizer.invalidate_region(addr, size);
    }

    fn flush_and_invalidate_region(&self, addr: VAddr, size: u64) {
        self.rasterizer.flush_and_invalidate_region(addr, size);
    }

    fn wait_idle(&self) {}

    fn on_command_list_end(&self) -> u64 {
        self.rasterizer.release_fences();
        self.next_fence()
    }

    fn trigger_cpu_interrupt(&self, _syncpoint_id: u32, _value: u32) {}

    fn syncpoints(&self) -> &Arc<SyncpointManager> {
        &self.syncpoints
    }
}
