//! Software rendering backend for the debug host.
//!
//! Nothing is drawn. The backend tracks which guest ranges hold GPU writes
//! not yet flushed and counts every call it receives so a run can be
//! summarized afterwards.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info, trace};
use parking_lot::Mutex;
use vgpu_hal::{
    CommandList, CommandListProcessor, FramebufferConfig, GraphicsContext, InterruptSink,
    Rasterizer, Renderer, VAddr, VideoEngine,
};

/// Call counters shared by every backend object.
#[derive(Debug, Default)]
pub struct BackendStats {
    pub lists: AtomicU64,
    pub entries: AtomicU64,
    pub swaps: AtomicU64,
    pub flushes: AtomicU64,
    pub invalidations: AtomicU64,
    pub cpu_writes: AtomicU64,
    pub fence_releases: AtomicU64,
    pub video_methods: AtomicU64,
    pub interrupts: AtomicU64,
}

impl BackendStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Display for BackendStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let get = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        writeln!(f, "  command lists:   {}", get(&self.lists))?;
        writeln!(f, "  list entries:    {}", get(&self.entries))?;
        writeln!(f, "  swaps:           {}", get(&self.swaps))?;
        writeln!(f, "  flushes:         {}", get(&self.flushes))?;
        writeln!(f, "  invalidations:   {}", get(&self.invalidations))?;
        writeln!(f, "  cpu writes:      {}", get(&self.cpu_writes))?;
        writeln!(f, "  fence releases:  {}", get(&self.fence_releases))?;
        writeln!(f, "  video methods:   {}", get(&self.video_methods))?;
        write!(f, "  interrupts:      {}", get(&self.interrupts))
    }
}

fn overlaps(a: (VAddr, u64), b: (VAddr, u64)) -> bool {
    a.0 < b.0.saturating_add(b.1) && b.0 < a.0.saturating_add(a.1)
}

/// Cache tracker holding the set of GPU-dirty guest ranges.
pub struct SoftwareRasterizer {
    dirty: Mutex<Vec<(VAddr, u64)>>,
    stats: Arc<BackendStats>,
}

impl SoftwareRasterizer {
    pub fn new(stats: Arc<BackendStats>) -> Self {
        Self {
            dirty: Mutex::new(Vec::new()),
            stats,
        }
    }

    /// Record a GPU write to the range.
    pub fn mark_gpu_write(&self, addr: VAddr, size: u64) {
        self.dirty.lock().push((addr, size));
    }

    pub fn dirty_regions(&self) -> usize {
        self.dirty.lock().len()
    }

    fn drop_overlapping(&self, addr: VAddr, size: u64) -> usize {
        let mut dirty = self.dirty.lock();
        let before = dirty.len();
        dirty.retain(|&region| !overlaps(region, (addr, size)));
        before - dirty.len()
    }
}

impl Rasterizer for SoftwareRasterizer {
    fn flush_region(&self, addr: VAddr, size: u64) {
        BackendStats::bump(&self.stats.flushes);
        let written = self.drop_overlapping(addr, size);
        trace!("Flushed {:#x}+{:#x} ({} dirty ranges)", addr, size, written);
    }

    fn invalidate_region(&self, addr: VAddr, size: u64) {
        BackendStats::bump(&self.stats.invalidations);
        self.drop_overlapping(addr, size);
    }

    fn on_cpu_write(&self, addr: VAddr, size: u64) {
        BackendStats::bump(&self.stats.cpu_writes);
        self.drop_overlapping(addr, size);
    }

    fn must_flush_region(&self, addr: VAddr, size: u64) -> bool {
        self.dirty
            .lock()
            .iter()
            .any(|&region| overlaps(region, (addr, size)))
    }

    fn release_fences(&self) {
        BackendStats::bump(&self.stats.fence_releases);
    }
}

/// Context that only logs its binding.
pub struct SoftwareContext {
    name: &'static str,
}

impl GraphicsContext for SoftwareContext {
    fn make_current(&mut self) {
        debug!("{} context bound", self.name);
    }

    fn done_current(&mut self) {
        debug!("{} context released", self.name);
    }
}

pub struct SoftwareRenderer {
    rasterizer: Arc<SoftwareRasterizer>,
    stats: Arc<BackendStats>,
}

impl SoftwareRenderer {
    pub fn new(rasterizer: Arc<SoftwareRasterizer>, stats: Arc<BackendStats>) -> Self {
        Self { rasterizer, stats }
    }
}

impl Renderer for SoftwareRenderer {
    fn swap_buffers(&mut self, framebuffer: Option<&FramebufferConfig>) {
        BackendStats::bump(&self.stats.swaps);
        match framebuffer {
            Some(fb) => trace!("Present {}x{} at {:#x}", fb.width, fb.height, fb.address),
            None => trace!("Present default target"),
        }
    }

    fn rasterizer(&self) -> Arc<dyn Rasterizer> {
        self.rasterizer.clone()
    }

    fn context(&mut self) -> Box<dyn GraphicsContext> {
        Box::new(SoftwareContext { name: "GPU" })
    }

    fn create_shared_context(&self) -> Box<dyn GraphicsContext> {
        Box::new(SoftwareContext { name: "CPU" })
    }
}

/// Command-list decoder that treats every entry as a GPU write of its method block.
pub struct SoftwareDmaPusher {
    queue: VecDeque<CommandList>,
    rasterizer: Arc<SoftwareRasterizer>,
    stats: Arc<BackendStats>,
}

impl SoftwareDmaPusher {
    pub fn new(rasterizer: Arc<SoftwareRasterizer>, stats: Arc<BackendStats>) -> Self {
        Self {
            queue: VecDeque::new(),
            rasterizer,
            stats,
        }
    }
}

impl CommandListProcessor for SoftwareDmaPusher {
    fn push(&mut self, entries: CommandList) {
        self.queue.push_back(entries);
    }

    fn dispatch_calls(&mut self) {
        while let Some(list) = self.queue.pop_front() {
            BackendStats::bump(&self.stats.lists);
            for header in &list {
                BackendStats::bump(&self.stats.entries);
                self.rasterizer
                    .mark_gpu_write(header.address(), u64::from(header.size()) * 4);
            }
        }
    }
}

/// Video engine that only counts methods.
pub struct NullVideoEngine {
    name: &'static str,
    stats: Arc<BackendStats>,
}

impl NullVideoEngine {
    pub fn new(name: &'static str, stats: Arc<BackendStats>) -> Self {
        Self { name, stats }
    }
}

impl VideoEngine for NullVideoEngine {
    fn process_method(&mut self, method: u32, argument: u32) {
        BackendStats::bump(&self.stats.video_methods);
        trace!("{} method {:#x} = {:#x}", self.name, method, argument);
    }
}

pub struct LoggingInterruptSink {
    stats: Arc<BackendStats>,
}

impl LoggingInterruptSink {
    pub fn new(stats: Arc<BackendStats>) -> Self {
        Self { stats }
    }
}

impl InterruptSink for LoggingInterruptSink {
    fn gpu_interrupt_syncpt(&self, syncpoint_id: u32, value: u32) {
        BackendStats::bump(&self.stats.interrupts);
        info!("Sync point {} interrupt at value {}", syncpoint_id, value);
    }
}
