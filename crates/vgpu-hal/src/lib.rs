#![no_std]
//! Collaborator contracts for the vgpu command-submission core.
//!
//! Everything the core drives but does not implement lives behind these
//! traits: the rendering backend, its GPU contexts, the command-list decoder,
//! the video-decode interpreter and the guest interrupt controller.

extern crate alloc;

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

/// Guest virtual address.
pub type VAddr = u64;

/// GPU virtual address.
pub type GpuVAddr = u64;

/// One GPFIFO entry: a pointer to a block of GPU methods in guest memory.
///
/// Layout: [39:0]=address, [41]=is_non_main, [62:42]=size in words.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CommandListHeader(pub u64);

impl CommandListHeader {
    /// Build a header from its fields. Out-of-range bits are masked off.
    pub fn new(address: GpuVAddr, size: u32, is_non_main: bool) -> Self {
        let raw = (address & 0xFF_FFFF_FFFF)
            | ((is_non_main as u64) << 41)
            | (((size as u64) & 0x1F_FFFF) << 42);
        Self(raw)
    }

    /// GPU address of the method block.
    pub fn address(&self) -> GpuVAddr {
        self.0 & 0xFF_FFFF_FFFF
    }

    /// True when the block belongs to a non-main (subroutine) stream.
    pub fn is_non_main(&self) -> bool {
        (self.0 >> 41) & 1 != 0
    }

    /// Number of 32-bit words in the method block.
    pub fn size(&self) -> u32 {
        ((self.0 >> 42) & 0x1F_FFFF) as u32
    }
}

/// A batch of GPFIFO entries submitted together.
pub type CommandList = Vec<CommandListHeader>;

/// One 32-bit word of a host1x channel command stream (video decode path).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ChCommandHeader {
    pub raw: u32,
}

impl ChCommandHeader {
    pub const fn new(raw: u32) -> Self {
        Self { raw }
    }
}

/// A buffer of host1x channel words submitted together.
pub type ChCommandHeaderList = Vec<ChCommandHeader>;

/// Pixel layouts a guest framebuffer may use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PixelFormat {
    #[default]
    Abgr8,
    Rgb565,
    Bgra8,
}

/// Crop rectangle in framebuffer pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

/// Description of a guest framebuffer to present.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FramebufferConfig {
    pub address: VAddr,
    pub offset: u32,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub pixel_format: PixelFormat,
    /// Flip/rotate flags as written by the guest compositor.
    pub transform_flags: u32,
    pub crop_rect: Rect,
}

/// A host graphics context that can be bound to the calling thread.
pub trait GraphicsContext: Send {
    /// Bind the context to the current thread.
    fn make_current(&mut self);

    /// Unbind the context from the current thread.
    fn done_current(&mut self);
}

/// Cache-tracking half of the rendering backend.
///
/// Shared between the GPU worker and the emulated CPU thread, so every method
/// takes `&self`; implementations synchronize internally.
pub trait Rasterizer: Send + Sync {
    /// Write any GPU-cached data overlapping the range back to guest memory.
    fn flush_region(&self, addr: VAddr, size: u64);

    /// Drop cached data overlapping the range.
    fn invalidate_region(&self, addr: VAddr, size: u64);

    /// Notify the tracker that the guest CPU wrote the range.
    fn on_cpu_write(&self, addr: VAddr, size: u64);

    /// Flush then invalidate the range.
    fn flush_and_invalidate_region(&self, addr: VAddr, size: u64) {
        self.flush_region(addr, size);
        self.invalidate_region(addr, size);
    }

    /// Returns true if the range may hold GPU writes not yet visible to the guest.
    /// Called from the CPU thread.
    fn must_flush_region(&self, addr: VAddr, size: u64) -> bool;

    /// Release fences held for the command list that just finished.
    fn release_fences(&self);
}

/// Presentation half of the rendering backend. Owned by the GPU worker once started.
pub trait Renderer: Send {
    /// Present `framebuffer`, or the backend's default target when `None`.
    fn swap_buffers(&mut self, framebuffer: Option<&FramebufferConfig>);

    /// The backend's cache tracker.
    fn rasterizer(&self) -> Arc<dyn Rasterizer>;

    /// The context the GPU worker renders with.
    fn context(&mut self) -> Box<dyn GraphicsContext>;

    /// A second context sharing objects with the main one, for the CPU thread.
    fn create_shared_context(&self) -> Box<dyn GraphicsContext>;
}

/// Decoder for the main GPU command-list stream.
pub trait CommandListProcessor: Send {
    /// Queue a list for decoding.
    fn push(&mut self, entries: CommandList);

    /// Decode every queued list and issue the resulting calls to the backend.
    fn dispatch_calls(&mut self);
}

/// Interpreter for the secondary (video decode) command stream.
pub trait DecodeInterpreter: Send {
    /// Queue a buffer for interpretation.
    fn push(&mut self, entries: ChCommandHeaderList);

    /// Interpret every queued buffer.
    fn dispatch_calls(&mut self);
}

/// A fixed-function video engine (decoder or image compositor) fed by the
/// decode interpreter.
pub trait VideoEngine: Send {
    /// Execute `method` with a single argument word.
    fn process_method(&mut self, method: u32, argument: u32);
}

/// Guest interrupt controller.
pub trait InterruptSink: Send + Sync {
    /// Raise the GPU sync-point interrupt for `syncpoint_id` reaching `value`.
    fn gpu_interrupt_syncpt(&self, syncpoint_id: u32, value: u32);
}
