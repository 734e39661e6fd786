//! Commands carried from the emulated CPU thread to the GPU worker.

use vgpu_hal::{ChCommandHeaderList, CommandList, FramebufferConfig, VAddr};

/// A guest memory range targeted by a cache operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegionCommand {
    pub addr: VAddr,
    pub size: u64,
}

impl RegionCommand {
    pub fn new(addr: VAddr, size: u64) -> Self {
        Self { addr, size }
    }
}

/// One unit of work for the GPU worker.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandData {
    /// Stop the worker loop. Never signals a fence.
    EndProcessing,
    /// Decode a GPFIFO command list and dispatch it to the backend.
    SubmitCommandList(CommandList),
    /// Interpret a video-decode command buffer.
    SubmitDecodeBuffer(ChCommandHeaderList),
    /// Present a framebuffer, or the backend default when `None`.
    SwapBuffers(Option<FramebufferConfig>),
    /// Write cached GPU data in the range back to guest memory.
    FlushRegion(RegionCommand),
    /// Drop cached GPU data in the range.
    InvalidateRegion(RegionCommand),
    /// Process pending deferred work such as flush requests.
    GpuTick,
    /// Release fences held for the command list that just ended.
    OnCommandListEnd,
}

impl CommandData {
    /// Short name for log output.
    pub fn kind(&self) -> &'static str {
        match self {
            CommandData::EndProcessing => "EndProcessing",
            CommandData::SubmitCommandList(_) => "SubmitCommandList",
            CommandData::SubmitDecodeBuffer(_) => "SubmitDecodeBuffer",
            CommandData::SwapBuffers(_) => "SwapBuffers",
            CommandData::FlushRegion(_) => "FlushRegion",
            CommandData::InvalidateRegion(_) => "InvalidateRegion",
            CommandData::GpuTick => "GpuTick",
            CommandData::OnCommandListEnd => "OnCommandListEnd",
        }
    }
}

/// A command tagged with the fence assigned when it was queued.
#[derive(Clone, Debug, PartialEq)]
pub struct CommandDataContainer {
    pub data: CommandData,
    pub fence: u64,
}

impl CommandDataContainer {
    pub fn new(data: CommandData, fence: u64) -> Self {
        Self { data, fence }
    }
}
