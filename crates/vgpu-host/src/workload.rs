//! Synthetic submission pattern.

use log::{debug, info};
use vgpu_core::cdma::thi::ThiMethod;
use vgpu_core::cdma::ChClassId;
use vgpu_core::{Gpu, END_OF_STREAM_SENTINEL};
use vgpu_hal::{
    ChCommandHeader, ChCommandHeaderList, CommandList, CommandListHeader, FramebufferConfig,
};

/// Guest address the synthetic command lists write to.
const WORK_BASE: u64 = 0x1_0000_0000;
/// Bytes covered by one command list.
const LIST_STRIDE: u64 = 0x1_0000;
/// Words per GPFIFO entry.
const ENTRY_WORDS: u32 = 64;
/// Sync point the decode stream increments.
const DECODE_SYNCPOINT: u32 = 4;
/// Command lists between presents.
const LISTS_PER_FRAME: usize = 8;

pub struct Report {
    pub submissions: u64,
    pub last_fence: u64,
    pub syncpoint_value: u32,
}

fn command_list(index: usize, entries: usize) -> CommandList {
    let base = WORK_BASE + index as u64 * LIST_STRIDE;
    (0..entries)
        .map(|entry| {
            let address = base + entry as u64 * u64::from(ENTRY_WORDS) * 4;
            CommandListHeader::new(address, ENTRY_WORDS, false)
        })
        .collect()
}

fn words(raw: &[u32]) -> ChCommandHeaderList {
    raw.iter().copied().map(ChCommandHeader::new).collect()
}

/// One decode frame: bind NVDEC, write a method through the THI registers,
/// then bump `DECODE_SYNCPOINT` immediately.
fn decode_frame(method: u32, argument: u32) -> ChCommandHeaderList {
    let set_class = ChClassId::NvDec.raw() << 6;
    let write_methods = (1 << 28) | ((ThiMethod::SetMethod0 as u32) << 16) | 2;
    let inc_syncpt = (4 << 28) | ((ThiMethod::IncSyncpt as u32) << 16) | DECODE_SYNCPOINT;
    words(&[set_class, write_methods, method, argument, inc_syncpt])
}

pub fn run(gpu: &dyn Gpu, lists: usize, entries_per_list: usize) -> Report {
    let mut submissions = 0u64;
    let mut last_fence = 0u64;

    let decode_frames = lists.div_ceil(LISTS_PER_FRAME).max(1) as u32;
    let target = gpu.syncpoints().value(DECODE_SYNCPOINT) + decode_frames;
    gpu.syncpoints().register_interrupt(DECODE_SYNCPOINT, target);

    let framebuffer = FramebufferConfig {
        address: WORK_BASE,
        width: 1280,
        height: 720,
        stride: 1280,
        ..Default::default()
    };

    for index in 0..lists {
        last_fence = gpu.push_gpu_entries(command_list(index, entries_per_list));
        submissions += 1;

        let base = WORK_BASE + index as u64 * LIST_STRIDE;
        gpu.invalidate_region(base + LIST_STRIDE / 2, 0x100);

        if (index + 1) % LISTS_PER_FRAME == 0 {
            gpu.on_command_list_end();
            last_fence = gpu.swap_buffers(Some(&framebuffer));
            gpu.flush_region(base, LIST_STRIDE);
            gpu.push_command_buffer(decode_frame(0x400, index as u32));
            submissions += 3;
            debug!("Frame submitted at fence {}", last_fence);
        }
    }

    // Trailing partial frame, or the only frame for tiny runs.
    if lists % LISTS_PER_FRAME != 0 || lists == 0 {
        last_fence = gpu.swap_buffers(None);
        gpu.push_command_buffer(decode_frame(0x400, lists as u32));
        submissions += 2;
    }

    gpu.flush_and_invalidate_region(WORK_BASE, LIST_STRIDE);
    gpu.push_command_buffer(words(&[END_OF_STREAM_SENTINEL]));

    let syncpoint_value = gpu.syncpoints().value(DECODE_SYNCPOINT);
    info!(
        "Workload queued: {} lists, decode sync point at {}/{}",
        lists, syncpoint_value, target
    );

    Report {
        submissions,
        last_fence,
        syncpoint_value,
    }
}
