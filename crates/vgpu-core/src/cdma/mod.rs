//! Channel-DMA interpreter for the video-decode command stream.
//!
//! Decodes host1x channel words into method writes and routes them to the
//! NVDEC, VIC and host1x classes. Sync-point increments requested by the
//! stream land through [`SyncpointManager`].

pub mod host1x;
pub mod syncpt_incr;
pub mod thi;

use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, trace, warn};
use vgpu_hal::{ChCommandHeaderList, DecodeInterpreter, VideoEngine};

use crate::decoder::DecoderFactory;
use crate::syncpoint::SyncpointManager;
use host1x::Host1x;
use syncpt_incr::SyncptIncrManager;
use thi::{ThiMethod, ThiRegisters};

/// Engine class a channel stream is currently addressing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChClassId {
    #[default]
    NoClass,
    Host1x,
    VideoEncodeMpeg,
    VideoEncodeNvEnc,
    VideoStreamingVi,
    VideoStreamingIsp,
    VideoStreamingIspB,
    VideoStreamingViI2c,
    GraphicsVic,
    Graphics3D,
    GraphicsGpu,
    Tsec,
    TsecB,
    NvJpg,
    NvDec,
    Unknown(u32),
}

impl From<u32> for ChClassId {
    fn from(raw: u32) -> Self {
        match raw {
            0x00 => ChClassId::NoClass,
            0x01 => ChClassId::Host1x,
            0x20 => ChClassId::VideoEncodeMpeg,
            0x21 => ChClassId::VideoEncodeNvEnc,
            0x30 => ChClassId::VideoStreamingVi,
            0x32 => ChClassId::VideoStreamingIsp,
            0x34 => ChClassId::VideoStreamingIspB,
            0x36 => ChClassId::VideoStreamingViI2c,
            0x5d => ChClassId::GraphicsVic,
            0x60 => ChClassId::Graphics3D,
            0x61 => ChClassId::GraphicsGpu,
            0xe0 => ChClassId::Tsec,
            0xe1 => ChClassId::TsecB,
            0xc0 => ChClassId::NvJpg,
            0xf0 => ChClassId::NvDec,
            other => ChClassId::Unknown(other),
        }
    }
}

impl ChClassId {
    pub fn raw(self) -> u32 {
        match self {
            ChClassId::NoClass => 0x00,
            ChClassId::Host1x => 0x01,
            ChClassId::VideoEncodeMpeg => 0x20,
            ChClassId::VideoEncodeNvEnc => 0x21,
            ChClassId::VideoStreamingVi => 0x30,
            ChClassId::VideoStreamingIsp => 0x32,
            ChClassId::VideoStreamingIspB => 0x34,
            ChClassId::VideoStreamingViI2c => 0x36,
            ChClassId::GraphicsVic => 0x5d,
            ChClassId::Graphics3D => 0x60,
            ChClassId::GraphicsGpu => 0x61,
            ChClassId::Tsec => 0xe0,
            ChClassId::TsecB => 0xe1,
            ChClassId::NvJpg => 0xc0,
            ChClassId::NvDec => 0xf0,
            ChClassId::Unknown(raw) => raw,
        }
    }
}

/// Opcode in the top nibble of a channel header word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChSubmissionMode {
    SetClass,
    Incrementing,
    NonIncrementing,
    Mask,
    Immediate,
    Restart,
    Gather,
    Unknown(u32),
}

impl ChSubmissionMode {
    pub fn from_header(word: u32) -> Self {
        match (word >> 28) & 0xf {
            0 => ChSubmissionMode::SetClass,
            1 => ChSubmissionMode::Incrementing,
            2 => ChSubmissionMode::NonIncrementing,
            3 => ChSubmissionMode::Mask,
            4 => ChSubmissionMode::Immediate,
            5 => ChSubmissionMode::Restart,
            6 => ChSubmissionMode::Gather,
            other => ChSubmissionMode::Unknown(other),
        }
    }
}

/// Channel-DMA interpreter. One instance lives for one video stream.
pub struct CdmaPusher {
    cdma_queue: VecDeque<ChCommandHeaderList>,
    nvdec: Box<dyn VideoEngine>,
    vic: Box<dyn VideoEngine>,
    host1x: Host1x,
    nvdec_sync: SyncptIncrManager,
    vic_sync: SyncptIncrManager,
    nvdec_thi_state: ThiRegisters,
    vic_thi_state: ThiRegisters,

    current_class: ChClassId,
    /// Remaining data words for an (non-)incrementing write.
    count: u32,
    offset: u32,
    /// Remaining offsets for a masked write, one bit per word.
    mask: u32,
    incrementing: bool,
}

impl CdmaPusher {
    pub fn new(
        nvdec: Box<dyn VideoEngine>,
        vic: Box<dyn VideoEngine>,
        syncpoints: Arc<SyncpointManager>,
    ) -> Self {
        Self {
            cdma_queue: VecDeque::new(),
            nvdec,
            vic,
            host1x: Host1x::new(Arc::clone(&syncpoints)),
            nvdec_sync: SyncptIncrManager::new(Arc::clone(&syncpoints)),
            vic_sync: SyncptIncrManager::new(syncpoints),
            nvdec_thi_state: ThiRegisters::default(),
            vic_thi_state: ThiRegisters::default(),
            current_class: ChClassId::NoClass,
            count: 0,
            offset: 0,
            mask: 0,
            incrementing: false,
        }
    }

    /// Factory that builds a fresh pusher per video stream. `engines` supplies
    /// the (NVDEC, VIC) pair for each new instance.
    pub fn factory<F>(syncpoints: Arc<SyncpointManager>, engines: F) -> DecoderFactory
    where
        F: Fn() -> (Box<dyn VideoEngine>, Box<dyn VideoEngine>) + Send + Sync + 'static,
    {
        Arc::new(move || {
            let (nvdec, vic) = engines();
            let pusher = CdmaPusher::new(nvdec, vic, Arc::clone(&syncpoints));
            Box::new(pusher) as Box<dyn DecodeInterpreter>
        })
    }

    pub fn current_class(&self) -> ChClassId {
        self.current_class
    }

    fn step(&mut self, entries: ChCommandHeaderList) {
        for word in entries.iter().map(|header| header.raw) {
            if self.mask != 0 {
                let lbs = self.mask.trailing_zeros();
                self.mask &= !(1u32 << lbs);
                self.execute_command(self.offset + lbs, word);
                continue;
            }
            if self.count != 0 {
                self.count -= 1;
                self.execute_command(self.offset, word);
                if self.incrementing {
                    self.offset += 1;
                }
                continue;
            }

            let mode = ChSubmissionMode::from_header(word);
            match mode {
                ChSubmissionMode::SetClass => {
                    self.mask = word & 0x3f;
                    self.offset = (word >> 16) & 0xfff;
                    self.current_class = ChClassId::from((word >> 6) & 0x3ff);
                }
                ChSubmissionMode::Incrementing | ChSubmissionMode::NonIncrementing => {
                    self.count = word & 0xffff;
                    self.offset = (word >> 16) & 0xfff;
                    self.incrementing = mode == ChSubmissionMode::Incrementing;
                }
                ChSubmissionMode::Mask => {
                    self.mask = word & 0xffff;
                    self.offset = (word >> 16) & 0xfff;
                }
                ChSubmissionMode::Immediate => {
                    let data = word & 0xfff;
                    self.offset = (word >> 16) & 0xfff;
                    self.execute_command(self.offset, data);
                }
                other => warn!("Channel submission mode {:?} is not implemented", other),
            }
        }
    }

    fn execute_command(&mut self, offset: u32, data: u32) {
        match self.current_class {
            ChClassId::NvDec => {
                if !self.nvdec_thi_state.write(offset, data) {
                    trace!("NVDEC THI write past register block: {:#x}", offset);
                }
                match ThiMethod::from_offset(offset) {
                    Some(ThiMethod::IncSyncpt) => {
                        debug!("NVDEC class IncSyncpt method");
                        increment_syncpt(&mut self.nvdec_sync, ChClassId::NvDec, data);
                    }
                    Some(ThiMethod::SetMethod1) => {
                        let method = self.nvdec_thi_state.method_0();
                        debug!("NVDEC method {:#x}", method);
                        self.nvdec.process_method(method, data);
                    }
                    _ => {}
                }
            }
            ChClassId::GraphicsVic => {
                if !self.vic_thi_state.write(offset, data) {
                    trace!("VIC THI write past register block: {:#x}", offset);
                }
                match ThiMethod::from_offset(offset) {
                    Some(ThiMethod::IncSyncpt) => {
                        debug!("VIC class IncSyncpt method");
                        increment_syncpt(&mut self.vic_sync, ChClassId::GraphicsVic, data);
                    }
                    Some(ThiMethod::SetMethod1) => {
                        let method = self.vic_thi_state.method_0();
                        debug!("VIC method {:#x}, argument {:#x}", method, data);
                        self.vic.process_method(method, data);
                    }
                    _ => {}
                }
            }
            ChClassId::Host1x => {
                debug!("Host1x class method {:#x}", offset);
                self.host1x.process_method(offset, data);
            }
            other => warn!("Channel class {:#x} is not implemented", other.raw()),
        }
    }
}

/// IncSyncpt argument: [7:0]=sync point id, [15:8]=condition (0 = immediate).
fn increment_syncpt(sync: &mut SyncptIncrManager, class: ChClassId, data: u32) {
    let syncpoint_id = data & 0xff;
    let cond = (data >> 8) & 0xff;
    if cond == 0 {
        sync.increment(syncpoint_id);
    } else {
        let handle = sync.increment_when_done(class.raw(), syncpoint_id);
        sync.signal_done(handle);
    }
    if let Some(blocked) = sync.blocked_class() {
        debug!(
            "{} sync point increments waiting on class {:#x}",
            sync.pending(),
            blocked
        );
    }
}

impl DecodeInterpreter for CdmaPusher {
    fn push(&mut self, entries: ChCommandHeaderList) {
        self.cdma_queue.push_back(entries);
    }

    fn dispatch_calls(&mut self) {
        while let Some(entries) = self.cdma_queue.pop_front() {
            self.step(entries);
        }
    }
}
