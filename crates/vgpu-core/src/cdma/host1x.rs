//! Host1x class: sync-point waits issued inside a channel stream.

use std::sync::Arc;

use log::{debug, warn};

use crate::syncpoint::SyncpointManager;

/// Number of 32-bit registers in the host1x class block.
pub const HOST1X_REGISTER_COUNT: usize = 0x164 / 4;

/// Host1x methods. The value is the register offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Host1xMethod {
    WaitSyncpt = 0x08,
    LoadSyncptPayload32 = 0x4e,
    WaitSyncpt32 = 0x50,
}

impl Host1xMethod {
    pub fn from_offset(offset: u32) -> Option<Self> {
        match offset {
            0x08 => Some(Host1xMethod::WaitSyncpt),
            0x4e => Some(Host1xMethod::LoadSyncptPayload32),
            0x50 => Some(Host1xMethod::WaitSyncpt32),
            _ => None,
        }
    }
}

pub struct Host1x {
    regs: [u32; HOST1X_REGISTER_COUNT],
    /// Threshold loaded by `LoadSyncptPayload32` for the next wait.
    syncpoint_value: u32,
    syncpoints: Arc<SyncpointManager>,
}

impl Host1x {
    pub fn new(syncpoints: Arc<SyncpointManager>) -> Self {
        Self {
            regs: [0; HOST1X_REGISTER_COUNT],
            syncpoint_value: 0,
            syncpoints,
        }
    }

    /// Write the method register, then act on it.
    pub fn process_method(&mut self, offset: u32, argument: u32) {
        match self.regs.get_mut(offset as usize) {
            Some(reg) => *reg = argument,
            None => {
                warn!("Host1x method {:#x} outside register block", offset);
                return;
            }
        }

        match Host1xMethod::from_offset(offset) {
            Some(Host1xMethod::WaitSyncpt) | Some(Host1xMethod::WaitSyncpt32) => {
                self.execute(argument)
            }
            Some(Host1xMethod::LoadSyncptPayload32) => self.syncpoint_value = argument,
            None => warn!("Host1x method {:#x} is not implemented", offset),
        }
    }

    pub fn syncpoint_value(&self) -> u32 {
        self.syncpoint_value
    }

    pub fn register(&self, offset: u32) -> Option<u32> {
        self.regs.get(offset as usize).copied()
    }

    fn execute(&mut self, syncpoint_id: u32) {
        // Decode runs on the submitting CPU thread, so the wait is only checked.
        // TODO: block on the sync point once decode buffers go through the GPU thread.
        if !self.syncpoints.is_reached(syncpoint_id, self.syncpoint_value) {
            debug!(
                "Host1x wait on sync point {} for {} not yet satisfied (at {})",
                syncpoint_id,
                self.syncpoint_value,
                self.syncpoints.value(syncpoint_id)
            );
        }
    }
}
