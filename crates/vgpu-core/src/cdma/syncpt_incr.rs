//! Ordered sync-point increments for a single engine.
//!
//! An engine may request an increment that only lands once its work is
//! done. Increments are applied strictly in request order, so a completed
//! increment waits behind any earlier one that is still pending.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::syncpoint::SyncpointManager;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SyncptIncr {
    handle: u32,
    class_id: u32,
    syncpt_id: u32,
    complete: bool,
}

pub struct SyncptIncrManager {
    increments: VecDeque<SyncptIncr>,
    next_handle: u32,
    syncpoints: Arc<SyncpointManager>,
}

impl SyncptIncrManager {
    pub fn new(syncpoints: Arc<SyncpointManager>) -> Self {
        Self {
            increments: VecDeque::new(),
            next_handle: 1,
            syncpoints,
        }
    }

    /// Increment `syncpt_id` as soon as all earlier increments have landed.
    pub fn increment(&mut self, syncpt_id: u32) {
        self.increments.push_back(SyncptIncr {
            handle: 0,
            class_id: 0,
            syncpt_id,
            complete: true,
        });
        self.increment_all_done();
    }

    /// Queue an increment that lands after [`signal_done`](Self::signal_done)
    /// is called with the returned handle.
    pub fn increment_when_done(&mut self, class_id: u32, syncpt_id: u32) -> u32 {
        let handle = self.next_handle;
        self.next_handle = self.next_handle.wrapping_add(1).max(1);
        self.increments.push_back(SyncptIncr {
            handle,
            class_id,
            syncpt_id,
            complete: false,
        });
        handle
    }

    /// Mark the increment for `handle` complete and apply everything that is now ready.
    pub fn signal_done(&mut self, handle: u32) {
        if let Some(incr) = self
            .increments
            .iter_mut()
            .find(|incr| !incr.complete && incr.handle == handle)
        {
            incr.complete = true;
        }
        self.increment_all_done();
    }

    /// Number of increments still waiting to land.
    pub fn pending(&self) -> usize {
        self.increments.len()
    }

    /// Class of the oldest increment still waiting, if any.
    pub fn blocked_class(&self) -> Option<u32> {
        self.increments.front().map(|incr| incr.class_id)
    }

    fn increment_all_done(&mut self) {
        while let Some(incr) = self.increments.front() {
            if !incr.complete {
                break;
            }
            self.syncpoints.increment(incr.syncpt_id);
            self.increments.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vgpu_hal::InterruptSink;

    struct NoInterrupts;

    impl InterruptSink for NoInterrupts {
        fn gpu_interrupt_syncpt(&self, _syncpoint_id: u32, _value: u32) {}
    }

    fn manager() -> (SyncptIncrManager, Arc<SyncpointManager>) {
        let syncpoints = Arc::new(SyncpointManager::new(Arc::new(NoInterrupts)));
        (SyncptIncrManager::new(Arc::clone(&syncpoints)), syncpoints)
    }

    #[test]
    fn immediate_increment_lands() {
        let (mut incr, syncpoints) = manager();
        incr.increment(4);
        assert_eq!(syncpoints.value(4), 1);
        assert_eq!(incr.pending(), 0);
    }

    #[test]
    fn immediate_increment_waits_behind_pending_one() {
        let (mut incr, syncpoints) = manager();
        let handle = incr.increment_when_done(0xf0, 1);
        incr.increment(2);
        assert_eq!(syncpoints.value(2), 0);
        assert_eq!(incr.pending(), 2);
        assert_eq!(incr.blocked_class(), Some(0xf0));

        incr.signal_done(handle);
        assert_eq!(syncpoints.value(1), 1);
        assert_eq!(syncpoints.value(2), 1);
        assert_eq!(incr.pending(), 0);
    }

    #[test]
    fn unknown_handle_changes_nothing() {
        let (mut incr, syncpoints) = manager();
        incr.increment_when_done(0xf0, 1);
        incr.signal_done(999);
        assert_eq!(syncpoints.value(1), 0);
        assert_eq!(incr.pending(), 1);
    }
}
