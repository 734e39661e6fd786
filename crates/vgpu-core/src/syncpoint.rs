//! Host1x sync-point counters and their guest interrupts.

use std::sync::Arc;

use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use vgpu_hal::InterruptSink;

/// Number of hardware sync points.
pub const MAX_SYNCPOINTS: u32 = 192;

struct Syncpoints {
    values: Vec<u32>,
    /// Registered interrupt thresholds per sync point.
    interrupts: Vec<Vec<u32>>,
}

/// Sync-point counters. Incremented by GPU and video-engine work, awaited
/// by the guest through interrupts or host-side waits.
pub struct SyncpointManager {
    state: Mutex<Syncpoints>,
    cond: Condvar,
    interrupts: Arc<dyn InterruptSink>,
}

impl SyncpointManager {
    pub fn new(interrupts: Arc<dyn InterruptSink>) -> Self {
        Self {
            state: Mutex::new(Syncpoints {
                values: vec![0; MAX_SYNCPOINTS as usize],
                interrupts: vec![Vec::new(); MAX_SYNCPOINTS as usize],
            }),
            cond: Condvar::new(),
            interrupts,
        }
    }

    /// Current value of sync point `id`, or 0 for an out-of-range id.
    pub fn value(&self, id: u32) -> u32 {
        self.state
            .lock()
            .values
            .get(id as usize)
            .copied()
            .unwrap_or(0)
    }

    /// Bump sync point `id` and raise every registered interrupt whose
    /// threshold it has now reached. Returns the new value.
    pub fn increment(&self, id: u32) -> u32 {
        let (value, fired) = {
            let mut state = self.state.lock();
            let Some(slot) = state.values.get_mut(id as usize) else {
                warn!("Increment of invalid sync point {}", id);
                return 0;
            };
            *slot = slot.wrapping_add(1);
            let value = *slot;
            let pending = &mut state.interrupts[id as usize];
            let mut fired = Vec::new();
            pending.retain(|&threshold| {
                if value >= threshold {
                    fired.push(threshold);
                    false
                } else {
                    true
                }
            });
            (value, fired)
        };
        self.cond.notify_all();

        for threshold in fired {
            debug!("Sync point {} reached {}, raising interrupt", id, threshold);
            self.interrupts.gpu_interrupt_syncpt(id, threshold);
        }
        value
    }

    /// Raise an interrupt once sync point `id` reaches `value`. Fires
    /// immediately if it already has.
    pub fn register_interrupt(&self, id: u32, value: u32) {
        {
            let mut state = self.state.lock();
            let Some(&current) = state.values.get(id as usize) else {
                warn!("Interrupt registered on invalid sync point {}", id);
                return;
            };
            if current < value {
                state.interrupts[id as usize].push(value);
                return;
            }
        }
        self.interrupts.gpu_interrupt_syncpt(id, value);
    }

    /// Raise the guest interrupt for `id` reaching `value` without touching the counter.
    pub fn raise_interrupt(&self, id: u32, value: u32) {
        self.interrupts.gpu_interrupt_syncpt(id, value);
    }

    /// True once sync point `id` has reached `value`.
    pub fn is_reached(&self, id: u32, value: u32) -> bool {
        self.value(id) >= value
    }

    /// Block until sync point `id` reaches `value`. Returns immediately for
    /// an out-of-range id.
    pub fn wait(&self, id: u32, value: u32) {
        if id >= MAX_SYNCPOINTS {
            warn!("Wait on invalid sync point {}", id);
            return;
        }
        let mut state = self.state.lock();
        while state.values[id as usize] < value {
            self.cond.wait(&mut state);
        }
    }
}
