//! State shared between the command producers and the GPU worker.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use log::warn;
use parking_lot::Mutex;

use crate::command::{CommandData, CommandDataContainer};
use crate::fence::FenceSignal;
use crate::queue::{self, CommandConsumer, CommandProducer};

/// Synchronization state for one GPU worker lifetime.
///
/// Invariant: `signaled_fence <= last_fence`, and both only grow.
#[derive(Debug)]
pub struct SynchState {
    is_running: AtomicBool,
    /// Fence assignment and push happen under this lock so queue order
    /// always equals fence order.
    producer: Mutex<CommandProducer>,
    last_fence: AtomicU64,
    signaled_fence: FenceSignal,
}

impl SynchState {
    /// Create the state and the consumer end the worker will own.
    pub fn new() -> (Self, CommandConsumer) {
        let (producer, consumer) = queue::channel();
        let state = Self {
            is_running: AtomicBool::new(true),
            producer: Mutex::new(producer),
            last_fence: AtomicU64::new(0),
            signaled_fence: FenceSignal::new(),
        };
        (state, consumer)
    }

    /// Assign the next fence to `data` and queue it. Returns the fence.
    pub fn push_command(&self, data: CommandData) -> u64 {
        let producer = self.producer.lock();
        let fence = self.last_fence.fetch_add(1, Ordering::AcqRel) + 1;
        let kind = data.kind();
        if producer.push(CommandDataContainer::new(data, fence)).is_err() {
            warn!("GPU thread has stopped, dropping {} (fence {})", kind, fence);
        }
        fence
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    pub fn set_running(&self, running: bool) {
        self.is_running.store(running, Ordering::Release);
    }

    /// Fence of the most recently queued command.
    pub fn last_fence(&self) -> u64 {
        self.last_fence.load(Ordering::Acquire)
    }

    /// Fence of the most recently completed command.
    pub fn signaled_fence(&self) -> u64 {
        self.signaled_fence.value()
    }

    /// Called by the worker after a command's effects are complete.
    pub fn signal(&self, fence: u64) {
        self.signaled_fence.signal(fence);
    }

    /// Called by the worker when it exits; releases every waiter.
    pub fn close(&self) {
        self.signaled_fence.close();
    }

    pub fn is_closed(&self) -> bool {
        self.signaled_fence.is_closed()
    }

    /// Block until every command queued before the call has completed, or
    /// the worker has exited.
    pub fn wait_idle(&self) {
        let target = self.last_fence();
        self.signaled_fence.wait_for(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fences_are_gap_free_and_queued_in_order() {
        let (state, consumer) = SynchState::new();
        let fences: Vec<u64> = (0..5).map(|_| state.push_command(CommandData::GpuTick)).collect();
        assert_eq!(fences, vec![1, 2, 3, 4, 5]);
        assert_eq!(state.last_fence(), 5);

        let popped: Vec<u64> = (0..5).map(|_| consumer.pop_wait().unwrap().fence).collect();
        assert_eq!(popped, fences);
    }

    #[test]
    fn push_after_consumer_dropped_still_assigns_fence() {
        let (state, consumer) = SynchState::new();
        drop(consumer);
        assert_eq!(state.push_command(CommandData::OnCommandListEnd), 1);
        assert_eq!(state.push_command(CommandData::OnCommandListEnd), 2);
    }

    #[test]
    fn wait_idle_returns_once_closed() {
        let (state, _consumer) = SynchState::new();
        state.push_command(CommandData::GpuTick);
        state.close();
        state.wait_idle();
        assert_eq!(state.signaled_fence(), 0);
    }

    #[test]
    fn running_flag_round_trips() {
        let (state, _consumer) = SynchState::new();
        assert!(state.is_running());
        state.set_running(false);
        assert!(!state.is_running());
    }
}
