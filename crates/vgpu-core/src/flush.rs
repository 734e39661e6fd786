//! Flush requests raised by the CPU thread and serviced by the GPU worker.
//!
//! Used by the extreme accuracy level: the CPU thread queues a request,
//! nudges the worker with a `GpuTick`, then waits on the completion counter.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use log::trace;
use parking_lot::Mutex;
use vgpu_hal::{Rasterizer, VAddr};

use crate::fence::FenceSignal;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FlushRequest {
    fence: u64,
    addr: VAddr,
    size: u64,
}

/// Pending flush requests plus the request/completion counter pair.
#[derive(Debug, Default)]
pub struct FlushRequests {
    requests: Mutex<VecDeque<FlushRequest>>,
    last_flush_fence: AtomicU64,
    current_flush_fence: FenceSignal,
}

impl FlushRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a flush of the range. Returns the sequence number that
    /// [`current_flush_fence`](Self::current_flush_fence) reaches once it is done.
    pub fn request_flush(&self, addr: VAddr, size: u64) -> u64 {
        let mut requests = self.requests.lock();
        let fence = self.last_flush_fence.fetch_add(1, Ordering::AcqRel) + 1;
        requests.push_back(FlushRequest { fence, addr, size });
        fence
    }

    /// Sequence number of the last completed flush.
    pub fn current_flush_fence(&self) -> u64 {
        self.current_flush_fence.value()
    }

    /// Number of requests not yet serviced.
    pub fn pending(&self) -> usize {
        self.requests.lock().len()
    }

    /// Service every pending request in order. Runs on the GPU worker.
    ///
    /// The request lock is released while the rasterizer flushes, so the CPU
    /// thread can keep queueing.
    pub fn tick_work(&self, rasterizer: &dyn Rasterizer) {
        loop {
            let request = self.requests.lock().pop_front();
            let Some(request) = request else {
                break;
            };
            trace!(
                "Servicing flush request {} ({:#x}, {:#x})",
                request.fence,
                request.addr,
                request.size
            );
            rasterizer.flush_region(request.addr, request.size);
            self.current_flush_fence.signal(request.fence);
        }
    }

    /// Block until flush `fence` has completed. Returns false if the worker
    /// went away first.
    pub fn wait_for(&self, fence: u64) -> bool {
        self.current_flush_fence.wait_for(fence)
    }

    /// Release any caller blocked in [`wait_for`](Self::wait_for). Called when
    /// the worker exits.
    pub fn close(&self) {
        self.current_flush_fence.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingRasterizer {
        flushed: Mutex<Vec<(VAddr, u64)>>,
    }

    impl Rasterizer for RecordingRasterizer {
        fn flush_region(&self, addr: VAddr, size: u64) {
            self.flushed.lock().push((addr, size));
        }
        fn invalidate_region(&self, _addr: VAddr, _size: u64) {}
        fn on_cpu_write(&self, _addr: VAddr, _size: u64) {}
        fn must_flush_region(&self, _addr: VAddr, _size: u64) -> bool {
            true
        }
        fn release_fences(&self) {}
    }

    #[test]
    fn request_fences_increase() {
        let flush = FlushRequests::new();
        assert_eq!(flush.request_flush(0x1000, 0x100), 1);
        assert_eq!(flush.request_flush(0x2000, 0x100), 2);
        assert_eq!(flush.pending(), 2);
        assert_eq!(flush.current_flush_fence(), 0);
    }

    #[test]
    fn tick_work_services_in_order() {
        let flush = FlushRequests::new();
        let rasterizer = RecordingRasterizer::default();
        flush.request_flush(0x1000, 0x10);
        flush.request_flush(0x2000, 0x20);

        flush.tick_work(&rasterizer);

        assert_eq!(
            *rasterizer.flushed.lock(),
            vec![(0x1000, 0x10), (0x2000, 0x20)]
        );
        assert_eq!(flush.current_flush_fence(), 2);
        assert_eq!(flush.pending(), 0);
        assert!(flush.wait_for(2));
    }

    #[test]
    fn tick_work_with_nothing_pending() {
        let flush = FlushRequests::new();
        let rasterizer = RecordingRasterizer::default();
        flush.tick_work(&rasterizer);
        assert!(rasterizer.flushed.lock().is_empty());
        assert_eq!(flush.current_flush_fence(), 0);
    }

    #[test]
    fn close_releases_waiter() {
        let flush = FlushRequests::new();
        let fence = flush.request_flush(0, 4);
        flush.close();
        assert!(!flush.wait_for(fence));
    }
}
