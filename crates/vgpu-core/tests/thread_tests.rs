//! Integration tests for ThreadManager and the GPU worker loop.
//!
//! Uses the shared mock backend, which logs every backend call in order.

mod common;

use std::collections::HashMap;
use std::thread;

use common::{list, work, Event, MockBackend};
use vgpu_core::{GpuError, ThreadManager, GPU_THREAD_NAME};
use vgpu_hal::{ChCommandHeader, FramebufferConfig};

fn started(backend: &MockBackend) -> ThreadManager {
    let mut manager = ThreadManager::new();
    manager
        .start_thread(backend.thread_resources())
        .expect("worker should start");
    manager
}

// ============================================================================
// Fence assignment
// ============================================================================

mod fence_tests {
    use super::*;

    #[test]
    fn fences_are_sequential_from_one() {
        let backend = MockBackend::new();
        let manager = started(&backend);

        let fences = [
            manager.submit_list(list(0x1000)),
            manager.swap_buffers(None),
            manager.flush_region(0x1000, 0x100),
            manager.invalidate_region(0x2000, 0x100),
            manager.on_command_list_end(),
        ];

        assert_eq!(fences, [1, 2, 3, 4, 5]);
        manager.wait_idle();
        assert_eq!(manager.last_fence(), 5);
        assert_eq!(manager.signaled_fence(), 5);
    }

    #[test]
    fn concurrent_producers_get_unique_gap_free_fences() {
        const PRODUCERS: u64 = 4;
        const PER_PRODUCER: u64 = 100;

        let backend = MockBackend::new();
        let manager = started(&backend);

        let submitted: Vec<Vec<(u64, u64)>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..PRODUCERS)
                .map(|producer| {
                    let manager = &manager;
                    scope.spawn(move || {
                        (0..PER_PRODUCER)
                            .map(|i| {
                                let address = producer * 0x10_0000 + i * 0x100;
                                (manager.submit_list(list(address)), address)
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("producer panicked"))
                .collect()
        });
        manager.wait_idle();

        let by_fence: HashMap<u64, u64> = submitted.iter().flatten().copied().collect();
        let total = PRODUCERS * PER_PRODUCER;
        assert_eq!(by_fence.len() as u64, total);
        for fence in 1..=total {
            assert!(by_fence.contains_key(&fence), "fence {} missing", fence);
        }

        // Each producer's own fences increase.
        for fences in &submitted {
            assert!(fences.windows(2).all(|pair| pair[0].0 < pair[1].0));
        }

        // The worker processed lists in fence order.
        let expected: Vec<Event> = (1..=total).map(|fence| Event::List(by_fence[&fence])).collect();
        assert_eq!(work(&backend.log), expected);
    }
}

// ============================================================================
// Dispatch
// ============================================================================

mod dispatch_tests {
    use super::*;

    #[test]
    fn commands_run_in_submission_order() {
        let backend = MockBackend::new();
        let manager = started(&backend);
        let framebuffer = FramebufferConfig {
            address: 0xF000,
            ..Default::default()
        };

        manager.submit_list(list(0x1000));
        manager.submit_command_buffer(vec![ChCommandHeader::new(0xAB)]);
        manager.swap_buffers(Some(&framebuffer));
        manager.flush_region(0x1000, 0x40);
        manager.invalidate_region(0x3000, 0x80);
        manager.on_command_list_end();
        manager.submit_list(list(0x2000));
        manager.wait_idle();

        assert_eq!(
            work(&backend.log),
            vec![
                Event::List(0x1000),
                Event::Decode(1, 0xAB),
                Event::Swap(Some(0xF000)),
                Event::Flush(0x1000, 0x40),
                Event::CpuWrite(0x3000, 0x80),
                Event::ReleaseFences,
                Event::List(0x2000),
            ]
        );
    }

    #[test]
    fn context_is_bound_on_the_named_worker_thread() {
        let backend = MockBackend::new();
        let manager = started(&backend);
        manager.submit_list(list(0x1000));
        manager.wait_idle();

        let log = backend.log.lock();
        assert_eq!(
            log.first(),
            Some(&Event::MakeCurrent("GPU", Some(GPU_THREAD_NAME.to_string())))
        );
    }

    #[test]
    fn work_queued_before_start_runs_after_start() {
        let backend = MockBackend::new();
        let mut manager = ThreadManager::new();
        assert_eq!(manager.submit_list(list(0x1000)), 1);
        assert_eq!(manager.submit_list(list(0x2000)), 2);
        assert!(work(&backend.log).is_empty());

        manager.start_thread(backend.thread_resources()).unwrap();
        manager.wait_idle();

        assert_eq!(
            work(&backend.log),
            vec![Event::List(0x1000), Event::List(0x2000)]
        );
    }

    #[test]
    fn wait_idle_without_worker_returns() {
        let manager = ThreadManager::new();
        manager.submit_list(list(0x1000));
        manager.wait_idle();
        assert_eq!(manager.signaled_fence(), 0);
    }

    #[test]
    fn second_start_is_rejected() {
        let backend = MockBackend::new();
        let mut manager = started(&backend);
        let result = manager.start_thread(backend.thread_resources());
        assert!(matches!(result, Err(GpuError::AlreadyStarted)));
    }
}

// ============================================================================
// Shutdown
// ============================================================================

mod shutdown_tests {
    use super::*;

    #[test]
    fn shutdown_drains_earlier_commands_and_drops_later_ones() {
        let backend = MockBackend::new();
        let mut manager = started(&backend);
        for i in 0..3 {
            manager.submit_list(list(0x1000 * (i + 1)));
        }

        manager.shutdown();
        assert_eq!(
            work(&backend.log),
            vec![
                Event::List(0x1000),
                Event::List(0x2000),
                Event::List(0x3000)
            ]
        );
        assert_eq!(backend.log.lock().last(), Some(&Event::DoneCurrent("GPU")));

        // EndProcessing took fence 4.
        assert_eq!(manager.submit_list(list(0x9000)), 5);
        manager.wait_idle();
        assert_eq!(work(&backend.log).len(), 3);
        assert_eq!(manager.signaled_fence(), 3);
    }

    #[test]
    fn cancel_before_any_work_never_binds_the_context() {
        let backend = MockBackend::new();
        let mut manager = started(&backend);
        manager.cancel();
        manager.shutdown();

        assert!(backend.log.lock().is_empty());
    }

    #[test]
    fn drop_joins_the_worker() {
        let backend = MockBackend::new();
        {
            let manager = started(&backend);
            manager.submit_list(list(0x1000));
        }
        assert_eq!(work(&backend.log), vec![Event::List(0x1000)]);
        assert_eq!(backend.log.lock().last(), Some(&Event::DoneCurrent("GPU")));
    }
}
