//! GPU worker: pops fenced commands and executes them against the backend.
//!
//! The worker first waits for the first command without touching the
//! graphics context, so a session torn down before any work arrives never
//! acquires it. After that it dispatches commands strictly in fence order
//! and publishes each fence only once the command's effects are complete.

use std::ops::ControlFlow;
use std::sync::Arc;

use log::{debug, info, trace};
use vgpu_hal::{CommandListProcessor, DecodeInterpreter, GraphicsContext, Rasterizer, Renderer};

use crate::command::CommandData;
use crate::flush::FlushRequests;
use crate::queue::CommandConsumer;
use crate::synch::SynchState;
use crate::thread::GpuThreadResources;

/// Number of dispatched commands between throughput log lines.
const PERF_LOG_INTERVAL: u64 = 1024;

/// Backend objects owned by the worker for its whole lifetime.
pub(crate) struct Dispatcher {
    renderer: Box<dyn Renderer>,
    rasterizer: Arc<dyn Rasterizer>,
    dma_pusher: Box<dyn CommandListProcessor>,
    cdma_pusher: Box<dyn DecodeInterpreter>,
    flush_requests: Arc<FlushRequests>,
}

impl Dispatcher {
    fn new(
        renderer: Box<dyn Renderer>,
        dma_pusher: Box<dyn CommandListProcessor>,
        cdma_pusher: Box<dyn DecodeInterpreter>,
        flush_requests: Arc<FlushRequests>,
    ) -> Self {
        let rasterizer = renderer.rasterizer();
        Self {
            renderer,
            rasterizer,
            dma_pusher,
            cdma_pusher,
            flush_requests,
        }
    }

    /// Execute one command. Breaks on `EndProcessing`.
    fn execute(&mut self, data: CommandData) -> ControlFlow<()> {
        match data {
            CommandData::SubmitCommandList(entries) => {
                self.dma_pusher.push(entries);
                self.dma_pusher.dispatch_calls();
            }
            CommandData::SubmitDecodeBuffer(entries) => {
                self.cdma_pusher.push(entries);
                self.cdma_pusher.dispatch_calls();
            }
            CommandData::SwapBuffers(framebuffer) => {
                self.renderer.swap_buffers(framebuffer.as_ref());
            }
            CommandData::FlushRegion(region) => {
                self.rasterizer.flush_region(region.addr, region.size);
            }
            CommandData::InvalidateRegion(region) => {
                self.rasterizer.on_cpu_write(region.addr, region.size);
            }
            CommandData::GpuTick => {
                self.flush_requests.tick_work(self.rasterizer.as_ref());
            }
            CommandData::OnCommandListEnd => {
                self.rasterizer.release_fences();
            }
            CommandData::EndProcessing => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }
}

/// Keeps a graphics context bound for as long as the guard lives.
struct ContextScope {
    context: Box<dyn GraphicsContext>,
}

impl ContextScope {
    fn acquire(mut context: Box<dyn GraphicsContext>) -> Self {
        context.make_current();
        Self { context }
    }
}

impl Drop for ContextScope {
    fn drop(&mut self) {
        self.context.done_current();
    }
}

/// Releases every fence and flush waiter when the worker exits, including by panic.
struct CloseOnExit {
    state: Arc<SynchState>,
    flush_requests: Arc<FlushRequests>,
}

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        self.state.close();
        self.flush_requests.close();
    }
}

/// Worker thread body.
pub(crate) fn run_thread(
    resources: GpuThreadResources,
    state: Arc<SynchState>,
    queue: CommandConsumer,
) {
    info!("GPU thread started");

    let GpuThreadResources {
        renderer,
        context,
        dma_pusher,
        cdma_pusher,
        flush_requests,
    } = resources;

    let _close = CloseOnExit {
        state: Arc::clone(&state),
        flush_requests: Arc::clone(&flush_requests),
    };

    // Wait for the first command before acquiring the context.
    let Some(first) = queue.pop_wait() else {
        info!("GPU thread exiting: command queue closed before any work");
        return;
    };

    // Emulation stopped before any work arrived.
    if !state.is_running() {
        info!("GPU thread exiting: stopped before acquiring the context");
        return;
    }

    let _scope = ContextScope::acquire(context);
    debug!("GPU context acquired");

    let mut dispatcher = Dispatcher::new(renderer, dma_pusher, cdma_pusher, flush_requests);
    let mut next = Some(first);
    let mut processed: u64 = 0;

    while let Some(command) = next.take().or_else(|| queue.pop_wait()) {
        trace!("Dispatching {} (fence {})", command.data.kind(), command.fence);
        if dispatcher.execute(command.data).is_break() {
            break;
        }
        state.signal(command.fence);

        processed += 1;
        if processed % PERF_LOG_INTERVAL == 0 {
            debug!(
                "GPU thread: commands={}, signaled_fence={}, backlog={}",
                processed,
                command.fence,
                queue.len()
            );
        }
    }

    info!("GPU thread exiting after {} commands", processed);
}
