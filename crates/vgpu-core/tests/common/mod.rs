//! Mock backend shared by the integration tests.
//!
//! Every collaborator appends to one shared event log so tests can assert on
//! the exact order calls reached the backend.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use vgpu_core::{DecoderFactory, GpuParts, GpuThreadResources, SyncpointManager};
use vgpu_core::flush::FlushRequests;
use vgpu_hal::{
    ChCommandHeaderList, CommandList, CommandListHeader, CommandListProcessor, DecodeInterpreter,
    FramebufferConfig, GraphicsContext, InterruptSink, Rasterizer, Renderer, VAddr,
};

/// One call observed by the mock backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Command list, identified by the address of its first entry.
    List(u64),
    /// Decode buffer, identified by (interpreter id, first word).
    Decode(u32, u32),
    Swap(Option<VAddr>),
    Flush(VAddr, u64),
    Invalidate(VAddr, u64),
    CpuWrite(VAddr, u64),
    ReleaseFences,
    /// Context bound, with the name of the binding thread.
    MakeCurrent(&'static str, Option<String>),
    DoneCurrent(&'static str),
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

/// A list whose first entry points at `address`.
pub fn list(address: u64) -> CommandList {
    vec![CommandListHeader::new(address, 16, false)]
}

/// Events with context binding filtered out.
pub fn work(log: &EventLog) -> Vec<Event> {
    log.lock()
        .iter()
        .filter(|event| {
            !matches!(event, Event::MakeCurrent(..) | Event::DoneCurrent(_))
        })
        .cloned()
        .collect()
}

/// One-shot barrier a mock can park on until the test opens it.
#[derive(Default)]
pub struct Gate {
    state: Mutex<(bool, bool)>,
    cond: Condvar,
}

impl Gate {
    /// Called by the mock: record arrival, then block until opened.
    pub fn pass(&self) {
        let mut state = self.state.lock();
        state.0 = true;
        self.cond.notify_all();
        while !state.1 {
            self.cond.wait(&mut state);
        }
    }

    pub fn wait_entered(&self) {
        let mut state = self.state.lock();
        while !state.0 {
            self.cond.wait(&mut state);
        }
    }

    pub fn open(&self) {
        self.state.lock().1 = true;
        self.cond.notify_all();
    }
}

pub struct MockRasterizer {
    log: EventLog,
    pub must_flush: AtomicBool,
}

impl Rasterizer for MockRasterizer {
    fn flush_region(&self, addr: VAddr, size: u64) {
        self.log.lock().push(Event::Flush(addr, size));
    }

    fn invalidate_region(&self, addr: VAddr, size: u64) {
        self.log.lock().push(Event::Invalidate(addr, size));
    }

    fn on_cpu_write(&self, addr: VAddr, size: u64) {
        self.log.lock().push(Event::CpuWrite(addr, size));
    }

    fn must_flush_region(&self, _addr: VAddr, _size: u64) -> bool {
        self.must_flush.load(Ordering::Acquire)
    }

    fn release_fences(&self) {
        self.log.lock().push(Event::ReleaseFences);
    }
}

pub struct MockContext {
    name: &'static str,
    log: EventLog,
}

impl GraphicsContext for MockContext {
    fn make_current(&mut self) {
        let thread = std::thread::current().name().map(str::to_string);
        self.log.lock().push(Event::MakeCurrent(self.name, thread));
    }

    fn done_current(&mut self) {
        self.log.lock().push(Event::DoneCurrent(self.name));
    }
}

pub struct MockRenderer {
    log: EventLog,
    rasterizer: Arc<MockRasterizer>,
}

impl Renderer for MockRenderer {
    fn swap_buffers(&mut self, framebuffer: Option<&FramebufferConfig>) {
        self.log
            .lock()
            .push(Event::Swap(framebuffer.map(|fb| fb.address)));
    }

    fn rasterizer(&self) -> Arc<dyn Rasterizer> {
        self.rasterizer.clone()
    }

    fn context(&mut self) -> Box<dyn GraphicsContext> {
        Box::new(MockContext {
            name: "GPU",
            log: Arc::clone(&self.log),
        })
    }

    fn create_shared_context(&self) -> Box<dyn GraphicsContext> {
        Box::new(MockContext {
            name: "CPU",
            log: Arc::clone(&self.log),
        })
    }
}

pub struct MockDmaPusher {
    log: EventLog,
    queue: VecDeque<CommandList>,
    /// Blocks the first dispatch until opened.
    gate: Option<Arc<Gate>>,
}

impl CommandListProcessor for MockDmaPusher {
    fn push(&mut self, entries: CommandList) {
        self.queue.push_back(entries);
    }

    fn dispatch_calls(&mut self) {
        if let Some(gate) = self.gate.take() {
            gate.pass();
        }
        while let Some(entries) = self.queue.pop_front() {
            let address = entries.first().map(|header| header.address()).unwrap_or(0);
            self.log.lock().push(Event::List(address));
        }
    }
}

pub struct MockDecoder {
    id: u32,
    log: EventLog,
    queue: VecDeque<ChCommandHeaderList>,
}

impl DecodeInterpreter for MockDecoder {
    fn push(&mut self, entries: ChCommandHeaderList) {
        self.queue.push_back(entries);
    }

    fn dispatch_calls(&mut self) {
        while let Some(entries) = self.queue.pop_front() {
            let first = entries.first().map(|word| word.raw).unwrap_or(0);
            self.log.lock().push(Event::Decode(self.id, first));
        }
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub raised: Mutex<Vec<(u32, u32)>>,
}

impl InterruptSink for RecordingSink {
    fn gpu_interrupt_syncpt(&self, syncpoint_id: u32, value: u32) {
        self.raised.lock().push((syncpoint_id, value));
    }
}

/// A complete mock backend around one event log.
pub struct MockBackend {
    pub log: EventLog,
    pub rasterizer: Arc<MockRasterizer>,
    pub sink: Arc<RecordingSink>,
    pub syncpoints: Arc<SyncpointManager>,
    /// Number of decode interpreters built so far.
    pub decoders_created: Arc<AtomicU32>,
    pub gate: Option<Arc<Gate>>,
}

impl MockBackend {
    pub fn new() -> Self {
        let log: EventLog = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::new(RecordingSink::default());
        Self {
            rasterizer: Arc::new(MockRasterizer {
                log: Arc::clone(&log),
                must_flush: AtomicBool::new(true),
            }),
            syncpoints: Arc::new(SyncpointManager::new(sink.clone())),
            sink,
            log,
            decoders_created: Arc::new(AtomicU32::new(0)),
            gate: None,
        }
    }

    /// Make the first command-list dispatch block on the returned gate.
    pub fn with_gate(mut self) -> (Self, Arc<Gate>) {
        let gate = Arc::new(Gate::default());
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn renderer(&self) -> Box<dyn Renderer> {
        Box::new(MockRenderer {
            log: Arc::clone(&self.log),
            rasterizer: Arc::clone(&self.rasterizer),
        })
    }

    pub fn dma_pusher(&self) -> Box<dyn CommandListProcessor> {
        Box::new(MockDmaPusher {
            log: Arc::clone(&self.log),
            queue: VecDeque::new(),
            gate: self.gate.clone(),
        })
    }

    pub fn decoder_factory(&self) -> DecoderFactory {
        let log = Arc::clone(&self.log);
        let created = Arc::clone(&self.decoders_created);
        Arc::new(move || {
            let id = created.fetch_add(1, Ordering::AcqRel) + 1;
            Box::new(MockDecoder {
                id,
                log: Arc::clone(&log),
                queue: VecDeque::new(),
            }) as Box<dyn DecodeInterpreter>
        })
    }

    pub fn parts(&self) -> GpuParts {
        GpuParts {
            renderer: self.renderer(),
            dma_pusher: self.dma_pusher(),
            decoder_factory: self.decoder_factory(),
            syncpoints: Arc::clone(&self.syncpoints),
        }
    }

    pub fn thread_resources(&self) -> GpuThreadResources {
        let mut renderer = self.renderer();
        GpuThreadResources {
            context: renderer.context(),
            renderer,
            dma_pusher: self.dma_pusher(),
            cdma_pusher: (self.decoder_factory())(),
            flush_requests: Arc::new(FlushRequests::new()),
        }
    }

    pub fn decoders_created(&self) -> u32 {
        self.decoders_created.load(Ordering::Acquire)
    }
}
