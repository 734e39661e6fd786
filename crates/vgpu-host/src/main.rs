//! vgpu debug host
//!
//! Wires the software backend into the GPU core and pushes a synthetic
//! workload through it: command lists, presents, cache maintenance and a
//! short video-decode stream.

mod backend;
mod workload;

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use vgpu_core::{create_gpu, CdmaPusher, GpuAccuracy, GpuParts, Settings, SyncpointManager};
use vgpu_hal::VideoEngine;

use backend::{
    BackendStats, LoggingInterruptSink, NullVideoEngine, SoftwareDmaPusher, SoftwareRasterizer,
    SoftwareRenderer,
};

#[derive(Parser)]
#[command(name = "vgpu-host")]
#[command(about = "Drive a synthetic workload through the asynchronous GPU core", long_about = None)]
#[command(version)]
struct Cli {
    /// Cache-coherency accuracy: normal, high or extreme
    #[arg(long, default_value = "normal")]
    accuracy: GpuAccuracy,

    /// Execute everything on the calling thread instead of a GPU worker
    #[arg(long)]
    sync: bool,

    /// Ignore video-decode command buffers
    #[arg(long)]
    no_nvdec: bool,

    /// Number of command lists to submit
    #[arg(long, default_value = "64")]
    lists: usize,

    /// GPFIFO entries per command list
    #[arg(long, default_value = "8")]
    entries_per_list: usize,

    /// Suppress progress output (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging (suppressed if --quiet)
    if !cli.quiet {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    let settings = Settings {
        gpu_accuracy: cli.accuracy,
        use_asynchronous_gpu: !cli.sync,
        use_nvdec: !cli.no_nvdec,
    };
    log::info!("vgpu-host starting: {:?}", settings);

    let stats = Arc::new(BackendStats::default());
    let rasterizer = Arc::new(SoftwareRasterizer::new(Arc::clone(&stats)));
    let syncpoints = Arc::new(SyncpointManager::new(Arc::new(LoggingInterruptSink::new(
        Arc::clone(&stats),
    ))));

    let engine_stats = Arc::clone(&stats);
    let decoder_factory = CdmaPusher::factory(Arc::clone(&syncpoints), move || {
        let nvdec: Box<dyn VideoEngine> =
            Box::new(NullVideoEngine::new("NVDEC", Arc::clone(&engine_stats)));
        let vic: Box<dyn VideoEngine> =
            Box::new(NullVideoEngine::new("VIC", Arc::clone(&engine_stats)));
        (nvdec, vic)
    });

    let parts = GpuParts {
        renderer: Box::new(SoftwareRenderer::new(
            Arc::clone(&rasterizer),
            Arc::clone(&stats),
        )),
        dma_pusher: Box::new(SoftwareDmaPusher::new(
            Arc::clone(&rasterizer),
            Arc::clone(&stats),
        )),
        decoder_factory,
        syncpoints,
    };

    let mut gpu = create_gpu(settings, parts);
    gpu.start()?;
    gpu.obtain_context();

    let started = Instant::now();
    let report = workload::run(gpu.as_ref(), cli.lists, cli.entries_per_list);
    gpu.wait_idle();
    let elapsed = started.elapsed();
    gpu.release_context();

    if !cli.quiet {
        eprintln!(
            "Done: {} submissions in {:.2?} (last fence {}, decode sync point {})",
            report.submissions, elapsed, report.last_fence, report.syncpoint_value
        );
        eprintln!("  dirty ranges:    {}", rasterizer.dirty_regions());
        eprintln!("{}", stats);
    }

    // Dropping the front end joins the GPU thread.
    drop(gpu);
    Ok(())
}
