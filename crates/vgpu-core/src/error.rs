/// Errors raised while bringing up or tearing down the GPU pipeline.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    /// `start()` was called on a pipeline whose worker is already running.
    #[error("GPU thread already started")]
    AlreadyStarted,

    /// The OS refused to create the GPU worker thread.
    #[error("failed to spawn GPU thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),
}
