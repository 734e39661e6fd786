//! Unbounded MPSC command queue between the CPU thread(s) and the GPU worker.
//!
//! Producers never block: the queue grows with the backlog. The single
//! consumer blocks in [`Consumer::pop_wait`] until a command arrives.

use crossbeam_channel::{Receiver, Sender};

use crate::command::CommandDataContainer;

/// Returned by [`Producer::push`] once the consumer has been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("command queue consumer is gone")]
pub struct QueueClosed;

/// Producer end. Cheap to clone; every clone feeds the same FIFO.
#[derive(Debug)]
pub struct Producer<T> {
    tx: Sender<T>,
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// Consumer end, owned by the GPU worker.
#[derive(Debug)]
pub struct Consumer<T> {
    rx: Receiver<T>,
}

/// Create a connected producer/consumer pair.
pub fn channel<T>() -> (Producer<T>, Consumer<T>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (Producer { tx }, Consumer { rx })
}

impl<T> Producer<T> {
    /// Append an item. Never blocks.
    pub fn push(&self, item: T) -> Result<(), QueueClosed> {
        self.tx.send(item).map_err(|_| QueueClosed)
    }
}

impl<T> Consumer<T> {
    /// Block until an item is available and return it. Returns `None` once
    /// every producer is gone and the queue is drained.
    pub fn pop_wait(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    /// Best-effort emptiness check; may be stale by the time it returns.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Number of queued items at the time of the call.
    pub fn len(&self) -> usize {
        self.rx.len()
    }
}

/// Producer end of the GPU command queue.
pub type CommandProducer = Producer<CommandDataContainer>;
/// Consumer end of the GPU command queue.
pub type CommandConsumer = Consumer<CommandDataContainer>;
