//! Asynchronous disk scheduler.
//!
//! The scheduler decouples buffer pool latency from disk latency: callers
//! enqueue read/write requests without blocking, a single background worker
//! drains the queue in FIFO order, and every request carries a one-shot
//! completion channel the caller can await.
//!
//! # Ordering
//!
//! The queue is multi-producer/single-consumer. The worker fulfills
//! completions strictly in dequeue order, but callers synchronize only on
//! their own completion - there is no global barrier.
//!
//! # Failure semantics
//!
//! I/O errors surfaced by the storage backend travel through the completion
//! channel as `Err(StorageError)`; the worker itself never dies on a failed
//! request.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::trace;

use crate::storage::error::StorageError;
use crate::storage::io::Storage;
use crate::storage::page::{PageData, PageId};

/// A single disk I/O request.
pub struct DiskRequest {
    /// The page the request targets.
    pub page_id: PageId,
    /// Read or write, with the request's completion channel.
    pub kind: DiskRequestKind,
}

/// The two request flavors and their completion channels.
pub enum DiskRequestKind {
    /// Read the page into a freshly allocated buffer, delivered on `ack`.
    Read {
        ack: oneshot::Sender<Result<PageData, StorageError>>,
    },
    /// Write `data` (exactly PAGE_SIZE bytes) to the page.
    Write {
        data: Bytes,
        ack: oneshot::Sender<Result<(), StorageError>>,
    },
}

/// Serializes disk I/O through one background worker task.
///
/// Construction spawns the worker; [`DiskScheduler::shutdown`] posts a
/// sentinel and joins it. Dropping the scheduler without calling `shutdown`
/// also terminates the worker (the queue closes), it just doesn't wait for
/// in-flight requests.
pub struct DiskScheduler {
    queue: mpsc::UnboundedSender<Option<DiskRequest>>,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl DiskScheduler {
    /// Creates a scheduler over `storage` and spawns its worker task.
    pub fn new<S: Storage + 'static>(storage: Arc<S>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(storage, rx));

        Self {
            queue: tx,
            worker: parking_lot::Mutex::new(Some(worker)),
        }
    }

    /// Enqueues a request. Never blocks.
    ///
    /// If the worker has already shut down, the request's completion channel
    /// is dropped and the caller's await observes the termination.
    pub fn schedule(&self, request: DiskRequest) {
        let _ = self.queue.send(Some(request));
    }

    /// Schedules a read of `page_id` and awaits its completion.
    pub async fn read_page(&self, page_id: PageId) -> Result<PageData, StorageError> {
        let (ack, done) = oneshot::channel();
        self.schedule(DiskRequest {
            page_id,
            kind: DiskRequestKind::Read { ack },
        });
        done.await.map_err(|_| worker_gone())?
    }

    /// Schedules a write of `data` to `page_id` and awaits its completion.
    pub async fn write_page(&self, page_id: PageId, data: Bytes) -> Result<(), StorageError> {
        let (ack, done) = oneshot::channel();
        self.schedule(DiskRequest {
            page_id,
            kind: DiskRequestKind::Write { data, ack },
        });
        done.await.map_err(|_| worker_gone())?
    }

    /// Posts the shutdown sentinel and waits for the worker to drain the
    /// queue ahead of it and exit.
    pub async fn shutdown(&self) {
        let _ = self.queue.send(None);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

fn worker_gone() -> StorageError {
    StorageError::Io(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        "disk scheduler worker terminated",
    ))
}

/// Worker loop: pop requests until the `None` sentinel (or queue closure),
/// perform the blocking storage call, fulfill the completion.
async fn run_worker<S: Storage>(
    storage: Arc<S>,
    mut queue: mpsc::UnboundedReceiver<Option<DiskRequest>>,
) {
    trace!("disk scheduler worker started");
    while let Some(message) = queue.recv().await {
        let Some(request) = message else {
            break;
        };

        match request.kind {
            DiskRequestKind::Read { ack } => {
                let mut data = PageData::new();
                let outcome = storage.read_page(request.page_id, data.as_mut_slice()).await;
                let result = match outcome {
                    Ok(()) => Ok(data),
                    Err(e) => Err(e),
                };
                let _ = ack.send(result);
            }
            DiskRequestKind::Write { data, ack } => {
                let result = storage.write_page(request.page_id, &data).await;
                let _ = ack.send(result);
            }
        }
    }
    trace!("disk scheduler worker stopped");
}
