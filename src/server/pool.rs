//! Producer–consumer worker pool.
//!
//! Connections produce dispatch tasks into one bounded FIFO queue; N
//! long-lived worker tasks consume it and run the dispatch engine. The
//! parsed request travels inside the task and returns on a completion
//! channel, so exactly one worker ever touches a given connection's state.

use crate::dispatch::engine::Engine;
use crate::http::request::Request;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// One unit of work handed from a connection to the pool.
pub struct DispatchTask {
    pub req: Request,
    /// Where the filled request goes once the engine is done.
    pub reply: oneshot::Sender<Request>,
}

type Queue = Arc<Mutex<mpsc::Receiver<DispatchTask>>>;

/// Cloneable producer side of the dispatch queue.
#[derive(Clone)]
pub struct PoolHandle {
    tx: mpsc::Sender<DispatchTask>,
}

impl PoolHandle {
    /// Enqueue a parsed request and wait for the engine to fill its
    /// response buffer. `None` means the pool has shut down.
    pub async fn dispatch(&self, req: Request) -> Option<Request> {
        let (reply, completed) = oneshot::channel();
        self.tx.send(DispatchTask { req, reply }).await.ok()?;
        completed.await.ok()
    }
}

/// The pool itself: spawned workers plus the stop signal.
pub struct WorkerPool {
    handle: PoolHandle,
    stop: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers over a queue of `queue_depth` slots. Each
    /// worker gets its own engine clone; the routing table and
    /// collaborators inside are shared read-only.
    pub fn start(size: usize, queue_depth: usize, engine: Engine) -> Self {
        let (tx, rx) = mpsc::channel(queue_depth);
        let (stop, _) = watch::channel(false);
        let queue: Queue = Arc::new(Mutex::new(rx));
        let workers = (0..size)
            .map(|id| {
                let queue = queue.clone();
                let stop = stop.subscribe();
                let engine = engine.clone();
                tokio::spawn(worker(id, queue, stop, engine))
            })
            .collect();
        tracing::info!(pool_size = size, queue_depth, "worker pool started");
        Self { handle: PoolHandle { tx }, stop, workers }
    }

    pub fn handle(&self) -> PoolHandle {
        self.handle.clone()
    }

    /// Signal the workers to stop accepting new tasks, let them drain what
    /// is already queued, then wait for them to exit. Nothing is aborted
    /// mid-flight. The queue is closed by whichever worker observes the
    /// signal first, so shutdown never waits on a worker-held lock.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

async fn worker(id: usize, queue: Queue, mut stop: watch::Receiver<bool>, engine: Engine) {
    loop {
        // Only one worker waits on the queue at a time; the guard lives
        // inside this block so it is released before the task is processed.
        let task = {
            let mut rx = queue.lock().await;
            if *stop.borrow() {
                rx.close();
                rx.recv().await
            } else {
                tokio::select! {
                    task = rx.recv() => task,
                    _ = stop.changed() => {
                        // closing ends the drain with None once the
                        // buffered tasks are consumed
                        rx.close();
                        rx.recv().await
                    }
                }
            }
        };
        let Some(task) = task else { break };

        let mut req = task.req;
        engine.handle(&mut req);

        // Request ready; hand it back so the connection switches to the
        // write phase.
        if task.reply.send(req).is_err() {
            tracing::warn!(worker = id, "connection closed before response handoff");
        }
    }
    tracing::info!(worker = id, "stopping worker task");
}
