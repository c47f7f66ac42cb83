//! Fixed-size worker pool behind a bounded queue.
//!
//! `dispatch` waits while the queue is full, which is what throttles the
//! broker receive loop. Each message runs on its own task so a panicking
//! handler only loses that message.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use abstractgateway::BrokerMessage;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use super::handler::IngestHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// All queued and in-flight messages finished within the grace period.
    pub drained: bool,
    /// Messages still queued or running when the grace period ran out.
    pub abandoned: usize,
}

pub struct WorkerPool {
    tx: mpsc::Sender<BrokerMessage>,
    workers: JoinSet<()>,
    pending: Arc<AtomicUsize>,
}

impl WorkerPool {
    pub fn spawn(handler: Arc<IngestHandler>, workers: usize, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<BrokerMessage>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let pending = Arc::new(AtomicUsize::new(0));

        let mut set = JoinSet::new();
        for id in 0..workers.max(1) {
            let rx = rx.clone();
            let handler = handler.clone();
            let pending = pending.clone();
            set.spawn(async move {
                loop {
                    // lock is held only while waiting for the next message
                    let next = rx.lock().await.recv().await;
                    let Some(msg) = next else { break };

                    let subject = msg.subject.clone();
                    let h = handler.clone();
                    let res = tokio::spawn(async move { h.handle(&msg).await }).await;
                    if let Err(e) = res {
                        error!(worker = id, subject = %subject, error = %e, "handler task failed");
                    }
                    pending.fetch_sub(1, Ordering::SeqCst);
                }
                debug!(worker = id, "worker stopped");
            });
        }

        Self {
            tx,
            workers: set,
            pending,
        }
    }

    /// Queues `msg`, waiting for space. Returns the message back if every
    /// worker is gone.
    pub async fn dispatch(&self, msg: BrokerMessage) -> Result<(), BrokerMessage> {
        // reserve is cancel safe; the count only moves once the slot is ours
        match self.tx.reserve().await {
            Ok(permit) => {
                self.pending.fetch_add(1, Ordering::SeqCst);
                permit.send(msg);
                Ok(())
            }
            Err(_) => Err(msg),
        }
    }

    /// Queued plus in-flight messages.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Closes the queue and waits up to `grace` for the backlog to drain.
    pub async fn shutdown(self, grace: Duration) -> ShutdownReport {
        let Self {
            tx,
            mut workers,
            pending,
        } = self;
        drop(tx);

        let drain = async {
            while workers.join_next().await.is_some() {}
        };
        if tokio::time::timeout(grace, drain).await.is_ok() {
            return ShutdownReport {
                drained: true,
                abandoned: 0,
            };
        }

        let abandoned = pending.load(Ordering::SeqCst);
        warn!(abandoned, grace = ?grace, "grace period elapsed, abandoning remaining messages");
        workers.abort_all();
        ShutdownReport {
            drained: false,
            abandoned,
        }
    }
}
