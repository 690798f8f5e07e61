//! Per-manager event queue
//!
//! Signaling work and fired timers are posted here and executed one at a
//! time on a dedicated worker thread, in posting order. Until the worker is
//! started, posted tasks stay queued and can be drained synchronously with
//! [`EventQueue::run_pending`].

use crate::errors::{CallError, CallResult};
use parking_lot::Mutex;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

pub type QueueTask = Box<dyn FnOnce() + Send + 'static>;

enum QueueMessage {
    Task(QueueTask),
    Shutdown,
}

#[derive(Debug, Default)]
struct QueueCounters {
    posted: AtomicU64,
    executed: AtomicU64,
}

pub struct EventQueue {
    name: String,
    sender: mpsc::UnboundedSender<QueueMessage>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<QueueMessage>>>,
    worker: Mutex<Option<(ThreadId, JoinHandle<()>)>>,
    counters: Arc<QueueCounters>,
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("posted", &self.counters.posted.load(Ordering::Relaxed))
            .field("executed", &self.counters.executed.load(Ordering::Relaxed))
            .finish()
    }
}

fn execute(name: &str, task: QueueTask, counters: &QueueCounters) {
    if catch_unwind(AssertUnwindSafe(task)).is_err() {
        error!("Task on event queue {} panicked", name);
    }
    counters.executed.fetch_add(1, Ordering::SeqCst);
}

impl EventQueue {
    pub fn new(name: impl Into<String>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            name: name.into(),
            sender,
            receiver: Mutex::new(Some(receiver)),
            worker: Mutex::new(None),
            counters: Arc::new(QueueCounters::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a task. Returns false once the queue has shut down.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) -> bool {
        let accepted = self.sender.send(QueueMessage::Task(Box::new(task))).is_ok();
        if accepted {
            self.counters.posted.fetch_add(1, Ordering::SeqCst);
        } else {
            debug!("Event queue {} is closed, task dropped", self.name);
        }
        accepted
    }

    /// Start the worker thread
    pub fn start(&self) -> CallResult<()> {
        let mut receiver = self
            .receiver
            .lock()
            .take()
            .ok_or_else(|| CallError::invalid_argument(format!("event queue {} already started", self.name)))?;
        let name = self.name.clone();
        let counters = self.counters.clone();

        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                info!("Event queue {} started", name);
                while let Some(message) = receiver.blocking_recv() {
                    match message {
                        QueueMessage::Task(task) => execute(&name, task, &counters),
                        QueueMessage::Shutdown => break,
                    }
                }
                info!("Event queue {} stopped", name);
            })
            .map_err(|err| CallError::collaborator(format!("cannot spawn event queue {}: {}", self.name, err)))?;

        *self.worker.lock() = Some((handle.thread().id(), handle));
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Stop the worker after the tasks queued so far. Safe to call from a
    /// queued task; the worker is then not joined.
    pub fn stop(&self) {
        let Some((id, handle)) = self.worker.lock().take() else {
            return;
        };
        let _ = self.sender.send(QueueMessage::Shutdown);
        if thread::current().id() == id {
            return;
        }
        if handle.join().is_err() {
            error!("Event queue {} worker panicked", self.name);
        }
    }

    /// Run everything queued so far on the calling thread. Only possible
    /// while the worker is not started; returns the number of tasks run.
    pub fn run_pending(&self) -> usize {
        let mut guard = self.receiver.lock();
        let Some(receiver) = guard.as_mut() else {
            return 0;
        };
        let mut tasks = Vec::new();
        while let Ok(message) = receiver.try_recv() {
            if let QueueMessage::Task(task) = message {
                tasks.push(task);
            }
        }
        drop(guard);

        let count = tasks.len();
        for task in tasks {
            execute(&self.name, task, &self.counters);
        }
        count
    }

    pub fn posted(&self) -> u64 {
        self.counters.posted.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> u64 {
        self.counters.executed.load(Ordering::SeqCst)
    }
}

impl Drop for EventQueue {
    fn drop(&mut self) {
        self.stop();
    }
}
