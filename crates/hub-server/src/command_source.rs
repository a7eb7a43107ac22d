//! Where a session gets the next command for its device.
//!
//! The hub never reads operator input itself. A session opens a queue in
//! its [`CommandSource`] once its device has registered, asks it for the
//! next command, and releases it on teardown. Queues belong to one
//! connection: commands never outlive the session they were queued for.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::registry::SessionId;

/// A boxed future resolving to the next command, or `None` when the source
/// has nothing more to give this session.
pub type CommandFuture<'a> = Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;

/// Supplies commands to device sessions.
///
/// Implementations must be cancel-safe: a session may drop the returned
/// future (e.g. when its peer disconnects) without losing a command.
pub trait CommandSource: Send + Sync + 'static {
    /// Starts accepting commands for `session`, registered as `device`.
    fn open(&self, session: SessionId, device: &str);

    /// Next command for `session`. `None` once the session's queue has been
    /// released or the source has closed.
    fn next_command(&self, session: SessionId) -> CommandFuture<'_>;

    /// Drops `session`'s queue along with any commands still in it.
    /// Idempotent.
    fn release(&self, session: SessionId);
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>>;

struct SessionQueue {
    device: String,
    tx: mpsc::UnboundedSender<String>,
    rx: SharedReceiver,
}

impl SessionQueue {
    fn new(device: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            device: device.to_owned(),
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
        }
    }
}

/// Per-session FIFO of pending commands.
///
/// Operators address a device through its current
/// [`DeviceRecord`](crate::DeviceRecord): `push(record.session, ..)`. A
/// command aimed at a session that has ended, or been replaced by a newer
/// registration, is refused rather than left for the next connection.
#[derive(Default)]
pub struct CommandQueue {
    queues: Mutex<HashMap<SessionId, SessionQueue>>,
    closed: AtomicBool,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, SessionQueue>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues `command` for `session`.
    ///
    /// Returns `false` if the session has no open queue (never opened,
    /// released, or the queue has been closed).
    pub fn push(&self, session: SessionId, command: impl Into<String>) -> bool {
        let command = command.into();
        self.lock()
            .get(&session)
            .is_some_and(|q| q.tx.send(command).is_ok())
    }

    /// Number of commands waiting for `session`.
    ///
    /// Reports 0 while the session is blocked waiting on its queue.
    pub fn pending(&self, session: SessionId) -> usize {
        self.lock()
            .get(&session)
            .map_or(0, |q| q.rx.try_lock().map_or(0, |rx| rx.len()))
    }

    /// Number of sessions with an open queue.
    pub fn open_sessions(&self) -> usize {
        self.lock().len()
    }

    /// Stops handing out commands. Waiting sessions receive `None`.
    pub fn close(&self) {
        let mut queues = self.lock();
        self.closed.store(true, Ordering::Release);
        // Dropping the senders wakes every pending `recv`.
        queues.clear();
    }
}

impl CommandSource for CommandQueue {
    fn open(&self, session: SessionId, device: &str) {
        let mut queues = self.lock();
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        queues
            .entry(session)
            .or_insert_with(|| SessionQueue::new(device));
    }

    fn next_command(&self, session: SessionId) -> CommandFuture<'_> {
        Box::pin(async move {
            let rx = {
                let queues = self.lock();
                queues.get(&session).map(|q| Arc::clone(&q.rx))
            }?;
            let mut rx = rx.lock().await;
            rx.recv().await
        })
    }

    fn release(&self, session: SessionId) {
        let Some(queue) = self.lock().remove(&session) else {
            return;
        };
        // Anything still buffered belonged to this connection only.
        if let Ok(mut rx) = queue.rx.try_lock() {
            rx.close();
            let mut dropped = 0;
            while rx.try_recv().is_ok() {
                dropped += 1;
            }
            if dropped > 0 {
                tracing::debug!(device = %queue.device, dropped, "discarded undelivered commands");
            }
        }
    }
}
