//! Bounded-in-spirit MPSC handoff queue between pipeline worker threads.
//!
//! Wraps [`std::sync::mpsc::channel`], the idiomatic equivalent of a
//! mutex-and-semaphore-gated linked list: `recv` blocks exactly like a
//! semaphore wait followed by a dequeue, and `send` never blocks. Shutdown is
//! modeled as an explicit item rather than by dropping the sender, so a
//! worker's `recv` loop has one uniform match arm for "real work" vs. "time
//! to stop" instead of having to special-case a channel-closed error.

use std::sync::mpsc::{self, Receiver, RecvError, SendError, Sender};

/// One slot in the queue: either a unit of work or the shutdown sentinel.
#[derive(Debug)]
pub enum QueueItem<T> {
    Work(T),
    Shutdown,
}

pub struct QueueSender<T> {
    inner: Sender<QueueItem<T>>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

pub struct QueueReceiver<T> {
    inner: Receiver<QueueItem<T>>,
}

/// A value popped off the queue: either real work, or a signal that the
/// queue has been closed and the worker should exit its loop.
#[derive(Debug, PartialEq, Eq)]
pub enum Popped<T> {
    Work(T),
    Shutdown,
}

impl<T> QueueSender<T> {
    /// Enqueue a unit of work. Never blocks.
    pub fn push(&self, value: T) -> Result<(), SendError<QueueItem<T>>> {
        self.inner.send(QueueItem::Work(value))
    }

    /// Enqueue the shutdown sentinel. Workers draining the queue see this
    /// after all work pushed before it, since the underlying channel is FIFO.
    pub fn close(&self) -> Result<(), SendError<QueueItem<T>>> {
        self.inner.send(QueueItem::Shutdown)
    }
}

impl<T> QueueReceiver<T> {
    /// Block until a value or the shutdown sentinel is available. Returns
    /// `Err` only if every sender has been dropped without a `close()` call.
    pub fn pop(&self) -> Result<Popped<T>, RecvError> {
        match self.inner.recv()? {
            QueueItem::Work(value) => Ok(Popped::Work(value)),
            QueueItem::Shutdown => Ok(Popped::Shutdown),
        }
    }
}

/// Create a connected sender/receiver pair.
pub fn channel<T>() -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::channel();
    (QueueSender { inner: tx }, QueueReceiver { inner: rx })
}
