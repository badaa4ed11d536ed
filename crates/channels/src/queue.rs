use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
};

use crate::message::PendingMessage;

/// In-memory holding area for messages submitted while the transport is not
/// ready.
///
/// Unbounded: if the transport never becomes ready the queue grows without
/// limit. Entries keep arrival order. The lock is never held across an
/// `.await`, so a plain `std::sync::Mutex` is enough.
#[derive(Debug, Default)]
pub struct DispatchQueue {
    entries: Mutex<VecDeque<PendingMessage>>,
}

impl DispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail. Returns the depth after the push.
    pub fn enqueue(&self, message: PendingMessage) -> usize {
        let mut entries = self.lock();
        entries.push_back(message);
        entries.len()
    }

    /// Take everything currently queued, in arrival order, leaving the queue
    /// empty. Entries enqueued after the lock is taken stay for the next drain.
    pub fn drain_all(&self) -> Vec<PendingMessage> {
        std::mem::take(&mut *self.lock()).into()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<PendingMessage>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
