// Keyseize Batch Notification Processing
// Notifications collected during one run-loop wakeup

/// Notifications gathered by one `Platform::wait` call.
///
/// The batch is reused across wakeups; `drain` hands the contents to the
/// dispatcher in arrival order and leaves the allocation in place.
#[derive(Debug, Clone)]
pub struct EventBatch<T> {
    pending: Vec<T>,
}

impl<T> EventBatch<T> {
    pub fn new() -> Self {
        Self::with_capacity(batch_config::DEFAULT_READ_BATCH)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: Vec::with_capacity(capacity.min(batch_config::MAX_BATCH_SIZE)),
        }
    }

    pub fn push(&mut self, notification: T) {
        self.pending.push(notification);
    }

    pub fn extend(&mut self, notifications: impl IntoIterator<Item = T>) {
        self.pending.extend(notifications);
    }

    /// Most recently queued notification, for coalescing
    pub fn last_mut(&mut self) -> Option<&mut T> {
        self.pending.last_mut()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take every queued notification, oldest first
    pub fn drain(&mut self) -> std::vec::Drain<'_, T> {
        self.pending.drain(..)
    }

    pub fn into_vec(self) -> Vec<T> {
        self.pending
    }
}

impl<T> Default for EventBatch<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Batch sizing
pub mod batch_config {
    /// Initial capacity for one wakeup's notifications
    pub const DEFAULT_READ_BATCH: usize = 32;

    /// Upper bound on preallocation
    pub const MAX_BATCH_SIZE: usize = 256;
}
