use tokio::sync::{Mutex, MutexGuard};

/// Serializes store writers.
///
/// Backed by the tokio mutex, which hands the lock to waiters in the order
/// they started waiting. There is no timeout: a stuck writer holds up every
/// writer queued behind it.
#[derive(Debug, Default)]
pub struct WriteLock {
    inner: Mutex<()>,
}

/// Held for the duration of one read-modify-write cycle.
#[derive(Debug)]
pub struct WriteGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl WriteLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self) -> WriteGuard<'_> {
        WriteGuard {
            _guard: self.inner.lock().await,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}
