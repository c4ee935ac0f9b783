//! Pending request table keyed by system bytes

use crate::error::{SecsError, SecsResult, Timer};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

type Slot<T> = oneshot::Sender<SecsResult<T>>;

/// Table of in-flight requests awaiting a correlated response
///
/// At most one waiter per key. An entry leaves the table exactly once:
/// by [`resolve`](Self::resolve), [`fail`](Self::fail), timeout or drop of
/// the [`PendingRequest`], so a reply racing a timeout is delivered to
/// exactly one of them.
pub struct PendingRequests<T> {
    entries: Arc<Mutex<HashMap<u32, Slot<T>>>>,
}

impl<T> Clone for PendingRequests<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<T> Default for PendingRequests<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

/// Lock a std mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> PendingRequests<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `key`
    ///
    /// # Errors
    /// `Protocol` if a request with the same key is still outstanding.
    pub fn register(&self, key: u32) -> SecsResult<PendingRequest<T>> {
        let (tx, rx) = oneshot::channel();
        let mut entries = lock(&self.entries);
        if entries.contains_key(&key) {
            return Err(SecsError::Protocol(format!(
                "system bytes 0x{:08X} already pending",
                key
            )));
        }
        entries.insert(key, tx);
        Ok(PendingRequest {
            key,
            rx,
            entries: self.entries.clone(),
            done: false,
        })
    }

    /// Deliver `value` to the waiter for `key`
    ///
    /// Returns the value back when nobody is waiting for it.
    pub fn resolve(&self, key: u32, value: T) -> Result<(), T> {
        let slot = lock(&self.entries).remove(&key);
        match slot {
            Some(tx) => match tx.send(Ok(value)) {
                // receiver already gone: hand the value back
                Err(Ok(value)) => Err(value),
                _ => Ok(()),
            },
            None => Err(value),
        }
    }

    /// Fail the waiter for `key`; returns false when there was none
    pub fn fail(&self, key: u32, error: SecsError) -> bool {
        let slot = lock(&self.entries).remove(&key);
        match slot {
            Some(tx) => {
                let _ = tx.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Fail every outstanding waiter, returning how many there were
    pub fn fail_all(&self, error: impl Fn() -> SecsError) -> usize {
        let drained: Vec<_> = lock(&self.entries).drain().collect();
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(error()));
        }
        count
    }

    pub fn contains(&self, key: u32) -> bool {
        lock(&self.entries).contains_key(&key)
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle held by the caller awaiting a response
pub struct PendingRequest<T> {
    key: u32,
    rx: oneshot::Receiver<SecsResult<T>>,
    entries: Arc<Mutex<HashMap<u32, Slot<T>>>>,
    done: bool,
}

impl<T> PendingRequest<T> {
    pub fn key(&self) -> u32 {
        self.key
    }

    /// Wait for the response, failing with `Timeout(timer)` after `timeout`
    pub async fn wait(mut self, timeout: Duration, timer: Timer) -> SecsResult<T> {
        let outcome = tokio::time::timeout(timeout, &mut self.rx).await;
        self.done = true;
        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SecsError::ConnectionClosed),
            Err(_) => {
                let removed = lock(&self.entries).remove(&self.key).is_some();
                if removed {
                    return Err(SecsError::Timeout(timer));
                }
                // lost the race: the response was delivered while timing out
                match self.rx.try_recv() {
                    Ok(result) => result,
                    Err(_) => Err(SecsError::Timeout(timer)),
                }
            }
        }
    }
}

impl<T> Drop for PendingRequest<T> {
    fn drop(&mut self) {
        if !self.done {
            lock(&self.entries).remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_delivers_once() {
        let table = PendingRequests::<u8>::new();
        let waiter = table.register(7).unwrap();
        assert!(table.register(7).is_err());
        assert_eq!(table.resolve(7, 42), Ok(()));
        assert_eq!(table.resolve(7, 43), Err(43));
        assert_eq!(waiter.wait(Duration::from_secs(1), Timer::T3).await.unwrap(), 42);
        assert!(table.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_entry() {
        let table = PendingRequests::<u8>::new();
        let waiter = table.register(1).unwrap();
        let err = waiter.wait(Duration::from_secs(45), Timer::T3).await.unwrap_err();
        assert!(matches!(err, SecsError::Timeout(Timer::T3)));
        assert!(!table.contains(1));
        assert_eq!(table.resolve(1, 9), Err(9));
    }

    #[tokio::test]
    async fn test_fail_all() {
        let table = PendingRequests::<u8>::new();
        let a = table.register(1).unwrap();
        let b = table.register(2).unwrap();
        assert_eq!(table.fail_all(|| SecsError::ConnectionClosed), 2);
        assert!(matches!(
            a.wait(Duration::from_secs(1), Timer::T3).await,
            Err(SecsError::ConnectionClosed)
        ));
        assert!(matches!(
            b.wait(Duration::from_secs(1), Timer::T3).await,
            Err(SecsError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_drop_releases_key() {
        let table = PendingRequests::<u8>::new();
        let waiter = table.register(5).unwrap();
        drop(waiter);
        assert!(!table.contains(5));
        assert!(table.register(5).is_ok());
    }
}
