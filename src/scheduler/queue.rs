use tokio::sync::mpsc::{self, OwnedPermit};
use tokio::sync::Mutex;

use crate::error::{RelayError, Result};
use crate::scheduler::job::Job;

/// Bounded hand-off between the claim scheduler and the worker pool.
///
/// Capacity is counted in slots. A slot is taken either by a queued job or by
/// a [`OwnedPermit`] held while a claim is still being verified, so claimed +
/// claiming jobs never exceed the capacity.
#[derive(Debug)]
pub struct DispatchQueue {
    tx: mpsc::Sender<Job>,
    rx: Mutex<mpsc::Receiver<Job>>,
    capacity: usize,
}

impl DispatchQueue {
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(RelayError::Config(
                "dispatch queue capacity must be at least 1".to_string(),
            ));
        }
        let (tx, rx) = mpsc::channel(capacity);
        Ok(Self {
            tx,
            rx: Mutex::new(rx),
            capacity,
        })
    }

    /// Reserve one slot. Returns `None` when the queue is full.
    pub fn try_reserve(&self) -> Option<OwnedPermit<Job>> {
        self.tx.clone().try_reserve_owned().ok()
    }

    /// Wait for the next job. Consumers take turns on the receiver.
    pub async fn recv(&self) -> Option<Job> {
        self.rx.lock().await.recv().await
    }

    /// Take a queued job without waiting.
    pub async fn try_recv(&self) -> Option<Job> {
        self.rx.lock().await.try_recv().ok()
    }

    /// Slots in use, reserved or filled.
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.tx.capacity() == 0
    }

    pub fn remaining(&self) -> usize {
        self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
