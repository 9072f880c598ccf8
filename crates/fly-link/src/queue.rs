use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::Notify;
use tracing::{trace, warn};

/// Multi-producer, single-consumer FIFO of encoded datagrams.
///
/// Bounded: pushing onto a full queue evicts the oldest entry, so a stalled
/// sender never holds back the freshest setpoint.
#[derive(Debug)]
pub struct OutboundQueue {
    items: Mutex<VecDeque<Vec<u8>>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

/// Drop warnings are logged for the first eviction and then once per this many.
const DROP_WARN_EVERY: u64 = 100;

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { items: Mutex::new(VecDeque::with_capacity(capacity)), notify: Notify::new(), capacity, dropped: AtomicU64::new(0) }
    }

    /// Returns true if an older packet had to be dropped.
    pub fn push(&self, pkt: Vec<u8>) -> bool {
        let evicted = {
            let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
            let evicted = if items.len() >= self.capacity { items.pop_front().is_some() } else { false };
            items.push_back(pkt);
            evicted
        };
        if evicted {
            let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if n == 1 || n % DROP_WARN_EVERY == 0 {
                warn!("outbound queue full ({}), dropped oldest packet ({} so far)", self.capacity, n);
            } else {
                trace!("outbound queue full, dropped oldest packet");
            }
        }
        self.notify.notify_one();
        evicted
    }

    pub fn try_pop(&self) -> Option<Vec<u8>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
    }

    /// Waits until a packet is available. Cancel-safe: nothing is removed unless returned.
    pub async fn pop(&self) -> Vec<u8> {
        loop {
            let notified = self.notify.notified();
            if let Some(pkt) = self.try_pop() {
                return pkt;
            }
            notified.await;
        }
    }

    pub fn clear(&self) {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Packets evicted by drop-oldest since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
