//! Session statistics collection

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Session statistics
///
/// Counters are atomics so the reader task, link driver and callers can
/// update them without a lock. Use [`snapshot`](Self::snapshot) to read.
#[derive(Debug, Default)]
pub struct SessionStatistics {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    replies_matched: AtomicU64,
    unsolicited: AtomicU64,
    timeouts: AtomicU64,
    rejects_sent: AtomicU64,
    rejects_received: AtomicU64,
    connects: AtomicU64,
    disconnects: AtomicU64,
    retries: AtomicU64,
    checksum_errors: AtomicU64,
}

/// Point-in-time copy of [`SessionStatistics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatisticsSnapshot {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub replies_matched: u64,
    pub unsolicited: u64,
    pub timeouts: u64,
    pub rejects_sent: u64,
    pub rejects_received: u64,
    pub connects: u64,
    pub disconnects: u64,
    pub retries: u64,
    pub checksum_errors: u64,
}

impl StatisticsSnapshot {
    /// Fraction of received messages that were unsolicited
    pub fn unsolicited_rate(&self) -> f64 {
        if self.messages_received == 0 {
            0.0
        } else {
            self.unsolicited as f64 / self.messages_received as f64
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl SessionStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_messages_sent(&self) {
        bump(&self.messages_sent);
    }

    pub fn increment_messages_received(&self) {
        bump(&self.messages_received);
    }

    pub fn increment_replies_matched(&self) {
        bump(&self.replies_matched);
    }

    pub fn increment_unsolicited(&self) {
        bump(&self.unsolicited);
    }

    pub fn increment_timeouts(&self) {
        bump(&self.timeouts);
    }

    pub fn increment_rejects_sent(&self) {
        bump(&self.rejects_sent);
    }

    pub fn increment_rejects_received(&self) {
        bump(&self.rejects_received);
    }

    pub fn increment_connects(&self) {
        bump(&self.connects);
    }

    pub fn increment_disconnects(&self) {
        bump(&self.disconnects);
    }

    pub fn increment_retries(&self) {
        bump(&self.retries);
    }

    pub fn increment_checksum_errors(&self) {
        bump(&self.checksum_errors);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatisticsSnapshot {
            messages_sent: get(&self.messages_sent),
            messages_received: get(&self.messages_received),
            replies_matched: get(&self.replies_matched),
            unsolicited: get(&self.unsolicited),
            timeouts: get(&self.timeouts),
            rejects_sent: get(&self.rejects_sent),
            rejects_received: get(&self.rejects_received),
            connects: get(&self.connects),
            disconnects: get(&self.disconnects),
            retries: get(&self.retries),
            checksum_errors: get(&self.checksum_errors),
        }
    }
}
