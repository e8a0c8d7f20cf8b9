//! Traffic counters for a manager

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters shared between the receive loop and callers
#[derive(Debug, Default)]
pub(crate) struct Counters {
    sent: AtomicU64,
    received: AtomicU64,
    handled: AtomicU64,
    replies_delivered: AtomicU64,
    dropped_malformed: AtomicU64,
    dropped_unhandled: AtomicU64,
    message_errors: AtomicU64,
    timeouts: AtomicU64,
}

macro_rules! counter {
    ($($record:ident => $field:ident),* $(,)?) => {
        impl Counters {
            $(
                pub(crate) fn $record(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )*
        }
    };
}

counter! {
    record_sent => sent,
    record_received => received,
    record_handled => handled,
    record_reply_delivered => replies_delivered,
    record_malformed => dropped_malformed,
    record_unhandled => dropped_unhandled,
    record_message_error => message_errors,
    record_timeout => timeouts,
}

impl Counters {
    pub(crate) fn snapshot(&self) -> ManagerStats {
        ManagerStats {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Relaxed),
            replies_delivered: self.replies_delivered.load(Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
            dropped_unhandled: self.dropped_unhandled.load(Ordering::Relaxed),
            message_errors: self.message_errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a manager's traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerStats {
    /// Envelopes handed to the transport
    pub sent: u64,
    /// Frames taken off the inbound queue
    pub received: u64,
    /// Requests passed to a handler
    pub handled: u64,
    /// Replies and errors that reached a waiting caller
    pub replies_delivered: u64,
    /// Frames that failed to decode
    pub dropped_malformed: u64,
    /// Requests with no handler and responses with no waiting caller
    pub dropped_unhandled: u64,
    /// Platform "messageerror" events
    pub message_errors: u64,
    /// Calls that gave up waiting
    pub timeouts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let counters = Counters::default();
        counters.record_sent();
        counters.record_sent();
        counters.record_timeout();

        let stats = counters.snapshot();
        assert_eq!(stats.sent, 2);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.received, 0);
    }
}
