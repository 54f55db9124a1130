//! Per-provider channel statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the worker and sender of one provider
#[derive(Debug, Default)]
pub struct ChannelStats {
    polls: AtomicU64,
    rate_limited: AtomicU64,
    empty: AtomicU64,
    dispatched: AtomicU64,
    dropped: AtomicU64,
    ignored: AtomicU64,
    errors: AtomicU64,
    sent: AtomicU64,
}

/// Point-in-time copy of `ChannelStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub polls: u64,
    pub rate_limited: u64,
    pub empty: u64,
    pub dispatched: u64,
    pub dropped: u64,
    pub ignored: u64,
    pub errors: u64,
    pub sent: u64,
}

impl ChannelStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_polls(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        super::poll_attempt();
    }

    pub fn inc_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
        super::rate_limited();
    }

    pub fn inc_empty(&self) {
        self.empty.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dispatched(&self, op: &str) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        super::message_dispatched(op);
    }

    pub fn inc_dropped(&self, reason: &'static str) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        super::message_dropped(reason);
    }

    /// Verified messages not dispatched (unknown op or wrong direction)
    pub fn inc_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
        super::message_dropped("unroutable");
    }

    pub fn inc_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        super::poll_error();
    }

    pub fn inc_sent(&self, op: &str) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        super::message_sent(op);
    }

    /// Get a snapshot of current counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            empty: self.empty.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_increments() {
        let stats = ChannelStats::new();
        stats.inc_polls();
        stats.inc_polls();
        stats.inc_dispatched("SPEAK");
        stats.inc_dropped("decryption");

        let snap = stats.snapshot();
        assert_eq!(snap.polls, 2);
        assert_eq!(snap.dispatched, 1);
        assert_eq!(snap.dropped, 1);
        assert_eq!(snap.errors, 0);
    }
}
