//! Metrics for the channel
//!
//! Counters go through the `metrics` facade; installing a recorder or
//! exporter is left to the embedding binary. `ChannelStats` keeps the same
//! numbers locally so a provider can report them without a recorder.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

mod collector;

pub use collector::{ChannelStats, StatsSnapshot};

/// Initialize metrics with descriptions
pub fn init_metrics() {
    describe_counter!("channel.poll.attempts", "Inbound poll iterations");
    describe_counter!("channel.poll.rate_limited", "Poll attempts refused by the rate limiter");
    describe_counter!("channel.poll.errors", "Poll iterations that ended in an error");
    describe_counter!("channel.messages.dropped", "Inbound values dropped, labelled by reason");
    describe_counter!("channel.messages.dispatched", "Inbound messages handed to a handler, by op");
    describe_counter!("channel.messages.sent", "Outbound messages published, by op");
    describe_counter!("channel.send.failed", "Outbound sends that returned an error");
    describe_histogram!("channel.handler.duration_ms", "Handler call duration in milliseconds");
}

pub fn poll_attempt() {
    counter!("channel.poll.attempts").increment(1);
}

pub fn rate_limited() {
    counter!("channel.poll.rate_limited").increment(1);
}

pub fn poll_error() {
    counter!("channel.poll.errors").increment(1);
}

pub fn message_dropped(reason: &'static str) {
    counter!("channel.messages.dropped", "reason" => reason).increment(1);
}

pub fn message_dispatched(op: &str) {
    counter!("channel.messages.dispatched", "op" => op.to_string()).increment(1);
}

pub fn message_sent(op: &str) {
    counter!("channel.messages.sent", "op" => op.to_string()).increment(1);
}

pub fn send_failed() {
    counter!("channel.send.failed").increment(1);
}

/// Timer for measuring operation duration
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self { name, start: Instant::now() }
    }

    /// Stop the timer and record the duration
    pub fn stop(self) {
        let duration = self.start.elapsed();
        histogram!(self.name).record(duration.as_secs_f64() * 1000.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_init() {
        // no recorder installed: calls are no-ops and must not panic
        init_metrics();
        poll_attempt();
        message_dropped("integrity");
        message_dispatched("SPEAK");
    }

    #[test]
    fn test_timer() {
        let timer = Timer::new("channel.handler.duration_ms");
        std::thread::sleep(std::time::Duration::from_millis(5));
        timer.stop();
    }
}
