/*
    InboundWorker - polling loop for the inbound slot

    Each iteration:
    1. asks the limiter for admission; refusal backs off without touching
       the mailbox
    2. reads the inbound slot; an empty slot or the value already
       processed backs off
    3. decrypts and verifies; failures are logged and dropped
    4. dispatches known operations coming from the counterpart role

    Errors end the iteration, never the loop. Only the stop signal does,
    and it also cuts short any backoff sleep. An in-flight mailbox call is
    never cancelled.
*/

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::error::{DropReason, PollError};
use super::handlers::{self, OperationHandler};
use super::session::ChannelSession;
use crate::core_envelope::Operation;
use crate::metrics::Timer;

/// Backoff delays of the polling loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Sleep after an empty or already-seen slot
    #[serde(with = "humantime_serde")]
    pub empty_backoff: Duration,
    /// Sleep after the limiter refused an attempt
    #[serde(with = "humantime_serde")]
    pub rate_limit_backoff: Duration,
    /// Sleep after a failed iteration
    #[serde(with = "humantime_serde")]
    pub error_backoff: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            empty_backoff: Duration::from_millis(500),
            rate_limit_backoff: Duration::from_secs(1),
            error_backoff: Duration::from_secs(1),
        }
    }
}

/// What one iteration did
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    RateLimited,
    Empty,
    /// The slot still holds the value processed last time
    AlreadySeen,
    Dropped(DropReason),
    /// Verified, but unknown or not accepted from the counterpart
    Ignored(Operation),
    Dispatched { op: Operation, id: String },
}

impl PollOutcome {
    /// Delay before the next iteration, `None` to continue at once
    pub fn backoff(&self, config: &PollConfig) -> Option<Duration> {
        match self {
            PollOutcome::RateLimited => Some(config.rate_limit_backoff),
            PollOutcome::Empty | PollOutcome::AlreadySeen => Some(config.empty_backoff),
            PollOutcome::Dropped(_) | PollOutcome::Ignored(_) | PollOutcome::Dispatched { .. } => {
                None
            }
        }
    }
}

fn stop_requested(stop: &watch::Receiver<bool>) -> bool {
    match stop.has_changed() {
        Err(_) => true,
        Ok(_) => *stop.borrow(),
    }
}

pub struct InboundWorker {
    session: Arc<ChannelSession>,
    handler: Arc<dyn OperationHandler>,
    config: PollConfig,
    last_seen: Option<blake3::Hash>,
}

impl InboundWorker {
    pub fn new(
        session: Arc<ChannelSession>,
        handler: Arc<dyn OperationHandler>,
        config: PollConfig,
    ) -> Self {
        InboundWorker {
            session,
            handler,
            config,
            last_seen: None,
        }
    }

    /// Run a single iteration without sleeping
    pub async fn poll_once(&mut self) -> Result<PollOutcome, PollError> {
        let stats = self.session.stats();
        stats.inc_polls();

        if !self.session.admit_poll().await {
            stats.inc_rate_limited();
            return Ok(PollOutcome::RateLimited);
        }

        let Some(wire) = self.session.fetch_inbound().await? else {
            stats.inc_empty();
            return Ok(PollOutcome::Empty);
        };

        // Remember the value before looking inside it, so a value that
        // fails verification is not retried either.
        let fingerprint = blake3::hash(&wire);
        if self.last_seen == Some(fingerprint) {
            stats.inc_empty();
            return Ok(PollOutcome::AlreadySeen);
        }
        self.last_seen = Some(fingerprint);

        let envelope = match self.session.open_value(&wire) {
            Ok(envelope) => envelope,
            Err(reason) => {
                warn!(
                    record = %self.session.handle().key(),
                    reason = %reason,
                    bytes = wire.len(),
                    "dropping inbound value"
                );
                stats.inc_dropped(reason.as_str());
                return Ok(PollOutcome::Dropped(reason));
            }
        };

        let op = envelope.op().clone();
        let expected = self.session.role().counterpart();
        if op.sender_role() != Some(expected) {
            warn!(id = %envelope.id(), op = %op, role = %self.session.role(), "operation not accepted inbound, dropping");
            stats.inc_ignored();
            return Ok(PollOutcome::Ignored(op));
        }

        let id = envelope.id().to_string();
        debug!(id = %id, op = %op, "dispatching");

        let timer = Timer::new("channel.handler.duration_ms");
        let result = handlers::dispatch(self.handler.as_ref(), &op, envelope.into_body()).await;
        timer.stop();

        match result {
            Some(Ok(())) => {
                stats.inc_dispatched(op.as_str());
                info!(id = %id, op = %op, "message handled");
                Ok(PollOutcome::Dispatched { op, id })
            }
            Some(Err(source)) => Err(PollError::Handler { op, source }),
            None => {
                stats.inc_ignored();
                Ok(PollOutcome::Ignored(op))
            }
        }
    }

    /// Poll until `stop` flips to true or its sender goes away
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        info!(
            role = %self.session.role(),
            record = %self.session.handle().key(),
            "inbound worker started"
        );

        loop {
            if stop_requested(&stop) {
                break;
            }

            let delay = match self.poll_once().await {
                Ok(outcome) => outcome.backoff(&self.config),
                Err(e) => {
                    self.session.stats().inc_errors();
                    warn!(error = %e, "poll iteration failed");
                    Some(self.config.error_backoff)
                }
            };

            if let Some(delay) = delay {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = stop.changed() => {}
                }
            }
        }

        info!(record = %self.session.handle().key(), "inbound worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_channel::RateLimiterConfig;
    use crate::test_utils::{fast_poll_config, ChannelPair, PairConfig, RecordingHandler};
    use serde_json::json;

    fn worker_for(pair: &ChannelPair, handler: Arc<RecordingHandler>) -> InboundWorker {
        InboundWorker::new(pair.wa.session().clone(), handler, fast_poll_config())
    }

    #[tokio::test]
    async fn test_poll_outcomes() {
        let pair = ChannelPair::new().await.unwrap();
        let handler = Arc::new(RecordingHandler::new());
        let mut worker = worker_for(&pair, handler.clone());

        assert_eq!(worker.poll_once().await.unwrap(), PollOutcome::Empty);

        let id = pair.agent.send(Operation::Speak, json!({"text": "hello"})).await.unwrap();
        assert_eq!(
            worker.poll_once().await.unwrap(),
            PollOutcome::Dispatched { op: Operation::Speak, id }
        );
        assert_eq!(worker.poll_once().await.unwrap(), PollOutcome::AlreadySeen);
        assert_eq!(handler.count(), 1);
        pair.shutdown().await;
    }

    #[tokio::test]
    async fn test_limiter_refusal_skips_mailbox() {
        let config = PairConfig {
            rate_limit: RateLimiterConfig { max_per_window: 1, window: Duration::from_secs(60) },
            wa_get_failures: usize::MAX,
            ..PairConfig::default()
        };
        let pair = ChannelPair::build(config).await.unwrap();
        let mut worker = worker_for(&pair, Arc::new(RecordingHandler::new()));

        assert!(matches!(worker.poll_once().await, Err(PollError::Mailbox(_))));
        assert_eq!(worker.poll_once().await.unwrap(), PollOutcome::RateLimited);
        assert_eq!(pair.wa_mailbox.as_ref().unwrap().gets(), 1);
        pair.shutdown().await;
    }

    #[tokio::test]
    async fn test_handler_error_surfaces() {
        let pair = ChannelPair::new().await.unwrap();
        let handler = Arc::new(RecordingHandler::new().failing_on(Operation::Defer));
        let mut worker = worker_for(&pair, handler);

        pair.agent.send(Operation::Defer, json!({})).await.unwrap();
        match worker.poll_once().await {
            Err(PollError::Handler { op, .. }) => assert_eq!(op, Operation::Defer),
            other => panic!("expected handler error, got {:?}", other),
        }
        // not retried
        assert_eq!(worker.poll_once().await.unwrap(), PollOutcome::AlreadySeen);
        pair.shutdown().await;
    }

    #[test]
    fn test_backoff_by_outcome() {
        let config = PollConfig::default();
        assert_eq!(PollOutcome::RateLimited.backoff(&config), Some(Duration::from_secs(1)));
        assert_eq!(PollOutcome::Empty.backoff(&config), Some(Duration::from_millis(500)));
        assert_eq!(PollOutcome::Dropped(DropReason::Integrity).backoff(&config), None);
    }

    #[tokio::test]
    async fn test_run_exits_on_stop() {
        let pair = ChannelPair::new().await.unwrap();
        let worker = worker_for(&pair, Arc::new(RecordingHandler::new()));
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(worker.run(rx));

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        pair.shutdown().await;
    }
}
