//! Secure channel runtime
//!
//! - `provider`: session lifecycle (`open`, `start`, `stop`)
//! - `worker`: inbound polling loop
//! - `sender`: outbound publishing
//! - `rate_limiter`: sliding-window admission for inbound polls
//! - `handlers`: downstream per-operation handler trait

mod error;
pub mod handlers;
pub mod provider;
pub mod rate_limiter;
pub mod sender;
pub mod session;
pub mod worker;

pub use error::{ChannelError, ChannelResult, DropReason, PollError, SendError};
pub use handlers::{dispatch, HandlerError, HandlerResult, OperationHandler};
pub use provider::{ChannelProvider, ProviderOptions, ProviderState};
pub use rate_limiter::{RateLimiterConfig, SlidingWindowLimiter};
pub use sender::OutboundSender;
pub use session::{ChannelSession, InboundValue};
pub use worker::{InboundWorker, PollConfig, PollOutcome};
