//! Downstream operation handlers
//!
//! The worker hands each verified body to one method per operation and
//! only looks at the returned `Result`. Methods default to `Unsupported`,
//! so a handler for one side of the channel implements only the
//! operations that side receives.

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use thiserror::Error;

use crate::core_envelope::Operation;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Handler failed: {0}")]
    Failed(String),

    #[error("Operation {0} is not handled here")]
    Unsupported(Operation),

    #[error("Handler panicked: {0}")]
    Panicked(String),
}

pub type HandlerResult = Result<(), HandlerError>;

#[async_trait]
pub trait OperationHandler: Send + Sync {
    /// Agent action for review
    async fn on_speak(&self, body: Value) -> HandlerResult {
        let _ = body;
        Err(HandlerError::Unsupported(Operation::Speak))
    }

    /// Agent deferral
    async fn on_defer(&self, body: Value) -> HandlerResult {
        let _ = body;
        Err(HandlerError::Unsupported(Operation::Defer))
    }

    /// Agent memory request (learn, remember, forget)
    async fn on_memory(&self, body: Value) -> HandlerResult {
        let _ = body;
        Err(HandlerError::Unsupported(Operation::Memory))
    }

    async fn on_observe(&self, body: Value) -> HandlerResult {
        let _ = body;
        Err(HandlerError::Unsupported(Operation::Observe))
    }

    async fn on_correction(&self, body: Value) -> HandlerResult {
        let _ = body;
        Err(HandlerError::Unsupported(Operation::Correction))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Route `body` to the method for `op`, converting a panic into
/// `HandlerError::Panicked`. Returns `None` for unknown operations.
pub async fn dispatch(
    handler: &dyn OperationHandler,
    op: &Operation,
    body: Value,
) -> Option<HandlerResult> {
    let call = match op {
        Operation::Speak => handler.on_speak(body),
        Operation::Defer => handler.on_defer(body),
        Operation::Memory => handler.on_memory(body),
        Operation::Observe => handler.on_observe(body),
        Operation::Correction => handler.on_correction(body),
        Operation::Unknown(_) => return None,
    };

    let result = match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(HandlerError::Panicked(panic_message(payload))),
    };
    Some(result)
}
