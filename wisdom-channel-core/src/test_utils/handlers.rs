//! Scripted operation handlers

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::core_channel::{HandlerError, HandlerResult, OperationHandler};
use crate::core_envelope::Operation;

/// Records every body it receives. Chosen operations can be made to fail
/// or panic after being recorded.
#[derive(Default)]
pub struct RecordingHandler {
    received: Mutex<Vec<(Operation, Value)>>,
    fail_on: HashSet<Operation>,
    panic_on: HashSet<Operation>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(mut self, op: Operation) -> Self {
        self.fail_on.insert(op);
        self
    }

    pub fn panicking_on(mut self, op: Operation) -> Self {
        self.panic_on.insert(op);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(Operation, Value)>> {
        self.received.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn received(&self) -> Vec<(Operation, Value)> {
        self.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    pub fn count_of(&self, op: &Operation) -> usize {
        self.lock().iter().filter(|(o, _)| o == op).count()
    }

    fn record(&self, op: Operation, body: Value) -> HandlerResult {
        self.lock().push((op.clone(), body));
        if self.panic_on.contains(&op) {
            panic!("scripted panic on {}", op);
        }
        if self.fail_on.contains(&op) {
            return Err(HandlerError::Failed(format!("scripted failure on {}", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl OperationHandler for RecordingHandler {
    async fn on_speak(&self, body: Value) -> HandlerResult {
        self.record(Operation::Speak, body)
    }

    async fn on_defer(&self, body: Value) -> HandlerResult {
        self.record(Operation::Defer, body)
    }

    async fn on_memory(&self, body: Value) -> HandlerResult {
        self.record(Operation::Memory, body)
    }

    async fn on_observe(&self, body: Value) -> HandlerResult {
        self.record(Operation::Observe, body)
    }

    async fn on_correction(&self, body: Value) -> HandlerResult {
        self.record(Operation::Correction, body)
    }
}

/// Fails every call
#[derive(Default)]
pub struct FailingHandler {
    calls: AtomicUsize,
}

impl FailingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail(&self, op: Operation) -> HandlerResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(HandlerError::Failed(format!("{} rejected", op)))
    }
}

#[async_trait]
impl OperationHandler for FailingHandler {
    async fn on_speak(&self, _body: Value) -> HandlerResult {
        self.fail(Operation::Speak)
    }

    async fn on_defer(&self, _body: Value) -> HandlerResult {
        self.fail(Operation::Defer)
    }

    async fn on_memory(&self, _body: Value) -> HandlerResult {
        self.fail(Operation::Memory)
    }

    async fn on_observe(&self, _body: Value) -> HandlerResult {
        self.fail(Operation::Observe)
    }

    async fn on_correction(&self, _body: Value) -> HandlerResult {
        self.fail(Operation::Correction)
    }
}
