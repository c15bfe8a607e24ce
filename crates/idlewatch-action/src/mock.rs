//! Mock terminal action for testing

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::{ActionError, ActionResult, TerminalAction};

/// Records how often it is executed and performed; can be told to fail.
///
/// Clones share their counters, so a test can keep one copy while the
/// monitor owns another.
#[derive(Debug, Clone)]
pub struct MockAction {
    label: String,
    executions: Arc<AtomicUsize>,
    performed: Arc<AtomicUsize>,
    fail: Arc<Mutex<bool>>,
}

impl MockAction {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            executions: Arc::new(AtomicUsize::new(0)),
            performed: Arc::new(AtomicUsize::new(0)),
            fail: Arc::new(Mutex::new(false)),
        }
    }

    /// Make subsequent performs fail (or succeed again)
    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap_or_else(PoisonError::into_inner) = fail;
    }

    /// Calls to `execute`, dry or live
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    /// Calls that reached the destructive step
    pub fn performed(&self) -> usize {
        self.performed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TerminalAction for MockAction {
    fn describe(&self) -> String {
        self.label.clone()
    }

    async fn perform(&self) -> ActionResult<()> {
        self.performed.fetch_add(1, Ordering::SeqCst);
        if *self.fail.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(ActionError::Failed(format!("{} failed", self.label)));
        }
        Ok(())
    }

    async fn execute(&self, dry_run: bool) -> ActionResult<()> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        if dry_run {
            return Ok(());
        }
        self.perform().await
    }
}
