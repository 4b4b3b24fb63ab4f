//! Scoped Cleanup Registry
//!
//! Deferred teardown actions grouped into two buckets: `test` (drained after
//! every test) and `suite` (drained once when the suite ends). Draining is
//! best-effort: every captured action runs even if others fail or panic.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use tracing::{debug, warn};

/// Which bucket owns a cleanup action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    #[default]
    Test,
    Suite,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Test => write!(f, "test"),
            Scope::Suite => write!(f, "suite"),
        }
    }
}

pub type CleanupAction = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

/// Outcome of one drain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    pub ran: usize,
    pub failed: usize,
}

#[derive(Clone, Default)]
pub struct CleanupRegistry {
    buckets: Arc<Mutex<HashMap<Scope, Vec<CleanupAction>>>>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action in the test bucket
    pub fn register<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register_in(Scope::Test, action);
    }

    pub fn register_in<F, Fut>(&self, scope: Scope, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let boxed: CleanupAction = Box::new(move || action().boxed());
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        buckets.entry(scope).or_default().push(boxed);
    }

    /// Number of actions waiting in a bucket
    pub fn pending(&self, scope: Scope) -> usize {
        let buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        buckets.get(&scope).map_or(0, Vec::len)
    }

    /// Empty the bucket, then run everything it held concurrently.
    ///
    /// Actions registered while the drain is running land in the next
    /// generation. Failures and panics are logged and discarded.
    pub async fn drain(&self, scope: Scope) -> DrainReport {
        let actions = {
            let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(buckets.entry(scope).or_default())
        };

        if actions.is_empty() {
            return DrainReport::default();
        }

        debug!("🧹 Draining {} {} cleanup actions", actions.len(), scope);

        let runs = actions
            .into_iter()
            .map(|action| AssertUnwindSafe(action()).catch_unwind());
        let outcomes = join_all(runs).await;

        let mut report = DrainReport {
            ran: outcomes.len(),
            failed: 0,
        };

        for outcome in outcomes {
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!("⚠️ {} cleanup action failed: {:#}", scope, e);
                }
                Err(_) => {
                    report.failed += 1;
                    warn!("⚠️ {} cleanup action panicked", scope);
                }
            }
        }

        report
    }

    pub async fn cleanup_after_each_test(&self) -> DrainReport {
        self.drain(Scope::Test).await
    }

    pub async fn cleanup_after_suite(&self) -> DrainReport {
        self.drain(Scope::Suite).await
    }
}

impl fmt::Debug for CleanupRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupRegistry")
            .field("test", &self.pending(Scope::Test))
            .field("suite", &self.pending(Scope::Suite))
            .finish()
    }
}
