//! Test framework adapters
//!
//! `Standalone` is for callers that manage boundaries themselves. `Suite` is
//! a small sequential runner that honours installed hooks and reports where
//! the current call originates.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Context};
use futures_util::FutureExt;
use tracing::{debug, info, warn};

use crate::traits::TestFramework;
use crate::types::{FrameworkContext, Hook};

/// No test framework; hooks handed to it are dropped
#[derive(Debug, Clone, Copy, Default)]
pub struct Standalone;

impl TestFramework for Standalone {
    fn context(&self) -> FrameworkContext {
        FrameworkContext::Absent
    }

    fn before_all(&self, _hook: Hook) {
        debug!("Standalone mode ignores before-all hooks");
    }

    fn after_each(&self, _hook: Hook) {
        debug!("Standalone mode ignores after-each hooks");
    }

    fn after_all(&self, _hook: Hook) {
        debug!("Standalone mode ignores after-all hooks");
    }
}

/// Number of installed callbacks per boundary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookCounts {
    pub before_all: usize,
    pub after_each: usize,
    pub after_all: usize,
}

#[derive(Default)]
struct SuiteState {
    running: Option<String>,
    before_all_ran: usize,
    finished: bool,
    before_all: Vec<Hook>,
    after_each: Vec<Hook>,
    after_all: Vec<Hook>,
}

/// Sequential suite runner for one test file.
///
/// Before-all hooks run ahead of the next test body, after-each hooks run
/// after every body whatever its outcome, after-all hooks run on `finish`.
pub struct Suite {
    file: String,
    state: Mutex<SuiteState>,
}

impl Suite {
    pub fn new<S: Into<String>>(file: S) -> Self {
        Self {
            file: file.into(),
            state: Mutex::new(SuiteState::default()),
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn hook_counts(&self) -> HookCounts {
        let state = self.lock();
        HookCounts {
            before_all: state.before_all.len(),
            after_each: state.after_each.len(),
            after_all: state.after_all.len(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SuiteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one test body between the suite's hooks.
    ///
    /// The body's own failure wins over a hook failure. A panicking body is
    /// reported as a failure after the after-each hooks ran.
    pub async fn test<F, Fut>(&self, name: &str, body: F) -> anyhow::Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let before_all = {
            let mut state = self.lock();
            if state.finished {
                return Err(anyhow!("suite {} already finished", self.file));
            }
            let pending = state.before_all[state.before_all_ran..].to_vec();
            state.before_all_ran = state.before_all.len();
            pending
        };

        for hook in before_all {
            hook().await.context("before-all hook failed")?;
        }

        debug!("▶️ {} :: {}", self.file, name);
        self.lock().running = Some(name.to_string());
        let outcome = AssertUnwindSafe(body()).catch_unwind().await;
        self.lock().running = None;

        let outcome = outcome.unwrap_or_else(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(anyhow!("test '{}' panicked: {}", name, message))
        });

        let after_each = self.lock().after_each.clone();
        let mut hook_error = None;
        for hook in after_each {
            if let Err(e) = hook().await {
                warn!("⚠️ After-each hook failed for '{}': {}", name, e);
                hook_error = hook_error.or(Some(e));
            }
        }

        outcome?;
        match hook_error {
            Some(e) => Err(anyhow::Error::new(e).context("after-each hook failed")),
            None => Ok(()),
        }
    }

    /// Run the after-all hooks. Later calls do nothing.
    pub async fn finish(&self) -> anyhow::Result<()> {
        let after_all = {
            let mut state = self.lock();
            if state.finished {
                return Ok(());
            }
            state.finished = true;
            state.after_all.clone()
        };

        let mut first_error = None;
        for hook in after_all {
            if let Err(e) = hook().await {
                warn!("⚠️ After-all hook failed: {}", e);
                first_error = first_error.or(Some(e));
            }
        }

        info!("🏁 Suite {} finished", self.file);
        match first_error {
            Some(e) => Err(anyhow::Error::new(e).context("after-all hook failed")),
            None => Ok(()),
        }
    }
}

impl TestFramework for Suite {
    fn context(&self) -> FrameworkContext {
        match &self.lock().running {
            Some(test_name) => FrameworkContext::InsideTest {
                test_name: test_name.clone(),
                test_file: Some(self.file.clone()),
            },
            None => FrameworkContext::OuterScope {
                test_file: Some(self.file.clone()),
            },
        }
    }

    fn before_all(&self, hook: Hook) {
        self.lock().before_all.push(hook);
    }

    fn after_each(&self, hook: Hook) {
        self.lock().after_each.push(hook);
    }

    fn after_all(&self, hook: Hook) {
        self.lock().after_all.push(hook);
    }
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suite")
            .field("file", &self.file)
            .field("hooks", &self.hook_counts())
            .finish()
    }
}
