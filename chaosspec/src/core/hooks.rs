//! Lifecycle Hook Arming
//!
//! Decides once per harness whether test and suite boundaries are handled by
//! callbacks installed in the host test framework or by the caller itself.
//!
//! ```text
//! Unarmed --(outer scope)--> ArmedHooks   install before-all / after-each / after-all
//! Unarmed --(inside test)--> ArmedInline  start fault infrastructure in place
//! ```
//!
//! Both transitions are irreversible; a new harness is needed to re-arm.

use std::sync::Arc;

use futures_util::FutureExt;
use regex::Regex;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::core::manager::NetworkFaultManager;
use crate::core::registry::CleanupRegistry;
use crate::error::{HarnessError, HarnessResult};
use crate::traits::TestFramework;
use crate::types::{FrameworkContext, Hook, HookMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmState {
    Unarmed,
    ArmedInline,
    ArmedHooks,
}

struct ArmerInner {
    framework: Arc<dyn TestFramework>,
    manager: NetworkFaultManager,
    registry: CleanupRegistry,
    autowire_pattern: Regex,
    state: Mutex<ArmState>,
}

#[derive(Clone)]
pub struct HookArmer {
    inner: Arc<ArmerInner>,
}

impl HookArmer {
    pub fn new(
        framework: Arc<dyn TestFramework>,
        manager: NetworkFaultManager,
        registry: CleanupRegistry,
        autowire_pattern: &str,
    ) -> HarnessResult<Self> {
        let autowire_pattern = Regex::new(autowire_pattern)
            .map_err(|_| HarnessError::config("autowire_pattern", autowire_pattern))?;

        Ok(Self {
            inner: Arc::new(ArmerInner {
                framework,
                manager,
                registry,
                autowire_pattern,
                state: Mutex::new(ArmState::Unarmed),
            }),
        })
    }

    pub async fn state(&self) -> ArmState {
        *self.inner.state.lock().await
    }

    /// Make sure lifecycle boundaries are covered for the calling context.
    ///
    /// Only the first call that finds a test framework changes anything;
    /// later calls report the mode matching their context without side
    /// effects. The state lock is held across the transition, so concurrent
    /// first callers see a single arming.
    pub async fn ensure_hooks(&self) -> HarnessResult<HookMode> {
        let context = self.inner.framework.context();

        let inside_test = match context {
            FrameworkContext::Absent => return Ok(HookMode::Inline),
            FrameworkContext::InsideTest { .. } => true,
            FrameworkContext::OuterScope { .. } => false,
        };

        let mut state = self.inner.state.lock().await;
        if *state != ArmState::Unarmed {
            return Ok(if inside_test {
                HookMode::Inline
            } else {
                HookMode::Hooks
            });
        }

        if inside_test {
            // Hooks can no longer be installed for this body. A failed start
            // leaves the armer unarmed so the next call retries.
            self.inner.manager.start().await?;
            *state = ArmState::ArmedInline;
            warn!(
                "⚠️ Running in inline mode for {} (called inside a test). \
                 Call `autowire()` at suite scope or name the file `*_chaos.rs` \
                 to get automatic lifecycle hooks.",
                context.test_file().unwrap_or("(unknown)")
            );
            return Ok(HookMode::Inline);
        }

        *state = ArmState::ArmedHooks;
        self.install_hooks();
        Ok(HookMode::Hooks)
    }

    /// Arm hooks for a chaos test file without creating a service.
    ///
    /// Returns whether this call installed them.
    pub async fn autowire(&self) -> HarnessResult<bool> {
        let context = self.inner.framework.context();

        let test_file = match &context {
            FrameworkContext::OuterScope {
                test_file: Some(file),
            } => file.clone(),
            _ => return Ok(false),
        };

        if !self.inner.autowire_pattern.is_match(&test_file) {
            return Ok(false);
        }

        let mut state = self.inner.state.lock().await;
        if *state != ArmState::Unarmed {
            return Ok(false);
        }

        *state = ArmState::ArmedHooks;
        self.install_hooks();
        info!("🔗 Autowired lifecycle hooks for {}", test_file);
        Ok(true)
    }

    fn install_hooks(&self) {
        let framework = &self.inner.framework;

        let manager = self.inner.manager.clone();
        let before_all: Hook = Arc::new(move || {
            let manager = manager.clone();
            async move { manager.start().await }.boxed()
        });

        let manager = self.inner.manager.clone();
        let registry = self.inner.registry.clone();
        let after_each: Hook = Arc::new(move || {
            let manager = manager.clone();
            let registry = registry.clone();
            async move {
                registry.cleanup_after_each_test().await;
                manager.reset().await
            }
            .boxed()
        });

        let manager = self.inner.manager.clone();
        let registry = self.inner.registry.clone();
        let after_all: Hook = Arc::new(move || {
            let manager = manager.clone();
            let registry = registry.clone();
            async move {
                registry.cleanup_after_suite().await;
                manager.stop().await
            }
            .boxed()
        });

        framework.before_all(before_all);
        framework.after_each(after_each);
        framework.after_all(after_all);

        info!("🪝 Installed lifecycle hooks");
    }
}
