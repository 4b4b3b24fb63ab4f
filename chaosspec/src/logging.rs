//! Tracing setup shared by tests and the tester binary

use tracing_subscriber::{fmt, EnvFilter};

/// Install a stdout subscriber. `RUST_LOG` takes precedence over `verbose`.
///
/// Safe to call from every test: only the first call installs a subscriber.
pub fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "chaosspec=debug,tester=debug,info"
    } else {
        "chaosspec=info,tester=info,warn"
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
