use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs a global log subscriber for tests.
///
/// Honors `RUST_LOG` when set, otherwise logs at the debug level.
pub fn setup_test_environment() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::default().add_directive(tracing_core::LevelFilter::DEBUG.into())
        });
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .with_test_writer()
            .init();
    });
}
