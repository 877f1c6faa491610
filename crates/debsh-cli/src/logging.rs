//! Log output for the `logging` feature.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging from `$DEBSH_LOG`. Only errors are shown when it is unset.
pub fn init() {
    let filter = EnvFilter::builder()
        .with_env_var("DEBSH_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
