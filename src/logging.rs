//! Process-wide log output.
//!
//! Library code only emits `tracing` events inside each dispatcher's span;
//! installing a subscriber is left to the process that owns `main`.

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install a formatting subscriber at `level`.
///
/// Call once at process start. A second call leaves the existing subscriber
/// in place and returns an error.
pub fn init(level: Level) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
}
