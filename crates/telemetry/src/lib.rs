//! Tracing subscriber bootstrap shared by the server and the CLI.

use lending_kernel::settings::{LogFormat, TelemetrySettings};
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured filter. Events go to stderr so CLI
/// output on stdout stays clean. Safe to call more than once; later calls are
/// no-ops.
pub fn init(settings: &TelemetrySettings) {
    let filter = build_filter(settings);

    let result = match settings.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(true)
            .with_target(false)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init(),
    };

    if result.is_ok() {
        tracing::debug!(
            target: "lending-telemetry",
            format = ?settings.log_format,
            "tracing initialized"
        );
    }
}

fn build_filter(settings: &TelemetrySettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
