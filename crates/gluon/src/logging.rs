//! Tracing subscriber setup.

use gluon_settings::LoggingSettings;

/// Install a stderr `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over `settings.level`. A subscriber that is
/// already installed is left alone, so calling this twice is harmless.
pub fn init_tracing(settings: &LoggingSettings) {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    let _ = if settings.json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
}
