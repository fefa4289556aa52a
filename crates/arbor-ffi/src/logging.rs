//! Tracing subscriber setup for host processes.

use tracing_subscriber::EnvFilter;

/// Output format of installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    pub(crate) fn parse(name: &str) -> Self {
        if name.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Installs a global subscriber writing to stderr.
///
/// `RUST_LOG` wins over `level` when set. Returns false if a subscriber is
/// already installed or the filter does not parse.
pub(crate) fn init(level: &str, format: LogFormat) -> bool {
    let filter = match EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level)) {
        Ok(filter) => filter,
        Err(_) => return false,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match format {
        LogFormat::Text => builder.try_init().is_ok(),
        LogFormat::Json => builder.json().try_init().is_ok(),
    };
    if installed {
        tracing::debug!(level, ?format, "logging initialised");
    }
    installed
}
