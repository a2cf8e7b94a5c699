use crate::error::AppError;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global fmt subscriber. `level` is the default directive and
/// `RUST_LOG` refines it. Fails instead of panicking when a subscriber is
/// already installed.
pub fn setup_logging(level: &str) -> Result<(), AppError> {
    let level = level
        .parse::<LevelFilter>()
        .map_err(|error| AppError::InvalidArgument(format!("log level {level:?}: {error}")))?;

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init()
        .map_err(|error| AppError::Logging(error.to_string()))
}
