//! Tracing subscriber setup for hosts that do not install their own.
//!
//! `RUST_LOG` wins when set; otherwise `level` (normally
//! `general.log_level` from the engine config) applies to everything.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::error::{BattleError, Result};

/// Install a global subscriber writing to stderr.
///
/// # Errors
/// Returns [`BattleError::Logging`] if `level` is not a valid filter or a
/// global subscriber is already installed.
pub fn init(level: &str, json: bool) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).map_err(|e| BattleError::Logging(e.to_string()))?,
    };

    let json_layer = json.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!json).then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| BattleError::Logging(e.to_string()))?;

    tracing::info!(level, json, "Logging initialized");
    Ok(())
}
