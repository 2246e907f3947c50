// Copyright PingCAP Inc. 2025.
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; version 2 of the License.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

/// Tracing and structured logging configuration
use serde::Deserialize;
use std::str::FromStr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable format for development
    #[default]
    Human,
    /// JSON format for log aggregation
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            _ => Ok(OutputFormat::Human),
        }
    }
}

/// Filter used when `RUST_LOG` is unset. Long-poll wakeups are logged at
/// trace level, so `debug` is usually enough to follow a game.
fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("stateish={},tower_http=warn,axum=info", level))
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins if set; otherwise `level` applies to this crate.
/// Returns an error if a subscriber is already installed.
pub fn try_init_tracing(
    format: OutputFormat,
    level: &str,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level));

    match format {
        OutputFormat::Human => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .try_init()?,
        OutputFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true),
            )
            .try_init()?,
    }

    tracing::info!(format = ?format, level, "tracing initialized");
    Ok(())
}

/// Initialize tracing, letting `LOG_FORMAT` and `LOG_LEVEL` override the
/// configured format and level.
///
/// ```bash
/// LOG_FORMAT=json LOG_LEVEL=debug stateish --states-dir ./states
/// ```
pub fn init_tracing_from_env(format: OutputFormat, level: &str) {
    let format = std::env::var("LOG_FORMAT")
        .ok()
        .and_then(|s| OutputFormat::from_str(&s).ok())
        .unwrap_or(format);
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| level.to_string());
    if let Err(e) = try_init_tracing(format, &level) {
        eprintln!("tracing already initialized: {e}");
    }
}
