//! Logging utilities for resterx.
//!
//! All crates log through `tracing`; binaries call [`init`] or
//! [`init_with_level`] once at start-up.

use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber at INFO.
///
/// ```
/// use resterx_common::logging;
///
/// logging::init();
/// ```
pub fn init() {
    init_with_level(Level::INFO);
}

/// Initialize the tracing subscriber with a specific log level.
///
/// `RUST_LOG` directives still apply on top of the given level. Calling this
/// twice is harmless; the second call is a no-op.
pub fn init_with_level(level: Level) {
    let mut filter = EnvFilter::from_default_env();
    for target in ["resterx", "resterx_storage", "resterx_rooms", "resterx_backend"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    let result = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(true),
        )
        .with(filter)
        .try_init();

    if result.is_ok() {
        info!("Logging initialized at level: {}", level);
    }
}

/// Parse a level name such as `"debug"`, falling back to INFO.
pub fn parse_level(name: Option<&str>) -> Level {
    name.and_then(|n| n.parse::<Level>().ok())
        .unwrap_or(Level::INFO)
}
