//! Tracing initialization.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing with the given default filter.
///
/// The filter can be overridden by the `RUST_LOG` environment variable.
/// Setting `LOG_FORMAT=json` switches to one JSON object per line, which is
/// what log collectors on the hosting platform expect.
///
/// Calling this more than once is harmless; later calls are ignored.
///
/// # Example
///
/// ```rust
/// use mcp_session_gateway::init_tracing;
///
/// // Debug for the gateway, info for everything else
/// init_tracing("mcp_session_gateway=debug,info");
/// ```
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|format| is_json(&format));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    if let Err(error) = result {
        tracing::debug!(%error, "tracing already initialized");
    }
}

fn is_json(format: &str) -> bool {
    format.trim().eq_ignore_ascii_case("json")
}
