//! Listener configuration.

/// Listener configuration read from the environment.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `HOST` | `127.0.0.1` | Server bind address |
/// | `PORT` | `3000` | Server port |
/// | `SERVICE_NAME` | crate name | Reported by `/health` |
///
/// # Example
///
/// ```rust
/// use mcp_session_gateway::BaseConfig;
///
/// let config = BaseConfig::from_env();
/// println!("binding {}", config.socket_addr());
/// ```
#[derive(Clone, Debug)]
pub struct BaseConfig {
    /// Server bind address (default: 127.0.0.1)
    pub host: String,
    /// Server port (default: 3000)
    pub port: u16,
    /// Service name reported by the health endpoint
    pub service_name: String,
}

impl BaseConfig {
    /// Create a new config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            service_name: lookup("SERVICE_NAME")
                .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string()),
        }
    }

    /// Get the socket address for binding.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL clients use to reach this listener.
    ///
    /// Wildcard bind addresses are reported as `localhost`.
    pub fn public_url(&self) -> String {
        let host = match self.host.as_str() {
            "0.0.0.0" | "::" | "[::]" => "localhost",
            other => other,
        };
        format!("http://{}:{}", host, self.port)
    }
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
