//! Network configuration for the mediator server.

use std::time::Duration;

/// Top-level network configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Prefix for every operation route, e.g. `/api`.
    pub base_path: String,
    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,
    /// How long a mediated request may stay pending before the caller gets
    /// a timeout response.
    pub request_timeout: Duration,
    /// How long shutdown waits for in-flight requests.
    pub drain_timeout: Duration,
}

impl NetworkConfig {
    /// `base_path` with a leading slash and no trailing slash; empty for root.
    #[must_use]
    pub fn base(&self) -> String {
        let trimmed = self.base_path.trim().trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        }
    }

    /// Transport-level timeout. Longer than `request_timeout` so a pending
    /// request expires (and answers 504) before the connection is cut.
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        self.request_timeout + Duration::from_secs(5)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            base_path: "/api".to_string(),
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(30),
        }
    }
}
