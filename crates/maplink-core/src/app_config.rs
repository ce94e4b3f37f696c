use std::net::SocketAddr;
use std::path::PathBuf;

use crate::coordinates::RegionFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Process-wide settings, read once at startup and shared read-only by every
/// request.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    /// Timeout applied to the redirect-following and page-fetch requests.
    pub http_timeout_secs: u64,
    /// `User-Agent` presented when fetching page HTML.
    pub user_agent: String,
    /// Headless browser executable. `None` lets the browser launcher pick
    /// its default binary.
    pub browser_path: Option<PathBuf>,
    pub region_filter: RegionFilter,
    /// When `false` the render stage never launches a browser.
    pub render_enabled: bool,
}
