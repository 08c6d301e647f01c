//! Per-session transfer configuration.

use std::time::Duration;

pub(crate) const DEFAULT_USER_AGENT: &str = concat!("quay/", env!("CARGO_PKG_VERSION"));

/// Knobs a session exposes to the transfer engine.
///
/// Timeouts are enforced by the HTTP client. Batches have no global
/// deadline; callers impose one externally if they need it.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// `User-Agent` for all requests; the crate default when `None`.
    pub user_agent: Option<String>,
    /// TCP/TLS connect deadline.
    pub connect_timeout: Duration,
    /// Per-request deadline, covering the whole body.
    pub request_timeout: Duration,
    /// When `false`, never scan for existing partials and never send
    /// Range requests; every download starts from offset zero.
    pub resume: bool,
    /// When `false`, downloads carry `Pragma: no-cache`.
    pub use_cache: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(1800),
            resume: true,
            use_cache: true,
        }
    }
}

impl SessionConfig {
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    pub fn with_use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }
}
