use std::time::Duration;

/// Environment variable holding the resource store base URL.
pub const BASE_URL_ENV: &str = "ECOLE_API_BASE_URL";
/// Environment variable holding the request timeout in milliseconds (`0` disables it).
pub const TIMEOUT_MS_ENV: &str = "ECOLE_API_TIMEOUT_MS";

/// Default store address used by the dashboard (json-server's default port).
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Resource client configuration
///
/// The base URL is the only process-wide setting the dashboard needs; the
/// rest tunes the HTTP transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Store root, without trailing slash
    pub base_url: String,

    /// Per-request timeout; expiry surfaces as a network error
    pub timeout: Option<Duration>,

    /// Connect timeout
    pub connect_timeout: Duration,

    /// User-Agent header sent with every request
    pub user_agent: String,
}

impl ClientConfig {
    /// Create a configuration for the given store root
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            timeout: Some(Duration::from_secs(10)),
            connect_timeout: Duration::from_secs(5),
            user_agent: format!("ecole221/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disable the request timeout
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the User-Agent header
    pub fn user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    /// Parse from a store URL
    ///
    /// Accepts `http://host[:port][/prefix]` and `https://...`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use ecole221::ClientConfig;
    /// let config = ClientConfig::from_url("http://localhost:3000/").unwrap();
    /// assert_eq!(config.base_url, "http://localhost:3000");
    /// ```
    pub fn from_url(url: &str) -> Result<Self, String> {
        let trimmed = url.trim();
        let rest = trimmed
            .strip_prefix("http://")
            .or_else(|| trimmed.strip_prefix("https://"))
            .ok_or_else(|| "URL must start with 'http://' or 'https://'".to_string())?;

        let host = rest.split('/').next().unwrap_or_default();
        if host.is_empty() {
            return Err("URL must contain a host".to_string());
        }

        if let Some((_, port)) = host.rsplit_once(':') {
            port.parse::<u16>()
                .map_err(|_| format!("Invalid port '{port}'"))?;
        }

        let config = Self::new(trimmed);
        config.validate()?;
        Ok(config)
    }

    /// Read `ECOLE_API_BASE_URL` / `ECOLE_API_TIMEOUT_MS` from the process environment
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with an explicit variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(BASE_URL_ENV) {
            Some(url) if !url.trim().is_empty() => Self::from_url(&url)?,
            _ => Self::default(),
        };

        if let Some(raw) = lookup(TIMEOUT_MS_ENV) {
            let millis = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| format!("invalid {TIMEOUT_MS_ENV}='{raw}'"))?;
            config.timeout = if millis == 0 {
                None
            } else {
                Some(Duration::from_millis(millis))
            };
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.is_empty() {
            return Err("base_url cannot be empty".to_string());
        }

        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(format!("base_url '{}' must be an http(s) URL", self.base_url));
        }

        if self.timeout == Some(Duration::ZERO) {
            return Err("timeout must be > 0".to_string());
        }

        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}
