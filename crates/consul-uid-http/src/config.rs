use core::{fmt, str::FromStr, time::Duration};

use reqwest::Url;

use crate::error::ClientError;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8500;
pub const DEFAULT_API_VERSION: &str = "v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl Scheme {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            other => Err(ClientError::InvalidScheme(other.to_owned())),
        }
    }
}

/// Where and how to reach a Consul agent.
///
/// The defaults point at a local agent: `http://127.0.0.1:8500/v1`, no ACL
/// token, and the agent's own datacenter.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    /// API version path segment.
    pub version: String,
    /// Datacenter passed as `dc` on KV and session requests. `None` lets the
    /// agent use its own.
    pub datacenter: Option<String>,
    /// ACL token sent as `X-Consul-Token`.
    pub token: Option<String>,
    /// Per-request timeout. Blocking reads should stay below it.
    pub timeout: Duration,
    /// HTTP proxy for every request. `None` connects directly, ignoring
    /// proxy environment variables.
    pub proxy: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            scheme: Scheme::Http,
            host: String::from(DEFAULT_HOST),
            port: DEFAULT_PORT,
            version: String::from(DEFAULT_API_VERSION),
            datacenter: None,
            token: None,
            timeout: DEFAULT_TIMEOUT,
            proxy: None,
        }
    }
}

// The token stays out of logs.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("version", &self.version)
            .field("datacenter", &self.datacenter)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("proxy", &self.proxy)
            .finish()
    }
}

impl ClientConfig {
    #[must_use]
    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    #[must_use]
    pub fn with_datacenter(mut self, datacenter: impl Into<String>) -> Self {
        self.datacenter = Some(datacenter.into());
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// The agent's root URL, e.g. `http://127.0.0.1:8500/`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidUrl`] if the host does not form a valid
    /// URL.
    pub fn base_url(&self) -> Result<Url, ClientError> {
        let raw = format!("{}://{}:{}/", self.scheme, self.host.trim(), self.port);
        let url = Url::parse(&raw).map_err(|e| ClientError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;
        if url.cannot_be_a_base() || url.path() != "/" {
            return Err(ClientError::InvalidUrl {
                url: raw,
                reason: String::from("host must not carry a path"),
            });
        }
        Ok(url)
    }
}
