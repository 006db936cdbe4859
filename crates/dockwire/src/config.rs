use std::env;
use std::time::Duration;

use dockwire_http::Endpoint;
use dockwire_http::WireError;
use dockwire_http::DEFAULT_UNIX_SOCKET;

use crate::tls::default_tls_context;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Engine address, `unix://`, `tcp://`, `http://` or `https://`.
    pub host: String,
    /// Pinned API version; negotiated from `/version` when absent.
    pub api_version: Option<String>,
    pub tls_verify: bool,
    pub read_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            host: non_empty("DOCKER_HOST").unwrap_or_else(default_host),
            api_version: non_empty("DOCKER_API_VERSION")
                .map(|v| v.trim().trim_start_matches('v').to_string()),
            tls_verify: non_empty("DOCKER_TLS_VERIFY").is_some_and(|v| v.trim() != "0"),
            read_timeout: non_empty("DOCKWIRE_READ_TIMEOUT")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    pub fn with_tls_verify(mut self, tls_verify: bool) -> Self {
        self.tls_verify = tls_verify;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Resolves the host into an endpoint. `https://` hosts and
    /// `DOCKER_TLS_VERIFY` attach the default TLS context.
    pub fn endpoint(&self) -> Result<Endpoint, WireError> {
        let endpoint = Endpoint::parse(&self.host)?;
        if self.tls_verify || self.host.starts_with("https://") {
            return endpoint.with_tls(default_tls_context());
        }
        Ok(endpoint)
    }
}

fn default_host() -> String {
    format!("unix://{DEFAULT_UNIX_SOCKET}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::from_lookup(lookup(&[]));
        assert_eq!(config.host, "unix:///var/run/docker.sock");
        assert!(config.api_version.is_none());
        assert!(!config.tls_verify);
        assert!(config.read_timeout.is_none());
    }

    #[test]
    fn test_reads_environment() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("DOCKER_HOST", "tcp://10.0.0.5:2375"),
            ("DOCKER_API_VERSION", "v1.41"),
            ("DOCKER_TLS_VERIFY", "1"),
            ("DOCKWIRE_READ_TIMEOUT", "30"),
        ]));
        assert_eq!(config.host, "tcp://10.0.0.5:2375");
        assert_eq!(config.api_version.as_deref(), Some("1.41"));
        assert!(config.tls_verify);
        assert_eq!(config.read_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_ignores_blank_and_disabled_values() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("DOCKER_HOST", "  "),
            ("DOCKER_TLS_VERIFY", "0"),
            ("DOCKWIRE_READ_TIMEOUT", "soon"),
        ]));
        assert_eq!(config.host, default_host());
        assert!(!config.tls_verify);
        assert!(config.read_timeout.is_none());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ClientConfig::from_lookup(lookup(&[]))
            .with_host("unix:///tmp/engine.sock")
            .with_api_version("1.43")
            .with_tls_verify(true)
            .with_read_timeout(Some(Duration::from_secs(5)));

        assert_eq!(config.host, "unix:///tmp/engine.sock");
        assert_eq!(config.api_version.as_deref(), Some("1.43"));
        assert!(config.tls_verify);
        assert_eq!(config.read_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_endpoint_resolution() {
        let plain = ClientConfig::from_lookup(lookup(&[("DOCKER_HOST", "tcp://engine:2375")]));
        assert!(!plain.endpoint().unwrap().is_tls());

        let https = plain.clone().with_host("https://engine");
        assert!(https.endpoint().unwrap().is_tls());

        let unix_tls = ClientConfig::from_lookup(lookup(&[])).with_tls_verify(true);
        assert!(matches!(
            unix_tls.endpoint(),
            Err(WireError::InvalidInput(_))
        ));
    }
}
