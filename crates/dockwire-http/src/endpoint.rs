//! Engine endpoint addressing.

use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::WireError;

pub const DEFAULT_UNIX_SOCKET: &str = "/var/run/docker.sock";
pub const DEFAULT_TCP_PORT: u16 = 2375;
pub const DEFAULT_TLS_PORT: u16 = 2376;

/// Host header sent over unix sockets, where there is no real host name.
const UNIX_HOST_HEADER: &str = "docker";

/// Caller-supplied TLS client configuration.
pub type TlsContext = Arc<rustls::ClientConfig>;

/// Where the engine listens. Immutable once built.
#[derive(Clone)]
pub enum Endpoint {
    Unix {
        path: PathBuf,
    },
    Tcp {
        host: String,
        port: u16,
        tls: Option<TlsContext>,
    },
}

impl Endpoint {
    pub fn unix(path: impl AsRef<Path>) -> Self {
        Endpoint::Unix {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Endpoint::Tcp {
            host: host.into(),
            port,
            tls: None,
        }
    }

    /// Parses `unix:///path`, `tcp://host:port`, `http://host:port` or
    /// `https://host:port`.
    ///
    /// `https` only selects the default TLS port; the TLS context itself is
    /// attached with [`Endpoint::with_tls`].
    pub fn parse(address: &str) -> Result<Self, WireError> {
        let (scheme, rest) = address
            .split_once("://")
            .ok_or_else(|| WireError::InvalidInput(format!("missing scheme in '{address}'")))?;

        match scheme {
            "unix" => {
                if rest.is_empty() {
                    return Err(WireError::InvalidInput(format!(
                        "missing socket path in '{address}'"
                    )));
                }
                Ok(Endpoint::unix(rest))
            }
            "tcp" | "http" => parse_host_port(address, rest, DEFAULT_TCP_PORT),
            "https" => parse_host_port(address, rest, DEFAULT_TLS_PORT),
            other => Err(WireError::InvalidInput(format!(
                "unsupported scheme '{other}' in '{address}'"
            ))),
        }
    }

    /// Wraps a TCP endpoint in TLS. Unix endpoints cannot carry TLS.
    pub fn with_tls(self, context: TlsContext) -> Result<Self, WireError> {
        match self {
            Endpoint::Tcp { host, port, .. } => Ok(Endpoint::Tcp {
                host,
                port,
                tls: Some(context),
            }),
            Endpoint::Unix { path } => Err(WireError::InvalidInput(format!(
                "TLS requested for unix socket {}",
                path.display()
            ))),
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Endpoint::Tcp { tls: Some(_), .. })
    }

    /// Value of the Host header. IPv6 literals are bracketed again.
    pub fn host_header(&self) -> Cow<'_, str> {
        match self {
            Endpoint::Unix { .. } => Cow::Borrowed(UNIX_HOST_HEADER),
            Endpoint::Tcp { host, .. } => bracketed(host),
        }
    }
}

fn bracketed(host: &str) -> Cow<'_, str> {
    if host.contains(':') {
        Cow::Owned(format!("[{host}]"))
    } else {
        Cow::Borrowed(host)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::unix(DEFAULT_UNIX_SOCKET)
    }
}

impl FromStr for Endpoint {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix { path } => write!(f, "unix://{}", path.display()),
            Endpoint::Tcp {
                host,
                port,
                tls: Some(_),
            } => write!(f, "https://{}:{port}", bracketed(host)),
            Endpoint::Tcp {
                host,
                port,
                tls: None,
            } => write!(f, "tcp://{}:{port}", bracketed(host)),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Endpoint").field(&self.to_string()).finish()
    }
}

fn parse_host_port(address: &str, rest: &str, default_port: u16) -> Result<Endpoint, WireError> {
    let authority = rest.trim_end_matches('/');
    if authority.is_empty() {
        return Err(WireError::InvalidInput(format!(
            "missing host in '{address}'"
        )));
    }

    // Bracketed IPv6 literal, optionally followed by :port
    if let Some(inner) = authority.strip_prefix('[') {
        let (host, tail) = inner.split_once(']').ok_or_else(|| {
            WireError::InvalidInput(format!("unterminated IPv6 literal in '{address}'"))
        })?;
        let port = match tail.strip_prefix(':') {
            Some(port) => parse_port(address, port)?,
            None if tail.is_empty() => default_port,
            None => {
                return Err(WireError::InvalidInput(format!(
                    "unexpected '{tail}' after IPv6 literal in '{address}'"
                )));
            }
        };
        return Ok(Endpoint::tcp(host, port));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => Ok(Endpoint::tcp(host, parse_port(address, port)?)),
        None => Ok(Endpoint::tcp(authority, default_port)),
    }
}

fn parse_port(address: &str, port: &str) -> Result<u16, WireError> {
    port.parse()
        .map_err(|_| WireError::InvalidInput(format!("invalid port '{port}' in '{address}'")))
}
