use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::TransportError;

/// Default reply endpoint for a framebus server.
pub const DEFAULT_REPLY_ENDPOINT: &str = "tcp://127.0.0.1:5555";
/// Default publish endpoint for a framebus server.
pub const DEFAULT_PUBLISH_ENDPOINT: &str = "tcp://127.0.0.1:5556";

/// A transport address in URI form.
///
/// - `tcp://host:port`: TCP socket. Port `0` binds an OS-assigned port.
/// - `ipc:///path/to/socket`: Unix domain socket at a filesystem path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Tcp(String),
    Ipc(PathBuf),
}

impl Endpoint {
    /// Build a TCP endpoint from a `host:port` authority.
    pub fn tcp(authority: impl Into<String>) -> Self {
        Endpoint::Tcp(authority.into())
    }

    /// Build a Unix domain socket endpoint.
    pub fn ipc(path: impl Into<PathBuf>) -> Self {
        Endpoint::Ipc(path.into())
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| TransportError::InvalidEndpoint {
                uri: uri.to_string(),
                reason: "missing '://' separator".to_string(),
            })?;

        match scheme {
            "tcp" => {
                let (host, port) =
                    rest.rsplit_once(':')
                        .ok_or_else(|| TransportError::InvalidEndpoint {
                            uri: uri.to_string(),
                            reason: "expected host:port".to_string(),
                        })?;
                if host.is_empty() {
                    return Err(TransportError::InvalidEndpoint {
                        uri: uri.to_string(),
                        reason: "empty host".to_string(),
                    });
                }
                port.parse::<u16>()
                    .map_err(|err| TransportError::InvalidEndpoint {
                        uri: uri.to_string(),
                        reason: format!("bad port '{port}': {err}"),
                    })?;
                Ok(Endpoint::Tcp(rest.to_string()))
            }
            "ipc" => {
                if rest.is_empty() {
                    return Err(TransportError::InvalidEndpoint {
                        uri: uri.to_string(),
                        reason: "empty socket path".to_string(),
                    });
                }
                Ok(Endpoint::Ipc(PathBuf::from(rest)))
            }
            other => Err(TransportError::UnsupportedScheme(other.to_string())),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(authority) => write!(f, "tcp://{authority}"),
            Endpoint::Ipc(path) => write!(f, "ipc://{}", path.display()),
        }
    }
}
