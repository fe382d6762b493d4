use std::fmt;
use std::str::FromStr;

use crate::result::IocError;

/// Names a service endpoint: `(protocol, host, path, port)`. Two services
/// may not be online at the same URI at the same time.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SrvUri {
    pub protocol: String,
    pub host: String,
    pub path: String,
    pub port: u16,
}

impl SrvUri {
    /// In-process transport over paired frame channels
    pub const PROTO_FIFO: &'static str = "fifo";
    /// Loopback TCP transport
    pub const PROTO_TCP: &'static str = "tcp";
    /// Well-known host for in-process services
    pub const HOST_LOCAL_PROCESS: &'static str = "localprocess";

    pub fn fifo(path: &str) -> Self {
        Self {
            protocol: Self::PROTO_FIFO.to_string(),
            host: Self::HOST_LOCAL_PROCESS.to_string(),
            path: path.to_string(),
            port: 0,
        }
    }

    pub fn tcp(host: &str, path: &str, port: u16) -> Self {
        Self {
            protocol: Self::PROTO_TCP.to_string(),
            host: host.to_string(),
            path: path.to_string(),
            port,
        }
    }

    pub fn is_fifo(&self) -> bool {
        self.protocol == Self::PROTO_FIFO
    }

    pub fn is_tcp(&self) -> bool {
        self.protocol == Self::PROTO_TCP
    }
}

impl fmt::Display for SrvUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port == 0 {
            write!(f, "{}://{}/{}", self.protocol, self.host, self.path)
        } else {
            write!(
                f,
                "{}://{}:{}/{}",
                self.protocol, self.host, self.port, self.path
            )
        }
    }
}

impl FromStr for SrvUri {
    type Err = IocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (protocol, rest) = s.split_once("://").ok_or(IocError::InvalidParam {
            reason: "URI is missing a protocol separator",
        })?;
        let (authority, path) = rest.split_once('/').ok_or(IocError::InvalidParam {
            reason: "URI is missing a path",
        })?;
        let (host, port) = match authority.split_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| IocError::InvalidParam {
                    reason: "URI port is not a number",
                })?;
                (host, port)
            }
            None => (authority, 0),
        };
        if protocol.is_empty() || host.is_empty() {
            return Err(IocError::InvalidParam {
                reason: "URI protocol and host must be non-empty",
            });
        }
        Ok(Self {
            protocol: protocol.to_string(),
            host: host.to_string(),
            path: path.to_string(),
            port,
        })
    }
}
