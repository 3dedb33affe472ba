//! Hands traffic to the dev server once it is up.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};

use vitehost_proxy::{ProxyTarget, Upstream};

use crate::config::{DEV_SERVER_HOST, DEV_SERVER_SCHEME};

/// `https://localhost:<port>`, plus the loopback address that answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevServerEndpoint {
    pub host: String,
    pub addr: SocketAddr,
}

impl DevServerEndpoint {
    /// Endpoint on `localhost`. `addr` is the loopback address the dev
    /// server accepted connections on; IPv4 when unknown.
    pub fn localhost(port: u16, addr: Option<SocketAddr>) -> Self {
        Self {
            host: DEV_SERVER_HOST.to_string(),
            addr: addr.unwrap_or_else(|| SocketAddr::from((Ipv4Addr::LOCALHOST, port))),
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn uri(&self) -> String {
        format!("{}://{}:{}", DEV_SERVER_SCHEME, self.host, self.port())
    }
}

impl fmt::Display for DevServerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

/// The host's reverse-proxy registration hook.
pub trait ProxyHandoff: Send + Sync {
    fn register_reverse_proxy(&self, endpoint: &DevServerEndpoint);
}

impl ProxyHandoff for ProxyTarget {
    fn register_reverse_proxy(&self, endpoint: &DevServerEndpoint) {
        self.register(Upstream::https(endpoint.host.clone(), endpoint.addr));
    }
}
