//! Loopback TCP listener probe.
//!
//! Never cached: the dev server may have been started out-of-band between
//! two bootstrap attempts.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream};
use std::time::Duration;

const PORT_PROBE_TIMEOUT_MS: u64 = 150;

/// Checks whether something accepts TCP connections on a local port.
pub trait PortProbe: Send + Sync {
    /// Loopback address that accepted the connection, if any.
    fn listening_addr(&self, port: u16) -> Option<SocketAddr>;

    fn is_listening(&self, port: u16) -> bool {
        self.listening_addr(port).is_some()
    }
}

/// Probes 127.0.0.1 first, then ::1.
#[derive(Debug, Clone)]
pub struct LoopbackProbe {
    timeout: Duration,
}

impl Default for LoopbackProbe {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(PORT_PROBE_TIMEOUT_MS),
        }
    }
}

fn tcp_port_open(addr: SocketAddr, timeout: Duration) -> bool {
    TcpStream::connect_timeout(&addr, timeout).is_ok()
}

impl PortProbe for LoopbackProbe {
    fn listening_addr(&self, port: u16) -> Option<SocketAddr> {
        if port == 0 {
            return None;
        }
        [
            SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
            SocketAddr::from((Ipv6Addr::LOCALHOST, port)),
        ]
        .into_iter()
        .find(|addr| tcp_port_open(*addr, self.timeout))
    }
}
