use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::Notify;

/// Where proxied requests go once the dev server is ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    /// Host name used for SNI and the forwarded `Host` header.
    pub host: String,
    /// Socket address the proxy connects to.
    pub addr: SocketAddr,
    pub tls: bool,
}

impl Upstream {
    pub fn https(host: impl Into<String>, addr: SocketAddr) -> Self {
        Self {
            host: host.into(),
            addr,
            tls: true,
        }
    }

    /// `host:port`, as sent in the `Host` header.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.addr.port())
    }
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.tls { "https" } else { "http" };
        write!(f, "{}://{}", scheme, self.authority())
    }
}

/// Shared, late-bound upstream slot.
///
/// Cloning is cheap; every clone observes the same registration.
#[derive(Clone, Default)]
pub struct ProxyTarget {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    upstream: RwLock<Option<Upstream>>,
    notify: Notify,
}

impl ProxyTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the upstream and wake every waiting request.
    pub fn register(&self, upstream: Upstream) {
        tracing::info!(upstream = %upstream, "reverse proxy target registered");
        *self.inner.upstream.write() = Some(upstream);
        self.inner.notify.notify_waiters();
    }

    pub fn get(&self) -> Option<Upstream> {
        self.inner.upstream.read().clone()
    }

    pub fn is_registered(&self) -> bool {
        self.inner.upstream.read().is_some()
    }

    /// Wait up to `timeout` for a registration.
    pub async fn wait_for_registered(&self, timeout: Duration) -> Option<Upstream> {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Enlist before checking so a registration in between is not missed.
        notified.as_mut().enable();

        if let Some(upstream) = self.get() {
            return Some(upstream);
        }

        let _ = tokio::time::timeout(timeout, notified).await;
        self.get()
    }
}
