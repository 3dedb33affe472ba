use std::time::Duration;

use async_trait::async_trait;
use pingora_core::Result;
use pingora_core::upstreams::peer::HttpPeer;
use pingora_http::{RequestHeader, ResponseHeader};
use pingora_proxy::{ProxyHttp, Session};

use crate::target::{ProxyTarget, Upstream};

/// How long a request waits for the dev server to be registered before it
/// is answered with `503`.
pub const REGISTRATION_WAIT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct DevProxy {
    target: ProxyTarget,
    registration_wait: Duration,
}

impl DevProxy {
    pub fn new(target: ProxyTarget) -> Self {
        Self {
            target,
            registration_wait: REGISTRATION_WAIT,
        }
    }

    pub fn with_registration_wait(mut self, wait: Duration) -> Self {
        self.registration_wait = wait;
        self
    }

    async fn resolve_upstream(&self) -> Option<Upstream> {
        match self.target.get() {
            Some(upstream) => Some(upstream),
            None => self.target.wait_for_registered(self.registration_wait).await,
        }
    }
}

/// Builds the peer for an upstream. Dev certificates are self-signed, so
/// verification is off.
fn upstream_peer_for(upstream: &Upstream) -> HttpPeer {
    let mut peer = HttpPeer::new(upstream.addr, upstream.tls, upstream.host.clone());
    peer.options.verify_cert = false;
    peer.options.verify_hostname = false;
    peer
}

#[derive(Default)]
pub struct Ctx {
    upstream: Option<Upstream>,
}

#[async_trait]
impl ProxyHttp for DevProxy {
    type CTX = Ctx;

    fn new_ctx(&self) -> Self::CTX {
        Ctx::default()
    }

    async fn request_filter(&self, session: &mut Session, ctx: &mut Self::CTX) -> Result<bool> {
        let Some(upstream) = self.resolve_upstream().await else {
            tracing::warn!("dev server not registered yet; answering 503");
            let mut header = ResponseHeader::build(503, None)?;
            header.insert_header("Content-Type", "text/plain")?;
            header.insert_header("Retry-After", "1")?;
            session
                .write_response_header(Box::new(header), false)
                .await?;
            session
                .write_response_body(Some("Starting...".into()), true)
                .await?;
            return Ok(true);
        };

        ctx.upstream = Some(upstream);
        Ok(false)
    }

    async fn upstream_peer(
        &self,
        _session: &mut Session,
        ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        let upstream = ctx
            .upstream
            .as_ref()
            .ok_or_else(|| pingora_core::Error::new(pingora_core::ErrorType::ConnectNoRoute))?;
        Ok(Box::new(upstream_peer_for(upstream)))
    }

    async fn upstream_request_filter(
        &self,
        _session: &mut Session,
        upstream_request: &mut RequestHeader,
        ctx: &mut Self::CTX,
    ) -> Result<()>
    where
        Self::CTX: Send + Sync,
    {
        if let Some(upstream) = ctx.upstream.as_ref() {
            upstream_request.insert_header("Host", upstream.authority())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pingora_core::upstreams::peer::Peer;
    use std::net::SocketAddr;

    fn upstream(port: u16) -> Upstream {
        Upstream::https("localhost", SocketAddr::from(([127, 0, 0, 1], port)))
    }

    #[test]
    fn peer_targets_registered_address_over_tls() {
        let peer = upstream_peer_for(&upstream(3000));
        assert!(peer.is_tls());
        assert_eq!(peer.sni(), "localhost");
        assert!(!peer.options.verify_cert);
        assert!(!peer.options.verify_hostname);
    }

    #[tokio::test]
    async fn resolve_upstream_uses_registered_target() {
        let target = ProxyTarget::new();
        target.register(upstream(3000));
        let proxy = DevProxy::new(target);

        let got = proxy.resolve_upstream().await;
        assert_eq!(got, Some(upstream(3000)));
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_upstream_gives_up_after_registration_wait() {
        let proxy =
            DevProxy::new(ProxyTarget::new()).with_registration_wait(Duration::from_secs(2));
        assert!(proxy.resolve_upstream().await.is_none());
    }
}
