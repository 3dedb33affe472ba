use std::path::PathBuf;
use std::thread::JoinHandle;

use pingora_core::listeners::tls::TlsSettings;
use pingora_core::prelude::Server;
use thiserror::Error;

use crate::proxy::DevProxy;
use crate::target::ProxyTarget;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("dev host could not bind on {0}: {1}")]
    Bind(String, std::io::Error),

    #[error("Failed to start proxy server: {0}")]
    Server(String),

    #[error("Failed to load TLS certificate/key: {0}")]
    Tls(String),
}

/// PEM certificate and key for an HTTPS listener.
#[derive(Debug, Clone)]
pub struct ListenerTls {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

pub fn ensure_tcp_listener_can_bind(listen_addr: &str) -> Result<(), ProxyError> {
    match std::net::TcpListener::bind(listen_addr) {
        Ok(listener) => {
            drop(listener);
            Ok(())
        }
        Err(e) => Err(ProxyError::Bind(listen_addr.to_string(), e)),
    }
}

/// Start the reverse proxy on `listen` in a dedicated thread.
///
/// Pingora owns its own runtime, so the server never shares the caller's.
/// Requests arriving before `target` is registered wait for it.
pub fn serve(
    listen: &str,
    target: ProxyTarget,
    tls: Option<&ListenerTls>,
) -> Result<JoinHandle<()>, ProxyError> {
    ensure_tcp_listener_can_bind(listen)?;

    let tls_settings = tls
        .map(|tls| {
            let cert_path = tls.cert_path.to_string_lossy().to_string();
            let key_path = tls.key_path.to_string_lossy().to_string();
            TlsSettings::intermediate(&cert_path, &key_path)
                .map_err(|e| ProxyError::Tls(e.to_string()))
        })
        .transpose()?;

    let mut server = Server::new(None).map_err(|e| ProxyError::Server(e.to_string()))?;
    server.bootstrap();

    let proxy = DevProxy::new(target);
    let mut svc = pingora_proxy::http_proxy_service(&server.configuration, proxy);

    let https = tls_settings.is_some();
    match tls_settings {
        Some(settings) => svc.add_tls_with_settings(listen, None, settings),
        None => svc.add_tcp(listen),
    }

    server.add_service(svc);
    tracing::info!(listen = %listen, tls = https, "dev host listening");

    Ok(std::thread::spawn(move || {
        server.run_forever();
    }))
}
