//! Reverse proxy used by the vitehost development host.
//!
//! The host starts listening before the dev server is up. Requests wait on a
//! [`ProxyTarget`] until the bootstrap registers the dev server's endpoint,
//! then every request is forwarded to it.

mod proxy;
mod server;
mod target;

pub use proxy::{DevProxy, REGISTRATION_WAIT};
pub use server::{ListenerTls, ProxyError, ensure_tcp_listener_can_bind, serve};
pub use target::{ProxyTarget, Upstream};
