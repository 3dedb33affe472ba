//! Bootstraps a Vite dev server next to a backend host and hands traffic to
//! it once it is ready.
//!
//! [`Bootstrapper::run`] checks for Node.js, probes the dev server port and,
//! when nothing is listening yet, provisions a TLS development certificate,
//! wires it into `vite.config.*`, installs dependencies, launches
//! `npm run dev -- --port <port>` and waits for Vite's ready banner. The
//! resulting `https://localhost:<port>` endpoint is then registered with a
//! [`ProxyHandoff`], usually a [`vitehost_proxy::ProxyTarget`].

pub mod bootstrap;
pub mod cert;
pub mod command;
pub mod config;
pub mod deps;
pub mod handoff;
pub mod inject;
pub mod log;
pub mod probe;
pub mod supervisor;
pub mod toolchain;

pub use bootstrap::{
    BootstrapError, BootstrapOutcome, Bootstrapper, ErrorKind, Provisioned, bootstrap,
};
pub use config::{DevServerOptions, Settings};
pub use handoff::{DevServerEndpoint, ProxyHandoff};
pub use log::{LogLevel, Logger, ScopedLog};
