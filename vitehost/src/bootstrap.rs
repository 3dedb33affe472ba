//! Brings the dev server up and hands traffic to it.
//!
//! Order is fixed: toolchain check, port probe, then (only when nothing is
//! listening yet) source directory, config discovery, certificate, config
//! injection, dependencies, launch. The handoff always runs last.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::cert::{self, CertError, CertificateBundle, CertificateIssuer};
use crate::config::{ConfigError, DevServerOptions};
use crate::deps::{self, InstallError};
use crate::handoff::{DevServerEndpoint, ProxyHandoff};
use crate::inject::{self, InjectError, InjectOutcome};
use crate::log::Logger;
use crate::probe::{LoopbackProbe, PortProbe};
use crate::supervisor::{self, LaunchConfig, Ready, SupervisorError};
use crate::toolchain::{self, ToolNotInstalled};

/// Log scope for the dev server's own output.
pub const DEV_SERVER_SCOPE: &str = "vite";

/// Broad failure classes. Every one of them aborts host startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing tool, directory or config file, or a failed install.
    Precondition,
    /// The certificate could not be produced or wired in.
    Provisioning,
    /// The dev server died or closed its output before it was ready.
    Launch,
    TimedOut,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    ToolNotInstalled(#[from] ToolNotInstalled),

    #[error("Source path not found or not a directory: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("No vite.config file found in {0}")]
    ConfigFileNotFound(PathBuf),

    #[error("Found {} vite.config files in {dir}; keep exactly one", .candidates.len())]
    AmbiguousConfigFile {
        dir: PathBuf,
        candidates: Vec<PathBuf>,
    },

    #[error(transparent)]
    Cert(CertError),

    #[error(transparent)]
    Inject(InjectError),

    #[error("Failed to install dependencies: {0}")]
    DependencyInstallFailed(#[from] InstallError),

    #[error(transparent)]
    Launch(SupervisorError),

    #[error(
        "The dev server did not report ready within {} seconds. Check the output above, or raise startup_timeout_secs.",
        .0.as_secs()
    )]
    TimedOut(Duration),
}

impl BootstrapError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BootstrapError::Config(_)
            | BootstrapError::ToolNotInstalled(_)
            | BootstrapError::DirectoryNotFound(_)
            | BootstrapError::ConfigFileNotFound(_)
            | BootstrapError::AmbiguousConfigFile { .. }
            | BootstrapError::DependencyInstallFailed(_) => ErrorKind::Precondition,
            BootstrapError::Cert(_) | BootstrapError::Inject(_) => ErrorKind::Provisioning,
            BootstrapError::Launch(_) => ErrorKind::Launch,
            BootstrapError::TimedOut(_) => ErrorKind::TimedOut,
        }
    }
}

impl From<CertError> for BootstrapError {
    fn from(e: CertError) -> Self {
        match e {
            CertError::DirectoryNotFound(dir) => BootstrapError::DirectoryNotFound(dir),
            other => BootstrapError::Cert(other),
        }
    }
}

impl From<InjectError> for BootstrapError {
    fn from(e: InjectError) -> Self {
        match e {
            InjectError::ConfigFileNotFound(dir) => BootstrapError::ConfigFileNotFound(dir),
            InjectError::AmbiguousConfigFile { dir, candidates } => {
                BootstrapError::AmbiguousConfigFile { dir, candidates }
            }
            other => BootstrapError::Inject(other),
        }
    }
}

impl From<SupervisorError> for BootstrapError {
    fn from(e: SupervisorError) -> Self {
        match e {
            SupervisorError::TimedOut(timeout) => BootstrapError::TimedOut(timeout),
            other => BootstrapError::Launch(other),
        }
    }
}

/// Certificate and config wiring for a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    pub config_path: PathBuf,
    pub bundle: CertificateBundle,
    pub injection: InjectOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// Something already listened on the port; only the handoff ran.
    AlreadyRunning(DevServerEndpoint),
    Launched {
        endpoint: DevServerEndpoint,
        ready: Ready,
    },
}

impl BootstrapOutcome {
    pub fn endpoint(&self) -> &DevServerEndpoint {
        match self {
            BootstrapOutcome::AlreadyRunning(endpoint) => endpoint,
            BootstrapOutcome::Launched { endpoint, .. } => endpoint,
        }
    }
}

pub struct Bootstrapper {
    options: DevServerOptions,
    probe: Arc<dyn PortProbe>,
    issuer: Box<dyn CertificateIssuer>,
    log: Logger,
}

impl Bootstrapper {
    pub fn new(options: DevServerOptions, log: Logger) -> Self {
        let issuer = cert::issuer_for(options.cert_issuer, &options.tools.dotnet);
        Self {
            options,
            probe: Arc::new(LoopbackProbe::default()),
            issuer,
            log,
        }
    }

    pub fn with_probe(mut self, probe: impl PortProbe + 'static) -> Self {
        self.probe = Arc::new(probe);
        self
    }

    pub fn with_issuer(mut self, issuer: impl CertificateIssuer + 'static) -> Self {
        self.issuer = Box::new(issuer);
        self
    }

    /// Certificate bundle and `vite.config` wiring, without launching.
    ///
    /// Injection runs every time; it is a no-op on an already wired config.
    pub async fn provision(&self) -> Result<Provisioned, BootstrapError> {
        let source = &self.options.source_path;
        if !source.is_dir() {
            return Err(BootstrapError::DirectoryNotFound(source.clone()));
        }

        let config_path = inject::find_vite_config(source)?;
        let ext = inject::config_extension(&config_path);

        let bundle =
            cert::ensure_certificate(source, &ext, self.issuer.as_ref(), &self.log).await?;

        let injection = inject::inject_server_options(&config_path, &bundle.fragment_path)?;
        match injection {
            InjectOutcome::Injected => self.log.info(format!(
                "Wired {} into {}",
                bundle.fragment_path.display(),
                config_path.display()
            )),
            InjectOutcome::AlreadyInjected => self.log.debug(format!(
                "{} already imports the server options",
                config_path.display()
            )),
            InjectOutcome::NoExportDefault => self.log.warn(format!(
                "{} has no `export default` line; left unchanged, the dev server will not use the development certificate",
                config_path.display()
            )),
        }

        Ok(Provisioned {
            config_path,
            bundle,
            injection,
        })
    }

    /// Run the whole bootstrap and register the dev server with `handoff`.
    pub async fn run(
        &self,
        handoff: &dyn ProxyHandoff,
    ) -> Result<BootstrapOutcome, BootstrapError> {
        self.options.validate()?;
        toolchain::ensure_toolchain(&self.options.tools.node, &self.log).await?;

        let port = self.options.dev_server_port;
        if let Some(addr) = self.listening_addr(port).await {
            let endpoint = DevServerEndpoint::localhost(port, Some(addr));
            self.log.info(format!(
                "Found a dev server already listening on port {}",
                port
            ));
            self.hand_off(handoff, &endpoint);
            return Ok(BootstrapOutcome::AlreadyRunning(endpoint));
        }

        self.provision().await?;

        let dev_log = self.log.scoped(DEV_SERVER_SCOPE);
        deps::ensure_dependencies(
            &self.options.source_path,
            &self.options.tools.package_manager,
            self.options.fail_on_install_error,
            &dev_log,
        )
        .await?;

        let launch = LaunchConfig::from_options(&self.options);
        let ready = supervisor::launch_and_await_ready(&launch, &dev_log).await?;
        self.log.info(format!(
            "Dev server ready after {:.1}s",
            ready.elapsed.as_secs_f64()
        ));

        let endpoint = DevServerEndpoint::localhost(port, self.listening_addr(port).await);
        self.hand_off(handoff, &endpoint);
        Ok(BootstrapOutcome::Launched { endpoint, ready })
    }

    /// Connect attempts block, so they run off the async workers.
    async fn listening_addr(&self, port: u16) -> Option<SocketAddr> {
        let probe = Arc::clone(&self.probe);
        tokio::task::spawn_blocking(move || probe.listening_addr(port))
            .await
            .ok()
            .flatten()
    }

    fn hand_off(&self, handoff: &dyn ProxyHandoff, endpoint: &DevServerEndpoint) {
        self.log.info(format!("Proxying requests to {}", endpoint.uri()));
        handoff.register_reverse_proxy(endpoint);
    }
}

/// Bootstrap with the default probe and issuer.
pub async fn bootstrap(
    options: DevServerOptions,
    handoff: &dyn ProxyHandoff,
    log: Logger,
) -> Result<BootstrapOutcome, BootstrapError> {
    Bootstrapper::new(options, log).run(handoff).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::channel_logger;
    use parking_lot::Mutex;
    use std::net::{Ipv4Addr, SocketAddr};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingHandoff {
        endpoints: Mutex<Vec<DevServerEndpoint>>,
    }

    impl ProxyHandoff for RecordingHandoff {
        fn register_reverse_proxy(&self, endpoint: &DevServerEndpoint) {
            self.endpoints.lock().push(endpoint.clone());
        }
    }

    struct AlwaysListening;

    impl PortProbe for AlwaysListening {
        fn listening_addr(&self, port: u16) -> Option<SocketAddr> {
            Some(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
        }
    }

    struct NeverListening;

    impl PortProbe for NeverListening {
        fn listening_addr(&self, _port: u16) -> Option<SocketAddr> {
            None
        }
    }

    /// Listening only once another task sets `released`.
    struct GatedProbe {
        released: Arc<AtomicBool>,
    }

    impl PortProbe for GatedProbe {
        fn listening_addr(&self, port: u16) -> Option<SocketAddr> {
            let deadline = Instant::now() + Duration::from_secs(2);
            while Instant::now() < deadline {
                if self.released.load(Ordering::SeqCst) {
                    return Some(SocketAddr::from((Ipv4Addr::LOCALHOST, port)));
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            None
        }
    }

    fn options(source: impl Into<PathBuf>) -> DevServerOptions {
        let mut options = DevServerOptions::new(source);
        options.tools.node = "true".to_string();
        options.tools.package_manager = "nonexistent_npm_12345".to_string();
        options.tools.dotnet = "nonexistent_dotnet_12345".to_string();
        options
    }

    #[test]
    fn error_kinds_follow_taxonomy() {
        let dir = PathBuf::from("/p");
        assert_eq!(
            BootstrapError::from(CertError::DirectoryNotFound(dir.clone())).kind(),
            ErrorKind::Precondition
        );
        assert_eq!(
            BootstrapError::from(CertError::ToolFailed {
                tool: "dotnet".into(),
                code: Some(1)
            })
            .kind(),
            ErrorKind::Provisioning
        );
        assert_eq!(
            BootstrapError::from(InjectError::ConfigFileNotFound(dir.clone())).kind(),
            ErrorKind::Precondition
        );
        assert_eq!(
            BootstrapError::from(InjectError::AmbiguousConfigFile {
                dir,
                candidates: vec![]
            })
            .kind(),
            ErrorKind::Precondition
        );
        assert_eq!(
            BootstrapError::from(SupervisorError::Launch("x".into())).kind(),
            ErrorKind::Launch
        );
        assert_eq!(
            BootstrapError::from(SupervisorError::TimedOut(Duration::from_secs(1))).kind(),
            ErrorKind::TimedOut
        );
        assert_eq!(
            BootstrapError::from(InstallError::Failed {
                command: "npm install".into(),
                code: Some(1)
            })
            .kind(),
            ErrorKind::Precondition
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn listening_port_skips_straight_to_handoff() {
        // The source path does not exist: any step past the probe would fail.
        let (log, _rx) = channel_logger("vitehost");
        let handoff = RecordingHandoff::default();

        let outcome = Bootstrapper::new(options("/definitely/missing/web"), log)
            .with_probe(AlwaysListening)
            .run(&handoff)
            .await
            .unwrap();

        assert!(matches!(outcome, BootstrapOutcome::AlreadyRunning(_)));
        let endpoints = handoff.endpoints.lock();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].uri(), "https://localhost:3000");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_port_probe_leaves_the_runtime_free() {
        let (log, _rx) = channel_logger("vitehost");
        let handoff = RecordingHandoff::default();
        let released = Arc::new(AtomicBool::new(false));
        let bootstrapper = Bootstrapper::new(options("/definitely/missing/web"), log)
            .with_probe(GatedProbe {
                released: released.clone(),
            });

        let release = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            released.store(true, Ordering::SeqCst);
        };
        let (outcome, ()) = tokio::join!(bootstrapper.run(&handoff), release);

        assert!(matches!(outcome.unwrap(), BootstrapOutcome::AlreadyRunning(_)));
        assert_eq!(handoff.endpoints.lock().len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_node_fails_before_probe() {
        let (log, _rx) = channel_logger("vitehost");
        let handoff = RecordingHandoff::default();
        let mut opts = options("/definitely/missing/web");
        opts.tools.node = "false".to_string();

        let err = Bootstrapper::new(opts, log)
            .with_probe(AlwaysListening)
            .run(&handoff)
            .await
            .unwrap_err();

        assert!(matches!(err, BootstrapError::ToolNotInstalled(_)));
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert!(handoff.endpoints.lock().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_source_path_is_directory_not_found() {
        let (log, _rx) = channel_logger("vitehost");
        let handoff = RecordingHandoff::default();

        let err = Bootstrapper::new(options("/definitely/missing/web"), log)
            .with_probe(NeverListening)
            .run(&handoff)
            .await
            .unwrap_err();

        assert!(matches!(err, BootstrapError::DirectoryNotFound(_)));
        assert!(handoff.endpoints.lock().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_config_file_is_precondition_failure() {
        let temp = TempDir::new().unwrap();
        let (log, _rx) = channel_logger("vitehost");

        let err = Bootstrapper::new(options(temp.path()), log)
            .with_probe(NeverListening)
            .run(&RecordingHandoff::default())
            .await
            .unwrap_err();

        assert!(matches!(err, BootstrapError::ConfigFileNotFound(_)));
    }

    #[tokio::test]
    async fn provision_with_builtin_issuer_wires_config() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("vite.config.js"),
            "export default {\n  base: '/'\n}\n",
        )
        .unwrap();
        let (log, _rx) = channel_logger("vitehost");

        let provisioned = Bootstrapper::new(options(temp.path()), log)
            .with_issuer(cert::BuiltinIssuer)
            .provision()
            .await
            .unwrap();

        assert_eq!(provisioned.injection, InjectOutcome::Injected);
        assert!(provisioned.bundle.bundle_path.is_file());
        assert_eq!(
            provisioned.bundle.fragment_path,
            temp.path().join("serverOption.js")
        );
    }

    #[tokio::test]
    async fn provision_surfaces_issuer_failure() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("vite.config.ts"), "export default {}\n").unwrap();
        let (log, _rx) = channel_logger("vitehost");

        let err = Bootstrapper::new(options(temp.path()), log)
            .provision()
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Provisioning);
        assert_eq!(
            std::fs::read_to_string(temp.path().join("vite.config.ts")).unwrap(),
            "export default {}\n"
        );
    }
}
