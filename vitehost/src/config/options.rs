use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::{ConfigError, Result};
use super::vitehost_toml::{CertIssuerKind, VitehostToml};

pub const DEFAULT_DEV_SERVER_PORT: u16 = 3000;
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_DEV_SCRIPT: &str = "dev";
pub const DEFAULT_LISTEN: &str = "127.0.0.1:5000";
pub const DEFAULT_READY_BANNER: &str = "vite";
/// Vite 3+ prints "ready in"; Vite 2 prints "dev server running at:".
pub const DEFAULT_READY_MARKERS: &[&str] = &["ready in", "dev server running at:"];
/// The dev endpoint is always served over TLS.
pub const DEV_SERVER_SCHEME: &str = "https";
pub const DEV_SERVER_HOST: &str = "localhost";

/// External programs the bootstrap shells out to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tools {
    pub node: String,
    pub package_manager: String,
    pub dotnet: String,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            node: "node".to_string(),
            package_manager: "npm".to_string(),
            dotnet: "dotnet".to_string(),
        }
    }
}

/// Everything the orchestrator needs to bring the dev server up.
/// Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevServerOptions {
    /// Vite project directory (resolved against the content root)
    pub source_path: PathBuf,
    pub dev_server_port: u16,
    pub startup_timeout: Duration,
    pub dev_script: String,
    pub cert_issuer: CertIssuerKind,
    pub fail_on_install_error: bool,
    pub ready_banner: String,
    pub ready_markers: Vec<String>,
    pub tools: Tools,
}

impl DevServerOptions {
    pub fn new(source_path: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            dev_server_port: DEFAULT_DEV_SERVER_PORT,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            dev_script: DEFAULT_DEV_SCRIPT.to_string(),
            cert_issuer: CertIssuerKind::default(),
            fail_on_install_error: true,
            ready_banner: DEFAULT_READY_BANNER.to_string(),
            ready_markers: DEFAULT_READY_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            tools: Tools::default(),
        }
    }

    pub fn scheme(&self) -> &'static str {
        DEV_SERVER_SCHEME
    }

    pub fn validate(&self) -> Result<()> {
        if self.source_path.as_os_str().is_empty()
            || self.source_path.to_string_lossy().trim().is_empty()
        {
            return Err(ConfigError::Validation(
                "source_path is required (directory of the Vite project)".to_string(),
            ));
        }
        if self.dev_server_port == 0 {
            return Err(ConfigError::Validation(
                "dev_server_port must be between 1 and 65535".to_string(),
            ));
        }
        if self.startup_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "startup_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.dev_script.trim().is_empty() {
            return Err(ConfigError::Validation(
                "dev_script must not be empty".to_string(),
            ));
        }
        if self.ready_markers.iter().all(|m| m.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "ready_markers must contain at least one non-empty marker".to_string(),
            ));
        }
        Ok(())
    }
}

/// Values given on the command line or through the environment. They win
/// over vitehost.toml.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub source_path: Option<PathBuf>,
    pub dev_server_port: Option<u16>,
    pub startup_timeout_secs: Option<u64>,
    pub cert_issuer: Option<CertIssuerKind>,
    pub listen: Option<String>,
}

/// Host configuration: dev server options plus where the host listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub dev: DevServerOptions,
    pub listen: String,
}

impl Settings {
    /// Merge defaults, an optional config file and overrides.
    ///
    /// `content_root` is the directory a relative `source_path` from the file
    /// is resolved against (the file's own directory). Relative override paths
    /// resolve against `cwd`.
    pub fn resolve(
        file: Option<&VitehostToml>,
        content_root: &Path,
        overrides: &Overrides,
        cwd: &Path,
    ) -> Result<Self> {
        let source_path = match (&overrides.source_path, file.and_then(|f| f.source_path.as_ref()))
        {
            (Some(p), _) => resolve_against(cwd, p),
            (None, Some(p)) if !p.trim().is_empty() => resolve_against(content_root, Path::new(p)),
            _ => {
                return Err(ConfigError::Validation(
                    "source_path is required. Pass --source-path or set source_path in vitehost.toml."
                        .to_string(),
                ));
            }
        };

        let mut dev = DevServerOptions::new(source_path);

        if let Some(file) = file {
            if let Some(port) = file.dev_server_port {
                dev.dev_server_port = port;
            }
            if let Some(secs) = file.startup_timeout_secs {
                dev.startup_timeout = Duration::from_secs(secs);
            }
            if let Some(script) = &file.dev_script {
                dev.dev_script = script.clone();
            }
            if let Some(issuer) = file.cert_issuer {
                dev.cert_issuer = issuer;
            }
            if let Some(strict) = file.fail_on_install_error {
                dev.fail_on_install_error = strict;
            }
            if let Some(banner) = &file.ready_banner {
                dev.ready_banner = banner.clone();
            }
            if let Some(markers) = &file.ready_markers {
                dev.ready_markers = markers.clone();
            }
            if let Some(node) = &file.tools.node {
                dev.tools.node = node.clone();
            }
            if let Some(pm) = &file.tools.package_manager {
                dev.tools.package_manager = pm.clone();
            }
            if let Some(dotnet) = &file.tools.dotnet {
                dev.tools.dotnet = dotnet.clone();
            }
        }

        if let Some(port) = overrides.dev_server_port {
            dev.dev_server_port = port;
        }
        if let Some(secs) = overrides.startup_timeout_secs {
            dev.startup_timeout = Duration::from_secs(secs);
        }
        if let Some(issuer) = overrides.cert_issuer {
            dev.cert_issuer = issuer;
        }

        dev.validate()?;

        let listen = overrides
            .listen
            .clone()
            .or_else(|| file.and_then(|f| f.listen.clone()))
            .unwrap_or_else(|| DEFAULT_LISTEN.to_string());

        Ok(Self { dev, listen })
    }
}

fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
