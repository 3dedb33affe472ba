use serde::Deserialize;
use std::fs;
use std::path::Path;

use super::error::{ConfigError, Result};

pub const CONFIG_FILE_NAME: &str = "vitehost.toml";

/// Which tool produces the TLS bundle for the dev server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertIssuerKind {
    /// `dotnet dev-certs https` export.
    #[default]
    Dotnet,
    /// Self-signed certificate generated in-process.
    Builtin,
}

impl std::str::FromStr for CertIssuerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dotnet" => Ok(Self::Dotnet),
            "builtin" => Ok(Self::Builtin),
            other => Err(format!(
                "unknown certificate issuer '{}' (expected 'dotnet' or 'builtin')",
                other
            )),
        }
    }
}

/// Root configuration from vitehost.toml. Every key is optional; missing keys
/// fall back to the defaults in [`super::DevServerOptions`].
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct VitehostToml {
    /// Directory holding the Vite project, relative to this file
    pub source_path: Option<String>,

    pub dev_server_port: Option<u16>,

    pub startup_timeout_secs: Option<u64>,

    /// package.json script that starts the dev server
    pub dev_script: Option<String>,

    pub cert_issuer: Option<CertIssuerKind>,

    pub fail_on_install_error: Option<bool>,

    /// Token a ready line must contain (empty string disables the check)
    pub ready_banner: Option<String>,

    pub ready_markers: Option<Vec<String>>,

    /// Address the development host listens on
    pub listen: Option<String>,

    /// [tools] section - external program names
    #[serde(default)]
    pub tools: ToolsSection,
}

/// [tools] section
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ToolsSection {
    pub node: Option<String>,
    pub package_manager: Option<String>,
    pub dotnet: Option<String>,
}

impl VitehostToml {
    /// Load vitehost.toml from a directory, if present.
    pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> Result<Option<Self>> {
        let path = dir.as_ref().join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from_file(&path).map(Some)
    }

    /// Load vitehost.toml from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(path.as_ref().to_path_buf(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(toml::from_str(content)?)
    }
}
