//! TLS identity for the dev server: a password-protected PKCS#12 bundle plus
//! a config fragment that points Vite at it.
//!
//! Both files live in the project directory and are created once per
//! checkout. They are never deleted here.

mod builtin;
mod dotnet;

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::command::CommandError;
use crate::config::CertIssuerKind;
use crate::log::Logger;

pub use builtin::BuiltinIssuer;
pub use dotnet::DotnetDevCerts;

pub const BUNDLE_FILE_NAME: &str = "devcert.pfx";
/// Stem of the generated fragment; the extension follows vite.config.
pub const FRAGMENT_STEM: &str = "serverOption";

/// 128 bits, hex encoded.
const PASSWORD_BYTES: usize = 16;

#[derive(Debug, Error)]
pub enum CertError {
    #[error("Project directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("{tool} exited with {}", exit_display(.code))]
    ToolFailed { tool: String, code: Option<i32> },

    #[error(transparent)]
    Tool(#[from] CommandError),

    #[error("Failed to generate certificate: {0}")]
    Generate(String),

    #[error("Failed to generate certificate password: {0}")]
    Random(String),

    #[error("Failed to write {0}: {1}")]
    Write(PathBuf, std::io::Error),
}

fn exit_display(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Produces a password-protected certificate bundle at a given path.
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    fn name(&self) -> &str;

    async fn issue(&self, bundle_path: &Path, password: &str, log: &Logger)
    -> Result<(), CertError>;
}

/// Issuer for a configured kind. `dotnet` is the program used for
/// [`CertIssuerKind::Dotnet`].
pub fn issuer_for(kind: CertIssuerKind, dotnet: &str) -> Box<dyn CertificateIssuer> {
    match kind {
        CertIssuerKind::Dotnet => Box::new(DotnetDevCerts::new(dotnet)),
        CertIssuerKind::Builtin => Box::new(BuiltinIssuer),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateBundle {
    pub bundle_path: PathBuf,
    pub fragment_path: PathBuf,
    /// Only known when the bundle was issued by this call.
    pub password: Option<String>,
}

impl CertificateBundle {
    pub fn freshly_issued(&self) -> bool {
        self.password.is_some()
    }
}

pub fn bundle_path(project_dir: &Path) -> PathBuf {
    project_dir.join(BUNDLE_FILE_NAME)
}

/// `serverOption.<ext>` next to the bundle. `config_ext` is the extension of
/// the Vite config file, without the dot.
pub fn fragment_path(project_dir: &Path, config_ext: &str) -> PathBuf {
    if config_ext.is_empty() {
        project_dir.join(FRAGMENT_STEM)
    } else {
        project_dir.join(format!("{}.{}", FRAGMENT_STEM, config_ext))
    }
}

/// Module body Vite loads as `server` options.
pub fn fragment_source(bundle_file_name: &str, password: &str) -> String {
    format!(
        "export default {{\n  https: {{\n    pfx: '{}',\n    passphrase: '{}'\n  }}\n}}\n",
        bundle_file_name, password
    )
}

pub fn generate_password() -> Result<String, CertError> {
    let mut bytes = [0u8; PASSWORD_BYTES];
    getrandom::fill(&mut bytes).map_err(|e| CertError::Random(e.to_string()))?;
    Ok(hex::encode(bytes))
}

/// Make sure the bundle and its fragment exist in `project_dir`.
///
/// When both files are already there nothing is invoked. Otherwise a new
/// password is generated, the issuer exports the bundle, and the fragment is
/// written last so a failed export never leaves a fragment behind.
pub async fn ensure_certificate(
    project_dir: &Path,
    config_ext: &str,
    issuer: &dyn CertificateIssuer,
    log: &Logger,
) -> Result<CertificateBundle, CertError> {
    if !project_dir.is_dir() {
        return Err(CertError::DirectoryNotFound(project_dir.to_path_buf()));
    }

    let bundle_path = bundle_path(project_dir);
    let fragment_path = fragment_path(project_dir, config_ext);

    if bundle_path.is_file() && fragment_path.is_file() {
        log.debug(format!(
            "Reusing {} and {}",
            bundle_path.display(),
            fragment_path.display()
        ));
        return Ok(CertificateBundle {
            bundle_path,
            fragment_path,
            password: None,
        });
    }

    let password = generate_password()?;
    log.debug(format!("Certificate password: {}", password));
    log.info(format!(
        "Generating development certificate with {}",
        issuer.name()
    ));

    issuer.issue(&bundle_path, &password, log).await?;

    fs::write(&fragment_path, fragment_source(BUNDLE_FILE_NAME, &password))
        .map_err(|e| CertError::Write(fragment_path.clone(), e))?;

    Ok(CertificateBundle {
        bundle_path,
        fragment_path,
        password: Some(password),
    })
}
