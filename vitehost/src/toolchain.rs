//! Node.js presence check, run once before any bootstrap work.

use thiserror::Error;

use crate::command::{CommandError, ToolCommand};
use crate::log::Logger;

pub const NODE_REMEDIATION: &str = "Node.js is required to build and run this project. To continue, please install Node.js from https://nodejs.org/, and then restart your command prompt or IDE.";

#[derive(Debug, Error)]
#[error("{remediation}")]
pub struct ToolNotInstalled {
    pub tool: String,
    pub remediation: String,
    #[source]
    pub source: Option<CommandError>,
}

/// Fails unless `<node> --version` exits with status 0.
///
/// Returns the reported version on success.
pub async fn ensure_toolchain(node: &str, log: &Logger) -> Result<String, ToolNotInstalled> {
    let not_installed = |source: Option<CommandError>| ToolNotInstalled {
        tool: node.to_string(),
        remediation: NODE_REMEDIATION.to_string(),
        source,
    };

    let output = ToolCommand::new(node)
        .arg("--version")
        .output()
        .await
        .map_err(|e| not_installed(Some(e)))?;

    if !output.success {
        if !output.stderr.trim().is_empty() {
            log.error(output.stderr.trim());
        }
        return Err(not_installed(None));
    }

    let version = output.stdout.trim().to_string();
    log.debug(format!("{} {}", node, version));
    Ok(version)
}
