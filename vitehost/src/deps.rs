//! `npm install` when the project has never been installed.

use std::path::Path;

use thiserror::Error;

use crate::command::{CommandError, ToolCommand};
use crate::log::Logger;

pub const PACKAGE_CACHE_DIR: &str = "node_modules";

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("{command} exited with code {}", .code.map_or("none".to_string(), |c| c.to_string()))]
    Failed { command: String, code: Option<i32> },

    #[error(transparent)]
    Command(#[from] CommandError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// `node_modules` was already present.
    Present,
    Installed,
    /// Install exited non-zero and `fail_on_error` was off.
    FailedIgnored,
}

/// Run `<package_manager> install` in `source_path` unless `node_modules`
/// exists there.
pub async fn ensure_dependencies(
    source_path: &Path,
    package_manager: &str,
    fail_on_error: bool,
    log: &Logger,
) -> Result<InstallOutcome, InstallError> {
    if source_path.join(PACKAGE_CACHE_DIR).is_dir() {
        return Ok(InstallOutcome::Present);
    }

    let cmd = ToolCommand::new(package_manager)
        .arg("install")
        .current_dir(source_path);

    log.warn(format!(
        "{} not found, running {}...",
        PACKAGE_CACHE_DIR,
        cmd.display()
    ));

    let output = cmd.output().await?;
    for line in output.stdout.lines().filter(|l| !l.trim().is_empty()) {
        log.info(line.trim_end());
    }
    for line in output.stderr.lines().filter(|l| !l.trim().is_empty()) {
        log.error(line.trim_end());
    }

    if !output.success {
        if fail_on_error {
            return Err(InstallError::Failed {
                command: cmd.display(),
                code: output.exit_code,
            });
        }
        log.warn(format!(
            "{} failed (exit code {:?}), continuing anyway.",
            cmd.display(),
            output.exit_code
        ));
        return Ok(InstallOutcome::FailedIgnored);
    }

    log.warn(format!("{} done.", cmd.display()));
    Ok(InstallOutcome::Installed)
}
