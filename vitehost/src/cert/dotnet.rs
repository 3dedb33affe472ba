use std::path::Path;

use async_trait::async_trait;

use super::{CertError, CertificateIssuer};
use crate::command::{ToolCommand, ToolOutput};
use crate::log::Logger;

/// Exports the ASP.NET Core development certificate with
/// `dotnet dev-certs https -v -ep <bundle> -p <password>`.
#[derive(Debug, Clone)]
pub struct DotnetDevCerts {
    program: String,
}

impl DotnetDevCerts {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn command(&self, bundle_path: &Path, password: &str) -> ToolCommand {
        ToolCommand::new(&self.program).args([
            "dev-certs".to_string(),
            "https".to_string(),
            "-v".to_string(),
            "-ep".to_string(),
            bundle_path.to_string_lossy().to_string(),
            "-p".to_string(),
            password.to_string(),
        ])
    }
}

fn log_tool_output(output: &ToolOutput, log: &Logger) {
    for line in output.stdout.lines().filter(|l| !l.trim().is_empty()) {
        log.info(line.trim_end());
    }
    for line in output.stderr.lines().filter(|l| !l.trim().is_empty()) {
        log.error(line.trim_end());
    }
}

#[async_trait]
impl CertificateIssuer for DotnetDevCerts {
    fn name(&self) -> &str {
        "dotnet dev-certs"
    }

    async fn issue(
        &self,
        bundle_path: &Path,
        password: &str,
        log: &Logger,
    ) -> Result<(), CertError> {
        let mut cmd = self.command(bundle_path, password);
        if let Some(dir) = bundle_path.parent() {
            cmd = cmd.current_dir(dir);
        }

        let output = cmd.output().await?;
        log_tool_output(&output, log);

        if !output.success {
            return Err(CertError::ToolFailed {
                tool: self.name().to_string(),
                code: output.exit_code,
            });
        }
        Ok(())
    }
}
