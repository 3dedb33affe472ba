//! Launches the dev server and races its output streams against a timer.
//!
//! ```text
//! spawn ─┬─ stdout reader ── ready line ─────────┐
//!        ├─ stderr reader ── premature close ────┤
//!        ├─ exit watcher ─── exit before ready ──┼─► ReadinessSignal (first write wins)
//!        └─ timer ────────── timeout elapsed ────┘
//! ```
//!
//! The child is never killed here. It outlives the bootstrap call and the
//! reader tasks stay attached to it.

mod readers;
mod signal;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::process::Child;
use tokio::time::Instant;

use crate::command::{CommandError, ToolCommand};
use crate::config::DevServerOptions;
use crate::log::Logger;

pub use readers::{ReadyPattern, read_stderr, read_stdout};
pub use signal::{Outcome, ReadinessSignal};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("{0}")]
    Launch(String),

    #[error("The dev server did not report ready within {} seconds", .0.as_secs())]
    TimedOut(Duration),

    #[error(transparent)]
    Spawn(#[from] CommandError),
}

/// Dev server reported ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready {
    pub pid: Option<u32>,
    pub elapsed: Duration,
}

/// What to launch and how to recognise it is up.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub source_path: PathBuf,
    pub port: u16,
    pub timeout: Duration,
    pub package_manager: String,
    pub dev_script: String,
    pub pattern: ReadyPattern,
}

impl LaunchConfig {
    pub fn from_options(options: &DevServerOptions) -> Self {
        Self {
            source_path: options.source_path.clone(),
            port: options.dev_server_port,
            timeout: options.startup_timeout,
            package_manager: options.tools.package_manager.clone(),
            dev_script: options.dev_script.clone(),
            pattern: ReadyPattern::new(&options.ready_banner, &options.ready_markers),
        }
    }

    /// `<package_manager> run <script> -- --port <port>` in the project dir.
    pub fn command(&self) -> ToolCommand {
        ToolCommand::new(&self.package_manager)
            .args([
                "run".to_string(),
                self.dev_script.clone(),
                "--".to_string(),
                "--port".to_string(),
                self.port.to_string(),
            ])
            .current_dir(&self.source_path)
    }
}

/// Start one reader task per stream. The tasks are detached.
pub fn spawn_readers<O, E>(
    stdout: Option<O>,
    stderr: Option<E>,
    pattern: ReadyPattern,
    signal: &ReadinessSignal,
    log: &Logger,
) where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    if let Some(out) = stdout {
        tokio::spawn(read_stdout(out, pattern, signal.clone(), log.clone()));
    }
    if let Some(err) = stderr {
        tokio::spawn(read_stderr(err, signal.clone(), log.clone()));
    }
}

/// Wait for the first recorded outcome, recording `TimedOut` once `timeout`
/// elapses. A reader that wins right at the deadline still decides.
pub async fn await_outcome(signal: &ReadinessSignal, timeout: Duration) -> Outcome {
    match tokio::time::timeout(timeout, signal.wait()).await {
        Ok(outcome) => outcome,
        Err(_) => {
            signal.try_set(Outcome::TimedOut);
            signal.get().unwrap_or(Outcome::TimedOut)
        }
    }
}

async fn watch_exit(mut child: Child, signal: ReadinessSignal, log: Logger) {
    match child.wait().await {
        Ok(status) => {
            let message = format!("dev server exited with {}", status);
            if !signal.try_set(Outcome::Failed(message.clone())) {
                log.warn(message);
            }
        }
        Err(e) => {
            let message = format!("lost track of the dev server process: {}", e);
            if !signal.try_set(Outcome::Failed(message.clone())) {
                log.warn(message);
            }
        }
    }
}

fn into_result(
    outcome: Outcome,
    pid: Option<u32>,
    started: Instant,
    timeout: Duration,
) -> Result<Ready, SupervisorError> {
    match outcome {
        Outcome::Ready => Ok(Ready {
            pid,
            elapsed: started.elapsed(),
        }),
        Outcome::Failed(reason) => Err(SupervisorError::Launch(reason)),
        Outcome::TimedOut => Err(SupervisorError::TimedOut(timeout)),
    }
}

/// Spawn the dev server and resolve once it is ready, failed or timed out.
pub async fn launch_and_await_ready(
    config: &LaunchConfig,
    log: &Logger,
) -> Result<Ready, SupervisorError> {
    let cmd = config.command();
    log.info(format!(
        "Starting {} in {}",
        cmd.display(),
        config.source_path.display()
    ));

    let started = Instant::now();
    let mut child = cmd.spawn()?;
    let pid = child.id();
    if let Some(pid) = pid {
        log.debug(format!("dev server pid {}", pid));
    }

    let signal = ReadinessSignal::new();
    spawn_readers(
        child.stdout.take(),
        child.stderr.take(),
        config.pattern.clone(),
        &signal,
        log,
    );
    tokio::spawn(watch_exit(child, signal.clone(), log.clone()));

    let outcome = await_outcome(&signal, config.timeout).await;
    into_result(outcome, pid, started, config.timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::channel_logger;
    use tokio::io::{AsyncWriteExt, DuplexStream, duplex};

    fn pattern() -> ReadyPattern {
        ReadyPattern::new("vite", &["ready in".to_string()])
    }

    /// Reader half plus the writer that keeps it open.
    fn open_stream() -> (DuplexStream, DuplexStream) {
        let (writer, reader) = duplex(1024);
        (reader, writer)
    }

    #[test]
    fn command_passes_port_after_separator() {
        let mut options = DevServerOptions::new("/srv/web");
        options.dev_server_port = 5173;
        let cmd = LaunchConfig::from_options(&options).command();
        assert_eq!(cmd.program(), "npm");
        assert_eq!(cmd.get_args(), &["run", "dev", "--", "--port", "5173"]);
        assert_eq!(
            cmd.get_current_dir(),
            Some(std::path::Path::new("/srv/web"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn silent_server_times_out_at_the_deadline() {
        let (log, _rx) = channel_logger("vite");
        let (stdout, _keep_out) = open_stream();
        let (stderr, _keep_err) = open_stream();
        let signal = ReadinessSignal::new();
        spawn_readers(Some(stdout), Some(stderr), pattern(), &signal, &log);

        let timeout = Duration::from_secs(120);
        let started = Instant::now();
        let outcome = await_outcome(&signal, timeout).await;
        let elapsed = started.elapsed();

        assert_eq!(outcome, Outcome::TimedOut);
        assert!(elapsed >= timeout);
        assert!(elapsed < timeout + Duration::from_millis(50));
    }

    #[tokio::test]
    async fn first_ready_line_decides_without_later_lines() {
        let (log, _rx) = channel_logger("vite");
        let (stdout, mut out_writer) = open_stream();
        let (stderr, _keep_err) = open_stream();
        let signal = ReadinessSignal::new();
        spawn_readers(Some(stdout), Some(stderr), pattern(), &signal, &log);

        out_writer
            .write_all(b"> web@0.0.0 dev\n\n  VITE v5.0.0  ready in 88 ms\n")
            .await
            .unwrap();

        // The writer stays open: nothing after the ready line is needed.
        let outcome = await_outcome(&signal, Duration::from_secs(5)).await;
        assert_eq!(outcome, Outcome::Ready);
    }

    #[tokio::test]
    async fn stderr_close_fails_before_timeout() {
        let (log, _rx) = channel_logger("vite");
        let (stdout, _keep_out) = open_stream();
        let stderr: &'static [u8] = b"sh: vite: command not found\n";
        let signal = ReadinessSignal::new();
        spawn_readers(Some(stdout), Some(stderr), pattern(), &signal, &log);

        let started = Instant::now();
        let outcome = await_outcome(&signal, Duration::from_secs(30)).await;
        assert!(matches!(outcome, Outcome::Failed(ref m) if m.starts_with("dev server launch failed")));
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn ready_then_stderr_close_stays_ready() {
        let (log, _rx) = channel_logger("vite");
        let signal = ReadinessSignal::new();
        signal.try_set(Outcome::Ready);
        let stdout: &'static [u8] = b"";
        let stderr: &'static [u8] = b"";
        spawn_readers(Some(stdout), Some(stderr), pattern(), &signal, &log);

        assert_eq!(
            await_outcome(&signal, Duration::from_secs(1)).await,
            Outcome::Ready
        );
    }

    #[test]
    fn outcome_maps_onto_errors() {
        let started = Instant::now();
        let timeout = Duration::from_secs(7);
        assert!(matches!(
            into_result(Outcome::Failed("x".into()), None, started, timeout),
            Err(SupervisorError::Launch(m)) if m == "x"
        ));
        let err = into_result(Outcome::TimedOut, None, started, timeout).unwrap_err();
        assert_eq!(
            err.to_string(),
            "The dev server did not report ready within 7 seconds"
        );
        assert!(into_result(Outcome::Ready, Some(1), started, timeout).is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn launch_reports_ready_from_real_process() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::TempDir::new().unwrap();
        let npm = temp.path().join("fake-npm");
        std::fs::write(
            &npm,
            "#!/bin/sh\necho \"port=$5\"\necho '  VITE v5.0.0  ready in 5 ms'\nsleep 2\n",
        )
        .unwrap();
        std::fs::set_permissions(&npm, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut options = DevServerOptions::new(temp.path());
        options.tools.package_manager = npm.to_string_lossy().to_string();
        options.startup_timeout = Duration::from_secs(10);
        let (log, mut rx) = channel_logger("vite");

        let ready = launch_and_await_ready(&LaunchConfig::from_options(&options), &log)
            .await
            .unwrap();
        assert!(ready.pid.is_some());
        assert!(
            crate::log::drain(&mut rx)
                .iter()
                .any(|e| e.message == "port=3000")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn early_exit_is_launch_failure() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut options = DevServerOptions::new(temp.path());
        options.tools.package_manager = "false".to_string();
        let (log, _rx) = channel_logger("vite");

        let err = launch_and_await_ready(&LaunchConfig::from_options(&options), &log)
            .await
            .unwrap_err();
        assert!(matches!(err, SupervisorError::Launch(_)));
    }
}
