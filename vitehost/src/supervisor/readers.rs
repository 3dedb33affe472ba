//! Line readers for the dev server's output streams.
//!
//! Each stream is owned by exactly one reader task. Both keep running after
//! the outcome is decided so live output keeps reaching the log.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use super::signal::{Outcome, ReadinessSignal};
use crate::log::Logger;

/// Case-insensitive test for Vite's "ready" banner.
///
/// A line is ready when it contains the banner token (if any) and at least
/// one of the markers. ANSI colour codes are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyPattern {
    banner: String,
    markers: Vec<String>,
}

impl ReadyPattern {
    pub fn new(banner: &str, markers: &[String]) -> Self {
        Self {
            banner: banner.trim().to_lowercase(),
            markers: markers
                .iter()
                .map(|m| m.trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, line: &str) -> bool {
        let line = console::strip_ansi_codes(line).to_lowercase();
        (self.banner.is_empty() || line.contains(&self.banner))
            && self.markers.iter().any(|m| line.contains(m.as_str()))
    }
}

fn launch_failed(reason: impl std::fmt::Display) -> Outcome {
    Outcome::Failed(format!("dev server launch failed: {}", reason))
}

/// Raw line reader. Bytes that are not UTF-8 are replaced, never fatal: the
/// pipe has to be drained until the child closes it.
struct LossyLines<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LossyLines<R> {
    fn new(stream: R) -> Self {
        Self {
            reader: BufReader::new(stream),
            buf: Vec::new(),
        }
    }

    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).trim_end().to_string()))
    }
}

/// Log every non-empty stdout line at info and flag the first ready line.
pub async fn read_stdout<R>(stream: R, pattern: ReadyPattern, signal: ReadinessSignal, log: Logger)
where
    R: AsyncRead + Unpin,
{
    let mut lines = LossyLines::new(stream);
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                if !signal.is_set() && pattern.matches(&line) {
                    signal.try_set(Outcome::Ready);
                }
                log.info(line);
            }
            Ok(None) => break,
            Err(e) => {
                signal.try_set(launch_failed(e));
                break;
            }
        }
    }
}

/// Log every stderr line at error. A stream that ends before the dev server
/// is ready means the launch failed.
pub async fn read_stderr<R>(stream: R, signal: ReadinessSignal, log: Logger)
where
    R: AsyncRead + Unpin,
{
    let mut lines = LossyLines::new(stream);
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if !line.trim().is_empty() {
                    log.error(line);
                }
            }
            Ok(None) => {
                signal.try_set(launch_failed("stderr closed before the dev server was ready"));
                break;
            }
            Err(e) => {
                signal.try_set(launch_failed(e));
                break;
            }
        }
    }
}
