//! Wires the generated `serverOption` fragment into the project's
//! `vite.config.*`.
//!
//! The rewrite is line based: an import goes on the first line and
//! `server: serverOption,` goes right after the `export default` line.
//! A file that already imports the fragment is never touched.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub const VITE_CONFIG_STEM: &str = "vite.config";
const EXPORT_DEFAULT: &str = "export default";

#[derive(Debug, Error)]
pub enum InjectError {
    #[error("No vite.config file found in {0}")]
    ConfigFileNotFound(PathBuf),

    #[error("Found more than one vite.config file in {}: {}", .dir.display(), display_paths(.candidates))]
    AmbiguousConfigFile {
        dir: PathBuf,
        candidates: Vec<PathBuf>,
    },

    #[error("Failed to read {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to write {0}: {1}")]
    Write(PathBuf, std::io::Error),
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| p.display().to_string())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectOutcome {
    Injected,
    /// The file already references the fragment; left byte-identical.
    AlreadyInjected,
    /// No `export default` line; left unmodified.
    NoExportDefault,
}

/// The single `vite.config.<ext>` directly inside `dir`.
///
/// Matching is on the file name without its last extension, ignoring case.
pub fn find_vite_config(dir: &Path) -> Result<PathBuf, InjectError> {
    let entries = fs::read_dir(dir).map_err(|e| InjectError::Read(dir.to_path_buf(), e))?;

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s.eq_ignore_ascii_case(VITE_CONFIG_STEM))
        })
        .collect();
    candidates.sort();

    match candidates.len() {
        0 => Err(InjectError::ConfigFileNotFound(dir.to_path_buf())),
        1 => Ok(candidates.remove(0)),
        _ => Err(InjectError::AmbiguousConfigFile {
            dir: dir.to_path_buf(),
            candidates,
        }),
    }
}

/// Extension of the config file without the dot, e.g. `ts`.
pub fn config_extension(config_path: &Path) -> String {
    config_path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn fragment_module_name(fragment_path: &Path) -> String {
    fragment_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Rewritten text, or the reason the content stays as it is.
fn rewrite(content: &str, module: &str) -> Result<String, InjectOutcome> {
    let specifier = format!("./{}", module);
    let lines: Vec<&str> = content.lines().collect();

    if lines.iter().any(|line| line.contains(&specifier)) {
        return Err(InjectOutcome::AlreadyInjected);
    }

    let export_at = lines
        .iter()
        .position(|line| line.contains(EXPORT_DEFAULT))
        .ok_or(InjectOutcome::NoExportDefault)?;

    let newline = if content.contains("\r\n") { "\r\n" } else { "\n" };
    let import = format!("import {} from '{}'", module, specifier);
    let wiring = format!("  server: {},", module);

    let mut out: Vec<&str> = Vec::with_capacity(lines.len() + 2);
    out.push(&import);
    for (i, line) in lines.iter().enumerate() {
        out.push(line);
        if i == export_at {
            out.push(&wiring);
        }
    }

    let mut text = out.join(newline);
    if content.ends_with('\n') {
        text.push_str(newline);
    }
    Ok(text)
}

fn write_atomically(path: &Path, content: &str) -> Result<(), InjectError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut tmp =
        tempfile::NamedTempFile::new_in(dir).map_err(|e| InjectError::Write(path.into(), e))?;
    tmp.write_all(content.as_bytes())
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| InjectError::Write(path.into(), e))?;
    // The temp file is created owner-only; keep the config's own mode.
    let permissions = fs::metadata(path)
        .map_err(|e| InjectError::Write(path.into(), e))?
        .permissions();
    fs::set_permissions(tmp.path(), permissions)
        .map_err(|e| InjectError::Write(path.into(), e))?;
    tmp.persist(path)
        .map_err(|e| InjectError::Write(path.into(), e.error))?;
    Ok(())
}

/// Make `config_path` import the fragment at `fragment_path` and pass it as
/// the `server` options.
pub fn inject_server_options(
    config_path: &Path,
    fragment_path: &Path,
) -> Result<InjectOutcome, InjectError> {
    let content = fs::read_to_string(config_path)
        .map_err(|e| InjectError::Read(config_path.to_path_buf(), e))?;

    match rewrite(&content, &fragment_module_name(fragment_path)) {
        Ok(text) => {
            write_atomically(config_path, &text)?;
            Ok(InjectOutcome::Injected)
        }
        Err(unchanged) => Ok(unchanged),
    }
}
