//! Fake node / npm / dotnet executables and a throwaway Vite project.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use vitehost::DevServerOptions;

pub const VITE_CONFIG: &str = "import { defineConfig } from 'vite'\n\nexport default defineConfig({\n  plugins: [],\n})\n";

/// What the fake `npm run dev` does.
#[derive(Debug, Clone, Copy)]
pub enum DevScript {
    /// Prints Vite's banner, then keeps running.
    Ready,
    /// Writes an error and closes stderr while staying alive.
    CloseStderr,
    /// Never prints anything.
    Silent,
}

pub struct Fixture {
    _temp: TempDir,
    pub bin: PathBuf,
    pub web: PathBuf,
    pub calls: PathBuf,
}

fn write_executable(path: &Path, body: &str) {
    fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

impl Fixture {
    pub fn new(dev: DevScript, install_exit: i32) -> Self {
        let temp = TempDir::new().unwrap();
        let bin = temp.path().join("bin");
        let web = temp.path().join("web");
        fs::create_dir_all(&bin).unwrap();
        fs::create_dir_all(&web).unwrap();
        let calls = temp.path().join("calls.log");
        fs::write(&calls, "").unwrap();
        let log = calls.display();

        write_executable(&bin.join("node"), "echo v20.11.0");

        let run = match dev {
            DevScript::Ready => {
                "echo \"> web@0.0.0 $2\"\necho ''\necho '  VITE v5.0.0  ready in 42 ms'\necho \"  Local: https://localhost:$5/\"\nsleep 5"
            }
            DevScript::CloseStderr => {
                "echo 'Error: Cannot find module vite' >&2\nexec 2>&-\nsleep 5"
            }
            DevScript::Silent => "sleep 5",
        };
        write_executable(
            &bin.join("npm"),
            &format!(
                "echo \"npm $*\" >> '{log}'\ncase \"$1\" in\n  install)\n    [ {install_exit} -eq 0 ] && mkdir -p node_modules\n    exit {install_exit}\n    ;;\n  run)\n{run}\n    ;;\nesac"
            ),
        );

        // $5 is the bundle path following -ep.
        write_executable(
            &bin.join("dotnet"),
            &format!(
                "echo \"dotnet $*\" >> '{log}'\nprintf pfx > \"$5\"\necho 'The HTTPS developer certificate was generated successfully.'"
            ),
        );

        Self {
            _temp: temp,
            bin,
            web,
            calls,
        }
    }

    pub fn write_config(&self, name: &str, content: &str) -> PathBuf {
        let path = self.web.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    pub fn options(&self, port: u16, timeout: Duration) -> DevServerOptions {
        let mut options = DevServerOptions::new(&self.web);
        options.dev_server_port = port;
        options.startup_timeout = timeout;
        options.tools.node = self.tool("node");
        options.tools.package_manager = self.tool("npm");
        options.tools.dotnet = self.tool("dotnet");
        options
    }

    fn tool(&self, name: &str) -> String {
        self.bin.join(name).to_string_lossy().to_string()
    }

    /// Tool invocations so far, one per line.
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(&self.calls)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

/// A port nothing listens on right now.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
    listener.local_addr().unwrap().port()
}
