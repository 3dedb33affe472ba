use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use vitehost::config::{
    CertIssuerKind, ConfigError, DEFAULT_DEV_SERVER_PORT, Overrides, Settings, VitehostToml,
};
use vitehost::inject::InjectOutcome;
use vitehost::log::{channel_logger, drain};
use vitehost::probe::{LoopbackProbe, PortProbe};
use vitehost::{BootstrapOutcome, Bootstrapper};
use vitehost_proxy::{ListenerTls, ProxyTarget};

use crate::output;

/// vitehost - run a Vite dev server behind a local HTTPS development host
#[derive(Parser)]
#[command(name = "vitehost")]
#[command(version)]
#[command(about = "Run a Vite dev server behind a local HTTPS development host")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Show verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the host, bring the dev server up and proxy to it
    Run(RunArgs),

    /// Create the development certificate and wire it into vite.config
    Cert(ProjectArgs),

    /// Report whether the dev server port is listening
    Status {
        /// Dev server port (default: vitehost.toml, then 3000)
        #[arg(long, env = "VITEHOST_PORT")]
        port: Option<u16>,

        /// Path to vitehost.toml
        #[arg(long, env = "VITEHOST_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ProjectArgs {
    /// Path to vitehost.toml (default: ./vitehost.toml when present)
    #[arg(long, env = "VITEHOST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory of the Vite project
    #[arg(long, env = "VITEHOST_SOURCE_PATH")]
    pub source_path: Option<PathBuf>,

    /// Certificate issuer: dotnet or builtin
    #[arg(long, env = "VITEHOST_CERT_ISSUER")]
    pub cert_issuer: Option<CertIssuerKind>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// Dev server port
    #[arg(long, env = "VITEHOST_PORT")]
    pub port: Option<u16>,

    /// Seconds to wait for the dev server to report ready
    #[arg(long, env = "VITEHOST_STARTUP_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Address the host listens on
    #[arg(long, env = "VITEHOST_LISTEN")]
    pub listen: Option<String>,

    /// PEM certificate for an HTTPS listener
    #[arg(long, requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key for an HTTPS listener
    #[arg(long, requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,
}

impl Cli {
    pub fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        match self.command {
            Commands::Run(args) => run_host(args),
            Commands::Cert(project) => {
                let rt = tokio::runtime::Runtime::new()?;
                rt.block_on(provision_certificate(project))
            }
            Commands::Status { port, config } => status(port, config.as_deref()),
        }
    }
}

/// Config file, and the directory relative paths in it resolve against.
fn load_config_file(
    config: Option<&Path>,
    cwd: &Path,
) -> Result<(Option<VitehostToml>, PathBuf), ConfigError> {
    match config {
        Some(path) => {
            let path = cwd.join(path);
            let file = VitehostToml::load_from_file(&path)?;
            let root = path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| cwd.to_path_buf());
            Ok((Some(file), root))
        }
        None => Ok((VitehostToml::load_from_dir(cwd)?, cwd.to_path_buf())),
    }
}

fn load_settings(
    project: &ProjectArgs,
    mut overrides: Overrides,
) -> Result<Settings, Box<dyn std::error::Error>> {
    let cwd = std::env::current_dir()?;
    let (file, content_root) = load_config_file(project.config.as_deref(), &cwd)?;

    overrides.source_path = project.source_path.clone();
    overrides.cert_issuer = project.cert_issuer;
    Ok(Settings::resolve(file.as_ref(), &content_root, &overrides, &cwd)?)
}

fn run_host(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let settings = load_settings(
        &args.project,
        Overrides {
            dev_server_port: args.port,
            startup_timeout_secs: args.timeout,
            listen: args.listen.clone(),
            ..Default::default()
        },
    )?;

    let tls = match (args.tls_cert, args.tls_key) {
        (Some(cert_path), Some(key_path)) => Some(ListenerTls {
            cert_path,
            key_path,
        }),
        _ => None,
    };

    let target = ProxyTarget::new();
    let _server = vitehost_proxy::serve(&settings.listen, target.clone(), tls.as_ref())?;
    let scheme = if tls.is_some() { "https" } else { "http" };
    output::success(&format!("Listening on {}://{}", scheme, settings.listen));
    output::step(&format!(
        "Bringing up the dev server in {}",
        settings.dev.source_path.display()
    ));

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(supervise(settings, target))
}

async fn supervise(
    settings: Settings,
    target: ProxyTarget,
) -> Result<(), Box<dyn std::error::Error>> {
    let (log, mut log_rx) = channel_logger("vitehost");
    let bootstrapper = Bootstrapper::new(settings.dev, log);

    let result = {
        let run = bootstrapper.run(&target);
        tokio::pin!(run);
        loop {
            tokio::select! {
                Some(entry) = log_rx.recv() => output::log_entry(&entry),
                result = &mut run => break result,
            }
        }
    };
    drain(&mut log_rx).iter().for_each(output::log_entry);

    match result? {
        BootstrapOutcome::AlreadyRunning(endpoint) => {
            output::success(&format!("Using the dev server already running at {}", endpoint))
        }
        BootstrapOutcome::Launched { endpoint, ready } => output::success(&format!(
            "Dev server ready at {} ({:.1}s)",
            endpoint,
            ready.elapsed.as_secs_f64()
        )),
    }
    output::muted("Press Ctrl+C to stop.");

    // The dev server keeps writing after it is ready.
    tokio::select! {
        _ = async {
            while let Some(entry) = log_rx.recv().await {
                output::log_entry(&entry);
            }
        } => {}
        _ = shutdown_signal() => {
            if output::is_verbose() {
                println!("\nShutting down...");
            }
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
            return;
        }
    }
    let _ = tokio::signal::ctrl_c().await;
}

async fn provision_certificate(project: ProjectArgs) -> Result<(), Box<dyn std::error::Error>> {
    let settings = load_settings(&project, Overrides::default())?;
    let (log, mut log_rx) = channel_logger("vitehost");

    let result = Bootstrapper::new(settings.dev, log).provision().await;
    drain(&mut log_rx).iter().for_each(output::log_entry);
    let provisioned = result?;

    if provisioned.bundle.freshly_issued() {
        output::success(&format!(
            "Created {}",
            provisioned.bundle.bundle_path.display()
        ));
    } else {
        output::success(&format!(
            "Using existing {}",
            provisioned.bundle.bundle_path.display()
        ));
    }
    match provisioned.injection {
        InjectOutcome::Injected => output::success(&format!(
            "Updated {}",
            provisioned.config_path.display()
        )),
        InjectOutcome::AlreadyInjected => output::muted(&format!(
            "{} already uses the certificate",
            provisioned.config_path.display()
        )),
        InjectOutcome::NoExportDefault => output::warning(&format!(
            "{} was left unchanged (no `export default` line)",
            provisioned.config_path.display()
        )),
    }
    Ok(())
}

fn status(port: Option<u16>, config: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let port = match port {
        Some(port) => port,
        None => {
            let cwd = std::env::current_dir()?;
            let (file, _) = load_config_file(config, &cwd)?;
            file.and_then(|f| f.dev_server_port)
                .unwrap_or(DEFAULT_DEV_SERVER_PORT)
        }
    };

    match LoopbackProbe::default().listening_addr(port) {
        Some(addr) => output::success(&format!("Dev server listening on {}", addr)),
        None => output::warning(&format!("Nothing is listening on port {}", port)),
    }
    Ok(())
}
