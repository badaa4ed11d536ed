//! Locating, building and supervising the Node sidecar process.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use {
    anyhow::{Context, Result, bail},
    tokio::{
        io::{AsyncBufReadExt, AsyncRead, BufReader},
        process::{Child, Command},
    },
    tracing::{debug, error, info, warn},
};

use crate::sidecar::DEFAULT_SIDECAR_PORT;

/// Environment variable pointing at the sidecar directory.
pub const SIDECAR_DIR_ENV: &str = "COURIER_WHATSAPP_SIDECAR_DIR";

const SIDECAR_REL_PATH: &str = "sidecar/whatsapp-web";
const STARTUP_GRACE: Duration = Duration::from_millis(500);
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// A spawned sidecar. Killed when dropped.
pub struct SidecarProcess {
    child: Child,
    port: u16,
}

impl SidecarProcess {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// SIGTERM, then kill if the sidecar has not exited within five seconds.
    pub async fn stop(&mut self) -> Result<()> {
        info!(port = self.port, "stopping WhatsApp sidecar");

        #[cfg(unix)]
        {
            use nix::{
                sys::signal::{Signal, kill},
                unistd::Pid,
            };

            if let Some(pid) = self.child.id()
                && let Ok(pid) = i32::try_from(pid)
            {
                let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
            }
        }

        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
        }

        match tokio::time::timeout(STOP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => info!(?status, "WhatsApp sidecar exited"),
            Ok(Err(e)) => warn!(error = %e, "failed waiting for WhatsApp sidecar"),
            Err(_) => {
                warn!("WhatsApp sidecar ignored SIGTERM, killing");
                self.child.kill().await.context("failed to kill sidecar")?;
            },
        }
        Ok(())
    }
}

/// How to launch the sidecar.
#[derive(Debug, Clone)]
pub struct SidecarConfig {
    /// Directory containing `package.json`.
    pub sidecar_dir: PathBuf,
    pub port: u16,
    /// Where the sidecar persists the WhatsApp session.
    pub session_dir: Option<PathBuf>,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            sidecar_dir: PathBuf::new(),
            port: DEFAULT_SIDECAR_PORT,
            session_dir: None,
        }
    }
}

fn has_manifest(dir: &Path) -> bool {
    dir.join("package.json").is_file()
}

/// Find the sidecar directory.
///
/// Tries, in order: `explicit`, `$COURIER_WHATSAPP_SIDECAR_DIR`, paths next to
/// the running executable, then paths relative to the working directory.
pub fn find_sidecar_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if has_manifest(path) {
            return Ok(path.to_path_buf());
        }
        bail!("no package.json in sidecar directory {}", path.display());
    }

    if let Some(dir) = std::env::var_os(SIDECAR_DIR_ENV) {
        let path = PathBuf::from(dir);
        if has_manifest(&path) {
            return Ok(path);
        }
        warn!(path = %path.display(), "{SIDECAR_DIR_ENV} has no package.json, searching elsewhere");
    }

    let exe_relative = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .into_iter()
        .flat_map(|dir| {
            [
                dir.join("..").join(SIDECAR_REL_PATH),
                dir.join("../..").join(SIDECAR_REL_PATH),
            ]
        });
    let cwd_relative = ["", "..", "../.."]
        .into_iter()
        .map(|prefix| Path::new(prefix).join(SIDECAR_REL_PATH));

    exe_relative
        .chain(cwd_relative)
        .find(|candidate| has_manifest(candidate))
        .map(|found| found.canonicalize().unwrap_or(found))
        .with_context(|| {
            format!("WhatsApp sidecar not found; set {SIDECAR_DIR_ENV} or create {SIDECAR_REL_PATH}")
        })
}

/// Spawn the sidecar, building it first if `dist/index.js` is missing.
pub async fn start_sidecar(config: SidecarConfig) -> Result<SidecarProcess> {
    let dir = config.sidecar_dir.as_path();
    if !has_manifest(dir) {
        bail!("no package.json in sidecar directory {}", dir.display());
    }

    if !dir.join("dist/index.js").exists() {
        if !dir.join("node_modules").exists() {
            run_npm(dir, &["install"]).await?;
        }
        run_npm(dir, &["run", "build"]).await?;
    }

    info!(path = %dir.display(), port = config.port, "starting WhatsApp sidecar");

    let mut cmd = Command::new("node");
    cmd.arg("dist/index.js")
        .current_dir(dir)
        .env("COURIER_WHATSAPP_PORT", config.port.to_string())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(session_dir) = &config.session_dir {
        cmd.env("COURIER_WHATSAPP_SESSION_DIR", session_dir);
    }

    let mut child = cmd.spawn().context("failed to spawn WhatsApp sidecar")?;
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_logs(stdout, false));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_logs(stderr, true));
    }

    tokio::time::sleep(STARTUP_GRACE).await;
    if let Some(status) = child
        .try_wait()
        .context("failed to poll WhatsApp sidecar")?
    {
        bail!("WhatsApp sidecar exited during startup: {status}");
    }

    Ok(SidecarProcess {
        child,
        port: config.port,
    })
}

async fn run_npm(dir: &Path, args: &[&str]) -> Result<()> {
    let step = args.join(" ");
    info!(path = %dir.display(), "npm {step}");
    let output = Command::new("npm")
        .args(args)
        .current_dir(dir)
        .output()
        .await
        .with_context(|| format!("failed to run npm {step}"))?;
    if !output.status.success() {
        bail!(
            "npm {step} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(())
}

/// Re-emit sidecar output under the `whatsapp_sidecar` target.
///
/// Lines that parse as pino JSON keep their level; anything else is info on
/// stdout and warn on stderr.
async fn forward_logs(stream: impl AsyncRead + Unpin, is_stderr: bool) {
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match parse_pino_line(&line) {
            Some((level, msg)) => match level {
                0..=20 => debug!(target: "whatsapp_sidecar", "{msg}"),
                21..=30 => info!(target: "whatsapp_sidecar", "{msg}"),
                31..=40 => warn!(target: "whatsapp_sidecar", "{msg}"),
                _ => error!(target: "whatsapp_sidecar", "{msg}"),
            },
            None if is_stderr => warn!(target: "whatsapp_sidecar", "{line}"),
            None => info!(target: "whatsapp_sidecar", "{line}"),
        }
    }
}

fn parse_pino_line(line: &str) -> Option<(u64, String)> {
    if !line.starts_with('{') {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    let level = value.get("level").and_then(serde_json::Value::as_u64).unwrap_or(30);
    let msg = value.get("msg").and_then(serde_json::Value::as_str)?;
    Some((level, msg.to_string()))
}
