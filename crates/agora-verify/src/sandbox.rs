//! Script sandbox
//!
//! Runs a verification script against the deliverable inside a container
//! with the full isolation contract: no network, read-only root filesystem,
//! memory/CPU/PID caps, a size-capped tmpfs scratch area, and a
//! non-privileged user with no capabilities. The deliverable and script are
//! materialized into a read-only `/input` mount; exit code 0 means pass.
//!
//! Wall-clock timeout is enforced here, over and above anything the
//! container runtime does; on expiry the container is killed and the result
//! carries the distinguishable `timed_out` outcome.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, error};
use uuid::Uuid;

use crate::criteria::{runtime_image, ScriptCriteria};

/// Captured stdout/stderr cap.
pub const MAX_OUTPUT_CAPTURE_BYTES: usize = 64 * 1024;

/// Sandbox configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Whether script verification is available at all.
    pub enabled: bool,
    /// The container runtime binary.
    #[serde(default = "default_runtime_binary")]
    pub runtime_binary: String,
    /// Host directory for per-run input staging.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            runtime_binary: default_runtime_binary(),
            staging_dir: default_staging_dir(),
        }
    }
}

fn default_runtime_binary() -> String {
    "docker".to_string()
}

fn default_staging_dir() -> PathBuf {
    std::env::temp_dir()
}

/// Result of one sandboxed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxReport {
    pub passed: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_seconds: f64,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SandboxReport {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            passed: false,
            exit_code: -1,
            stdout: String::new(),
            stderr: String::new(),
            duration_seconds: 0.0,
            timed_out: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Clone)]
pub struct Sandbox {
    config: SandboxConfig,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// Execute the script against the deliverable.
    pub async fn run(&self, criteria: &ScriptCriteria, deliverable: &Value) -> SandboxReport {
        if !self.config.enabled {
            return SandboxReport::failure("script verification is disabled");
        }
        let Some(image) = runtime_image(&criteria.runtime) else {
            return SandboxReport::failure(format!("unsupported runtime: {}", criteria.runtime));
        };
        let script_bytes = match criteria.script_bytes() {
            Ok(bytes) => bytes,
            Err(e) => return SandboxReport::failure(e.to_string()),
        };

        // Stage /input: result.json plus the executable script.
        let staging = self
            .config
            .staging_dir
            .join(format!("agora-verify-{}", Uuid::new_v4().simple()));
        if let Err(e) = self.stage_input(&staging, &script_bytes, deliverable).await {
            return SandboxReport::failure(format!("failed to stage input: {}", e));
        }

        let container_name = format!("verify-{}", Uuid::new_v4().simple());
        let report = self
            .run_container(&container_name, image, &staging, criteria)
            .await;

        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            debug!(path = %staging.display(), error = %e, "failed to remove staging dir");
        }

        report
    }

    async fn stage_input(
        &self,
        staging: &PathBuf,
        script: &[u8],
        deliverable: &Value,
    ) -> std::io::Result<()> {
        tokio::fs::create_dir_all(staging).await?;
        tokio::fs::write(staging.join("result.json"), serde_json::to_vec(deliverable)?).await?;

        let script_path = staging.join("verify");
        tokio::fs::write(&script_path, script).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o555)).await?;
        }
        Ok(())
    }

    async fn run_container(
        &self,
        container_name: &str,
        image: &str,
        staging: &PathBuf,
        criteria: &ScriptCriteria,
    ) -> SandboxReport {
        let entrypoint: Vec<String> = interpreter_for(&criteria.runtime)
            .into_iter()
            .chain(["/input/verify".to_string()])
            .collect();

        let mut cmd = Command::new(&self.config.runtime_binary);
        cmd.arg("run")
            .arg("--rm")
            .args(["--name", container_name])
            // Network isolation
            .arg("--network=none")
            // Resource limits
            .arg(format!("--memory={}m", criteria.memory_limit_mb))
            .args(["--memory-swap", &format!("{}m", criteria.memory_limit_mb)])
            .arg("--cpus=1")
            .arg("--pids-limit=256")
            // Security
            .arg("--read-only")
            .arg("--cap-drop=ALL")
            .arg("--security-opt=no-new-privileges:true")
            // Size-capped scratch area
            .arg("--tmpfs=/tmp:rw,noexec,nosuid,size=32m")
            // Input mounted read-only
            .args(["-v", &format!("{}:/input:ro", staging.display())])
            // Non-privileged user
            .arg("--user=65534:65534")
            .arg(image)
            .args(&entrypoint)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(error = %e, "container runtime unavailable");
                return SandboxReport::failure(format!("container runtime unavailable: {}", e));
            }
        };

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        let wall_clock = Duration::from_secs(criteria.timeout_seconds + 5);
        let status = match tokio::time::timeout(wall_clock, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return SandboxReport::failure(format!("container wait failed: {}", e)),
            Err(_) => {
                self.kill_container(container_name).await;
                let _ = child.kill().await;
                return SandboxReport {
                    passed: false,
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: "execution timed out".to_string(),
                    duration_seconds: started.elapsed().as_secs_f64(),
                    timed_out: true,
                    error: None,
                };
            }
        };

        let stdout = read_capped(&mut stdout_pipe).await;
        let stderr = read_capped(&mut stderr_pipe).await;
        let exit_code = status.code().unwrap_or(-1);

        SandboxReport {
            passed: exit_code == 0,
            exit_code,
            stdout,
            stderr,
            duration_seconds: started.elapsed().as_secs_f64(),
            timed_out: false,
            error: None,
        }
    }

    async fn kill_container(&self, container_name: &str) {
        let result = Command::new(&self.config.runtime_binary)
            .args(["kill", container_name])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .await;
        if let Err(e) = result {
            debug!(container = container_name, error = %e, "container kill failed");
        }
    }
}

/// Interpreter prefix for a runtime label; empty means execute directly.
fn interpreter_for(runtime: &str) -> Vec<String> {
    if runtime.starts_with("python") {
        vec!["python".into()]
    } else if runtime.starts_with("node") {
        vec!["node".into()]
    } else if runtime.starts_with("bash") {
        vec!["bash".into()]
    } else if runtime.starts_with("ruby") {
        vec!["ruby".into()]
    } else {
        vec![]
    }
}

async fn read_capped<R: tokio::io::AsyncRead + Unpin>(pipe: &mut Option<R>) -> String {
    let Some(pipe) = pipe.as_mut() else {
        return String::new();
    };
    let mut buf = Vec::new();
    let mut limited = pipe.take(MAX_OUTPUT_CAPTURE_BYTES as u64);
    if limited.read_to_end(&mut buf).await.is_err() {
        return String::new();
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpreter_mapping() {
        assert_eq!(interpreter_for("python:3.13"), vec!["python".to_string()]);
        assert_eq!(interpreter_for("node:22"), vec!["node".to_string()]);
        assert_eq!(interpreter_for("bash:5"), vec!["bash".to_string()]);
        assert_eq!(interpreter_for("ruby:3.3"), vec!["ruby".to_string()]);
    }

    #[test]
    fn disabled_sandbox_fails_closed() {
        let sandbox = Sandbox::new(SandboxConfig {
            enabled: false,
            ..Default::default()
        });
        let criteria = ScriptCriteria {
            script: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, "exit 0"),
            runtime: "bash:5".into(),
            timeout_seconds: 10,
            memory_limit_mb: 64,
        };
        let report = block_on(sandbox.run(&criteria, &serde_json::json!({})));
        assert!(!report.passed);
        assert!(report.error.is_some());
    }

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f)
    }
}
