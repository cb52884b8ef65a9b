//! Sandbox Client (`spec.md` §4.5): a single synchronous RPC,
//! `execute(language, code, limits)`, that runs untrusted code in an
//! isolated container and returns its full output plus the ordered
//! event sequence the collaboration room replays as WebSocket frames.
//!
//! Grounded on `moltis`'s `crates/tools/src/sandbox.rs` (`Sandbox`
//! trait: `backend_name`/`ensure_ready`/`exec`/`cleanup`, a
//! `DockerSandbox` and a `NoSandbox`) and `crates/tools/src/exec.rs`
//! (`ExecResult`/`ExecOpts` with timeout + output-size defaults),
//! trimmed to the one RPC this system needs.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Python,
    Java,
    Cpp,
}

impl Language {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "python" => Some(Language::Python),
            "java" => Some(Language::Java),
            "cpp" => Some(Language::Cpp),
            _ => None,
        }
    }

    /// The docker image this backend runs for the language. The image's
    /// entrypoint reads source from stdin and executes it.
    fn docker_image(self) -> &'static str {
        match self {
            Language::Python => "peerdev-sandbox-python:latest",
            Language::Java => "peerdev-sandbox-java:latest",
            Language::Cpp => "peerdev-sandbox-cpp:latest",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub wall_time: Duration,
    pub memory_bytes: u64,
    pub nano_cpus: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            wall_time: Duration::from_secs(10),
            memory_bytes: 512 * 1024 * 1024,
            nano_cpus: 1_000_000_000,
        }
    }
}

/// One unit of output produced during a run, in production order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecEvent {
    Stdout(String),
    Stderr(String),
}

#[derive(Debug, Clone)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub timed_out: bool,
    pub events: Vec<ExecEvent>,
}

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("sandbox backend unavailable: {0}")]
    Unavailable(String),
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("sandbox error: {0}")]
    Other(String),
}

impl SandboxError {
    /// The bit-exact WS `error` frame kind for this failure
    /// (`spec.md` §4.5).
    pub fn code(&self) -> &'static str {
        match self {
            SandboxError::Unavailable(_) => "sandbox_unavailable",
            SandboxError::UnsupportedLanguage(_) => "unsupported_language",
            SandboxError::Other(_) => "sandbox_error",
        }
    }
}

#[async_trait]
pub trait Sandbox: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Cheap readiness probe (e.g. daemon reachable); called once at
    /// startup, not before every run.
    async fn ensure_ready(&self) -> Result<(), SandboxError>;

    async fn execute(
        &self,
        language: Language,
        code: &str,
        limits: Limits,
    ) -> Result<ExecResult, SandboxError>;
}

/// Runs each language in its own throwaway, network-isolated container.
pub struct DockerSandbox;

impl DockerSandbox {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DockerSandbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    fn backend_name(&self) -> &'static str {
        "docker"
    }

    async fn ensure_ready(&self) -> Result<(), SandboxError> {
        let status = Command::new("docker")
            .arg("info")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| SandboxError::Unavailable(e.to_string()))?;
        if status.success() {
            Ok(())
        } else {
            Err(SandboxError::Unavailable(
                "docker daemon not reachable".into(),
            ))
        }
    }

    async fn execute(
        &self,
        language: Language,
        code: &str,
        limits: Limits,
    ) -> Result<ExecResult, SandboxError> {
        let memory_arg = format!("{}b", limits.memory_bytes);
        let cpus_arg = format!("{:.2}", limits.nano_cpus as f64 / 1_000_000_000.0);

        let mut child = Command::new("docker")
            .args([
                "run",
                "--rm",
                "-i",
                "--network=none",
                "--memory",
                &memory_arg,
                "--cpus",
                &cpus_arg,
                language.docker_image(),
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SandboxError::Unavailable(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            use tokio::io::AsyncWriteExt;
            stdin
                .write_all(code.as_bytes())
                .await
                .map_err(|e| SandboxError::Other(e.to_string()))?;
        }

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });

        let timed_out = tokio::time::timeout(limits.wall_time, child.wait())
            .await
            .is_err();
        if timed_out {
            let _ = child.kill().await;
            let _ = child.wait().await;
        }

        let stdout_bytes = stdout_task.await.unwrap_or_default();
        let stderr_bytes = stderr_task.await.unwrap_or_default();
        let stdout = String::from_utf8_lossy(&stdout_bytes).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_bytes).into_owned();

        let mut events = Vec::new();
        if !stdout.is_empty() {
            events.push(ExecEvent::Stdout(stdout.clone()));
        }
        if !stderr.is_empty() {
            events.push(ExecEvent::Stderr(stderr.clone()));
        }

        Ok(ExecResult {
            stdout,
            stderr,
            exit_code: if timed_out { -1 } else { 0 },
            timed_out,
            events,
        })
    }
}

/// Backend selected by `PEERDEV_SANDBOX_BACKEND=none`: every run fails
/// with `sandbox_unavailable` rather than attempting to execute code.
pub struct NoSandbox;

#[async_trait]
impl Sandbox for NoSandbox {
    fn backend_name(&self) -> &'static str {
        "none"
    }

    async fn ensure_ready(&self) -> Result<(), SandboxError> {
        Err(SandboxError::Unavailable(
            "sandbox execution is disabled for this deployment".into(),
        ))
    }

    async fn execute(
        &self,
        _language: Language,
        _code: &str,
        _limits: Limits,
    ) -> Result<ExecResult, SandboxError> {
        Err(SandboxError::Unavailable(
            "sandbox execution is disabled for this deployment".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_parse() {
        assert_eq!(Language::parse("python"), Some(Language::Python));
        assert_eq!(Language::parse("rust"), None);
    }

    #[test]
    fn error_codes_are_bit_exact() {
        assert_eq!(SandboxError::Unavailable("x".into()).code(), "sandbox_unavailable");
        assert_eq!(
            SandboxError::UnsupportedLanguage("x".into()).code(),
            "unsupported_language"
        );
        assert_eq!(SandboxError::Other("x".into()).code(), "sandbox_error");
    }

    #[tokio::test]
    async fn no_sandbox_always_unavailable() {
        let sandbox = NoSandbox;
        let err = sandbox
            .execute(Language::Python, "print(1)", Limits::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "sandbox_unavailable");
    }
}
