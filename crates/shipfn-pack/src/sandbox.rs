//! Disposable build containers.
//!
//! A [`Sandbox`] owns a scratch directory mounted at `/var/task` and a
//! uniquely named container. Dropping it removes both, whichever way the
//! build ended.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::BuildError;

/// Mount point of the sandbox workdir inside the container.
pub const CONTAINER_WORKDIR: &str = "/var/task";

/// Value is 315532800 = January 1, 1980 00:00:00 UTC (ZIP epoch).
const SOURCE_DATE_EPOCH: &str = "315532800";

/// What to run inside a sandbox container.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub container: String,
    pub image: String,
    /// Host directory mounted at [`CONTAINER_WORKDIR`].
    pub workdir: PathBuf,
    pub script: String,
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

/// Exit status and combined stdout/stderr of a container run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub code: i32,
    pub output: String,
}

/// A container runtime able to execute a script in a given image.
///
/// `run` returns `Ok` whenever the script itself ran, whatever its exit code;
/// `Err(SandboxUnavailable)` means the container never started.
pub trait ContainerEngine: Send + Sync {
    fn name(&self) -> &str;
    fn run(&self, spec: &RunSpec) -> Result<RunOutput, BuildError>;
    /// Force-remove a container. Must tolerate containers that no longer exist.
    fn remove(&self, container: &str);
}

/// `docker`-compatible CLI engine (also works with `podman`).
#[derive(Debug, Clone)]
pub struct DockerEngine {
    binary: String,
}

impl DockerEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

/// docker's own exit code when the daemon or `docker run` itself failed.
const DOCKER_RUN_FAILED: i32 = 125;

impl ContainerEngine for DockerEngine {
    fn name(&self) -> &str {
        &self.binary
    }

    fn run(&self, spec: &RunSpec) -> Result<RunOutput, BuildError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("run")
            .arg("--rm")
            .arg("--name")
            .arg(&spec.container)
            .arg("-v")
            .arg(format!("{}:{CONTAINER_WORKDIR}", spec.workdir.display()))
            .arg("-w")
            .arg(CONTAINER_WORKDIR)
            .arg("--entrypoint")
            .arg("/bin/sh");
        for (key, value) in &spec.env {
            cmd.arg("-e").arg(format!("{key}={value}"));
        }
        cmd.arg(&spec.image)
            .arg("-c")
            .arg(&spec.script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("Running: {:?}", cmd);

        let unavailable = |reason: String| BuildError::SandboxUnavailable {
            engine: self.binary.clone(),
            reason,
        };

        let mut child = cmd
            .spawn()
            .map_err(|e| unavailable(format!("failed to execute {}: {e}", self.binary)))?;

        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = Instant::now() + spec.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    warn!(container = %spec.container, "sandbox timed out, killing");
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(BuildError::Timeout {
                        secs: spec.timeout.as_secs(),
                    });
                }
                Ok(None) => thread::sleep(Duration::from_millis(100)),
                Err(e) => return Err(unavailable(format!("failed to wait for container: {e}"))),
            }
        };

        let stdout = stdout.and_then(|h| h.join().ok()).unwrap_or_default();
        let stderr = stderr.and_then(|h| h.join().ok()).unwrap_or_default();
        let code = status.code().unwrap_or(-1);

        if code == DOCKER_RUN_FAILED {
            return Err(unavailable(stderr.trim().to_string()));
        }

        let mut output = stdout;
        if !stderr.is_empty() {
            if !output.is_empty() {
                output.push('\n');
            }
            output.push_str(&stderr);
        }
        Ok(RunOutput { code, output })
    }

    fn remove(&self, container: &str) {
        let result = Command::new(&self.binary)
            .args(["rm", "-f", container])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(e) = result {
            debug!(container, error = %e, "container removal failed");
        }
    }
}

fn drain<R: Read + Send + 'static>(mut reader: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Scoped build environment: scratch dir plus a container name.
pub struct Sandbox<'e> {
    engine: &'e dyn ContainerEngine,
    container: String,
    workdir: TempDir,
}

impl<'e> Sandbox<'e> {
    pub fn acquire(engine: &'e dyn ContainerEngine) -> Result<Self, BuildError> {
        let workdir = tempfile::Builder::new()
            .prefix("shipfn-build-")
            .tempdir()
            .map_err(BuildError::Workspace)?;
        let container = format!("shipfn-build-{}", uuid::Uuid::new_v4().simple());
        debug!(container = %container, workdir = %workdir.path().display(), "sandbox acquired");
        Ok(Self {
            engine,
            container,
            workdir,
        })
    }

    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Run `script` in `image` with the workdir mounted.
    pub fn run(&self, image: &str, script: &str, timeout: Duration) -> Result<RunOutput, BuildError> {
        let spec = RunSpec {
            container: self.container.clone(),
            image: image.to_string(),
            workdir: self.workdir.path().to_path_buf(),
            script: script.to_string(),
            env: vec![
                ("SOURCE_DATE_EPOCH".to_string(), SOURCE_DATE_EPOCH.to_string()),
                ("PYTHONDONTWRITEBYTECODE".to_string(), "1".to_string()),
                ("npm_config_update_notifier".to_string(), "false".to_string()),
            ],
            timeout,
        };
        self.engine.run(&spec)
    }
}

impl Drop for Sandbox<'_> {
    fn drop(&mut self) {
        self.engine.remove(&self.container);
        debug!(container = %self.container, "sandbox torn down");
        // workdir is removed by TempDir's own Drop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingEngine {
        removed: Mutex<Vec<String>>,
    }

    impl ContainerEngine for RecordingEngine {
        fn name(&self) -> &str {
            "fake"
        }

        fn run(&self, spec: &RunSpec) -> Result<RunOutput, BuildError> {
            assert!(spec.env.iter().any(|(k, v)| k == "SOURCE_DATE_EPOCH" && v == "315532800"));
            Ok(RunOutput {
                code: 0,
                output: String::new(),
            })
        }

        fn remove(&self, container: &str) {
            self.removed.lock().unwrap().push(container.to_string());
        }
    }

    #[test]
    fn test_drop_tears_down_container_and_workdir() {
        let engine = RecordingEngine::default();
        let (name, dir) = {
            let sandbox = Sandbox::acquire(&engine).unwrap();
            sandbox.run("img", "true", Duration::from_secs(1)).unwrap();
            (sandbox.container().to_string(), sandbox.workdir().to_path_buf())
        };
        assert!(!dir.exists());
        assert_eq!(*engine.removed.lock().unwrap(), vec![name]);
    }

    #[test]
    fn test_container_names_are_unique() {
        let engine = RecordingEngine::default();
        let a = Sandbox::acquire(&engine).unwrap();
        let b = Sandbox::acquire(&engine).unwrap();
        assert_ne!(a.container(), b.container());
        assert!(a.container().starts_with("shipfn-build-"));
    }

    #[test]
    fn test_missing_engine_binary_is_sandbox_unavailable() {
        let engine = DockerEngine::new("shipfn-no-such-container-engine");
        let sandbox = Sandbox::acquire(&engine).unwrap();
        let err = sandbox.run("img", "true", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, BuildError::SandboxUnavailable { .. }), "got {err}");
    }
}
