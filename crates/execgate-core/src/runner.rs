//! Subprocess lifecycle: spawn, capture, timeout, termination, reap.
//!
//! The child is started directly (no shell) in its own process group with
//! stdin closed. Exit, timeout and cancellation race in a single `select!`;
//! whichever resolves first decides the outcome and the other branches are
//! dropped. Termination escalates SIGTERM → grace period → SIGKILL, and the
//! whole group is swept with SIGKILL before returning so nothing the child
//! started in its group outlives the call.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::GovernorConfig;
use crate::metrics::METRICS;
use crate::obs;
use crate::outcome::{ExecutionOutcome, TerminatedBy};
use crate::output::{OutputBuffer, StreamKind};
use crate::request::CommandRequest;

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// How long to wait for the child after each SIGKILL.
const KILL_WAIT: Duration = Duration::from_millis(500);

/// Errors produced while running a process.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed waiting on child {pid:?}: {source}")]
    Wait {
        pid: Option<u32>,
        #[source]
        source: std::io::Error,
    },

    #[error("child process {pid:?} could not be reaped after {attempts} kill attempt(s)")]
    Unreapable { pid: Option<u32>, attempts: u32 },
}

/// Result type for runner operations.
pub type RunnerResult<T> = std::result::Result<T, RunnerError>;

/// Exactly what to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    pub command: String,
    pub args: Vec<String>,
    /// `None` inherits the governor's working directory.
    pub cwd: Option<PathBuf>,
}

impl From<&CommandRequest> for RunSpec {
    fn from(request: &CommandRequest) -> Self {
        Self {
            command: request.command.clone(),
            args: request.args.clone(),
            cwd: request.cwd.clone(),
        }
    }
}

/// Knobs for the runner, usually taken from [`GovernorConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    pub output_cap_bytes: usize,
    pub grace_period: Duration,
    pub kill_attempts: u32,
    pub output_drain: Duration,
}

impl From<&GovernorConfig> for RunnerConfig {
    fn from(config: &GovernorConfig) -> Self {
        Self {
            output_cap_bytes: config.output_cap_bytes,
            grace_period: config.grace_period(),
            kill_attempts: config.kill_attempts.max(1),
            output_drain: config.output_drain(),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::from(&GovernorConfig::default())
    }
}

/// Which event ended the race.
enum Race {
    Exited(std::io::Result<ExitStatus>),
    Forced(TerminatedBy),
}

/// Runs processes. Holds no per-run state beyond a spawn counter.
#[derive(Debug)]
pub struct ProcessRunner {
    config: RunnerConfig,
    spawned: AtomicU64,
}

impl ProcessRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            spawned: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Number of processes this runner has successfully spawned.
    pub fn spawn_count(&self) -> u64 {
        self.spawned.load(Ordering::SeqCst)
    }

    /// Run `spec` to completion, timeout or cancellation.
    ///
    /// Once termination has started, further cancellation has no effect.
    ///
    /// # Errors
    ///
    /// - [`RunnerError::Spawn`] when the executable cannot be started.
    /// - [`RunnerError::Wait`] when waiting on the child fails; the group is
    ///   still killed first.
    /// - [`RunnerError::Unreapable`] when the child survives every SIGKILL.
    pub async fn run(
        &self,
        spec: &RunSpec,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> RunnerResult<ExecutionOutcome> {
        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            command: spec.command.clone(),
            source,
        })?;
        self.spawned.fetch_add(1, Ordering::SeqCst);
        METRICS.inc_spawned();
        let pid = child.id();
        obs::emit_process_spawned(pid, &spec.command, spec.args.len());

        let stdout = Arc::new(OutputBuffer::new(
            StreamKind::Stdout,
            self.config.output_cap_bytes,
        ));
        let stderr = Arc::new(OutputBuffer::new(
            StreamKind::Stderr,
            self.config.output_cap_bytes,
        ));
        let readers = [
            child.stdout.take().map(|r| tokio::spawn(pump(r, stdout.clone()))),
            child.stderr.take().map(|r| tokio::spawn(pump(r, stderr.clone()))),
        ];

        let race = tokio::select! {
            status = child.wait() => Race::Exited(status),
            _ = tokio::time::sleep(timeout) => Race::Forced(TerminatedBy::Timeout),
            _ = cancel.cancelled() => Race::Forced(TerminatedBy::Cancellation),
        };

        let (status, terminated_by) = match race {
            Race::Exited(Ok(status)) => {
                let by = signal_name(&status)
                    .map(TerminatedBy::Signal)
                    .unwrap_or(TerminatedBy::None);
                (status, by)
            }
            Race::Exited(Err(source)) => {
                warn!(pid = ?pid, error = %source, "wait on child failed, killing group");
                let cleanup = self.terminate(&mut child, pid).await;
                sweep_group(pid);
                abort_readers(readers);
                return Err(wait_failure(pid, source, cleanup));
            }
            Race::Forced(reason) => {
                debug!(pid = ?pid, reason = %reason.label(), "terminating child");
                match self.terminate(&mut child, pid).await {
                    Ok(status) => (status, reason),
                    Err(e) => {
                        abort_readers(readers);
                        return Err(e);
                    }
                }
            }
        };

        sweep_group(pid);
        let duration_ms = started.elapsed().as_millis() as u64;
        obs::emit_process_terminated(pid, &terminated_by, status.code(), duration_ms);

        for reader in readers.into_iter().flatten() {
            drain(reader, self.config.output_drain).await;
        }

        let out = stdout.finish();
        let err = stderr.finish();
        Ok(ExecutionOutcome {
            exit_code: status.code(),
            stdout: out.text,
            stderr: err.text,
            stdout_truncated: out.truncated,
            stderr_truncated: err.truncated,
            duration_ms,
            terminated_by,
            pid,
        })
    }

    /// SIGTERM the group, give it the grace period, then SIGKILL up to
    /// `kill_attempts` times.
    async fn terminate(&self, child: &mut Child, pid: Option<u32>) -> RunnerResult<ExitStatus> {
        #[cfg(unix)]
        {
            signal_group(pid, nix::sys::signal::Signal::SIGTERM);
            match tokio::time::timeout(self.config.grace_period, child.wait()).await {
                Ok(Ok(status)) => return Ok(status),
                Ok(Err(e)) => debug!(pid = ?pid, error = %e, "wait after SIGTERM failed"),
                Err(_) => debug!(pid = ?pid, "grace period elapsed, escalating to SIGKILL"),
            }
        }

        for attempt in 1..=self.config.kill_attempts {
            #[cfg(unix)]
            signal_group(pid, nix::sys::signal::Signal::SIGKILL);
            if let Err(e) = child.start_kill() {
                debug!(pid = ?pid, attempt, error = %e, "start_kill failed");
            }
            match tokio::time::timeout(KILL_WAIT, child.wait()).await {
                Ok(Ok(status)) => return Ok(status),
                Ok(Err(e)) => warn!(pid = ?pid, attempt, error = %e, "wait after SIGKILL failed"),
                Err(_) => warn!(pid = ?pid, attempt, "child survived SIGKILL"),
            }
        }

        Err(RunnerError::Unreapable {
            pid,
            attempts: self.config.kill_attempts,
        })
    }
}

/// Error for a failed wait. A child that could not be reaped afterwards is
/// the more serious fault and is reported instead.
fn wait_failure(
    pid: Option<u32>,
    source: std::io::Error,
    cleanup: RunnerResult<ExitStatus>,
) -> RunnerError {
    match cleanup {
        Ok(_) => RunnerError::Wait { pid, source },
        Err(unreapable) => {
            debug!(pid = ?pid, error = %source, "wait error superseded by failed cleanup");
            unreapable
        }
    }
}

/// Copy a child pipe into its buffer until EOF.
///
/// Reading continues past the cap so the child never blocks on a full pipe.
async fn pump<R>(mut reader: R, sink: Arc<OutputBuffer>)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => sink.append(&chunk[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(error = %e, "output pipe read failed");
                break;
            }
        }
    }
}

/// Wait for a reader to hit EOF, aborting it if a pipe stays open (a
/// descendant outside the group may still hold it).
async fn drain(mut reader: JoinHandle<()>, limit: Duration) {
    if tokio::time::timeout(limit, &mut reader).await.is_err() {
        warn!(limit_ms = limit.as_millis() as u64, "output pipe still open, abandoning reader");
        reader.abort();
    }
}

fn abort_readers(readers: [Option<JoinHandle<()>>; 2]) {
    for reader in readers.into_iter().flatten() {
        reader.abort();
    }
}

#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: nix::sys::signal::Signal) {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let Some(raw) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => debug!(pid = raw, signal = ?signal, error = %e, "killpg failed"),
    }
}

/// Kill whatever is left in the child's process group.
fn sweep_group(pid: Option<u32>) {
    #[cfg(unix)]
    signal_group(pid, nix::sys::signal::Signal::SIGKILL);
    #[cfg(not(unix))]
    let _ = pid;
}

#[cfg(unix)]
fn signal_name(status: &ExitStatus) -> Option<String> {
    use std::os::unix::process::ExitStatusExt;

    status.signal().map(|raw| {
        nix::sys::signal::Signal::try_from(raw)
            .map(|s| s.as_str().to_string())
            .unwrap_or_else(|_| format!("SIG{raw}"))
    })
}

#[cfg(not(unix))]
fn signal_name(_status: &ExitStatus) -> Option<String> {
    None
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_wait_failure_prefers_unreapable() {
        use std::os::unix::process::ExitStatusExt;

        let io = || std::io::Error::other("wait failed");
        let unreapable = RunnerError::Unreapable {
            pid: Some(7),
            attempts: 3,
        };
        let err = wait_failure(Some(7), io(), Err(unreapable));
        assert!(matches!(
            err,
            RunnerError::Unreapable {
                pid: Some(7),
                attempts: 3
            }
        ));

        let err = wait_failure(Some(7), io(), Ok(ExitStatus::from_raw(9)));
        assert!(matches!(err, RunnerError::Wait { pid: Some(7), .. }));
    }

    fn runner() -> ProcessRunner {
        ProcessRunner::new(RunnerConfig {
            output_cap_bytes: 1024,
            grace_period: Duration::from_millis(200),
            kill_attempts: 3,
            output_drain: Duration::from_millis(500),
        })
    }

    fn spec(command: &str, args: &[&str]) -> RunSpec {
        RunSpec {
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            cwd: None,
        }
    }

    #[tokio::test]
    async fn test_echo_captures_stdout() {
        let r = runner();
        let out = r
            .run(
                &spec("echo", &["hi"]),
                Duration::from_secs(10),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(0));
        assert_eq!(out.stdout, "hi\n");
        assert_eq!(out.terminated_by, TerminatedBy::None);
        assert_eq!(r.spawn_count(), 1);
    }

    #[tokio::test]
    async fn test_nonzero_exit_and_stderr() {
        let out = runner()
            .run(
                &spec("sh", &["-c", "echo oops >&2; exit 3"]),
                Duration::from_secs(10),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stderr, "oops\n");
        assert_eq!(out.terminated_by, TerminatedBy::None);
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let r = runner();
        let err = r
            .run(
                &spec("/definitely/not/a/binary", &[]),
                Duration::from_secs(1),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Spawn { .. }));
        assert_eq!(r.spawn_count(), 0);
    }

    #[tokio::test]
    async fn test_external_signal_reported() {
        let out = runner()
            .run(
                &spec("sh", &["-c", "kill -SEGV $$"]),
                Duration::from_secs(10),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(out.exit_code, None);
        assert_eq!(out.terminated_by, TerminatedBy::Signal("SIGSEGV".into()));
    }

    #[tokio::test]
    async fn test_sigterm_ignored_escalates_to_kill() {
        let started = Instant::now();
        let out = runner()
            .run(
                &spec("sh", &["-c", "trap '' TERM; sleep 30"]),
                Duration::from_millis(200),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(out.terminated_by, TerminatedBy::Timeout);
        // timeout + grace + slack
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cwd_respected() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = spec("pwd", &[]);
        s.cwd = Some(dir.path().to_path_buf());
        let out = runner()
            .run(&s, Duration::from_secs(10), &CancellationToken::new())
            .await
            .unwrap();
        let printed = std::fs::canonicalize(out.stdout.trim()).unwrap();
        assert_eq!(printed, std::fs::canonicalize(dir.path()).unwrap());
    }

    #[tokio::test]
    async fn test_flood_is_capped() {
        let out = runner()
            .run(
                &spec("sh", &["-c", "head -c 100000 /dev/zero | tr '\\0' a"]),
                Duration::from_secs(10),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(out.exit_code, Some(0));
        assert!(out.stdout_truncated);
        assert_eq!(out.stdout.len(), 1024);
        assert!(!out.stderr_truncated);
    }
}
