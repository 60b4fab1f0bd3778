//! Process execution for steamcmd invocations.
//!
//! [`CommandRunner`] is the seam between the orchestrator and the operating
//! system: it receives a fully built [`Invocation`], runs it to completion and
//! reports only success or a [`RunError`]. Locking is the caller's job.

use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
#[cfg(unix)]
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::RunError;

/// Everything needed to start one steamcmd process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Absolute path of the executable.
    pub program: PathBuf,
    /// Arguments, already terminated with `+quit`.
    pub args: Vec<String>,
    /// Working directory for the child.
    pub working_dir: PathBuf,
    /// Inherit stdout/stderr instead of discarding them.
    pub stream_output: bool,
    /// Kill the child after this long.
    pub timeout: Option<Duration>,
}

/// Runs an [`Invocation`] to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn execute(&self, invocation: &Invocation) -> Result<(), RunError>;
}

/// How long to wait for a killed process group to disappear.
#[cfg(unix)]
const GROUP_EXIT_GRACE: Duration = Duration::from_secs(5);

/// Runs invocations as real child processes.
///
/// On Unix each steamcmd runs in its own process group. `steamcmd.sh` forks
/// the real client rather than exec'ing it, so the whole group is killed and
/// waited for before `execute` returns, and also when the call is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn execute(&self, invocation: &Invocation) -> Result<(), RunError> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        if invocation.stream_output {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }

        debug!(
            program = %invocation.program.display(),
            args = ?redacted_args(&invocation.args),
            "Spawning steamcmd"
        );

        let mut child = GroupChild::spawn(&mut cmd).map_err(|source| RunError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        let status = child.wait(invocation.timeout).await?;

        if status.success() {
            info!("steamcmd finished successfully");
            return Ok(());
        }

        match status.code() {
            Some(code) => {
                warn!("steamcmd exited with status {}", code);
                Err(RunError::ExitStatus { code })
            }
            None => Err(RunError::Terminated {
                status: status.to_string(),
            }),
        }
    }
}

// ============================================================================
// Process Group Handling
// ============================================================================

/// A spawned steamcmd that takes its whole process group down with it.
struct GroupChild {
    child: Child,
    /// Group id; equal to the child's pid because it leads its own group.
    #[cfg_attr(not(unix), allow(dead_code))]
    pgid: Option<i32>,
    settled: bool,
}

impl GroupChild {
    fn spawn(cmd: &mut Command) -> io::Result<Self> {
        let child = cmd.spawn()?;
        let pgid = child.id().and_then(|id| i32::try_from(id).ok());
        Ok(Self {
            child,
            pgid,
            settled: false,
        })
    }

    /// Waits for the child, then makes sure nothing else from its group survives.
    async fn wait(&mut self, limit: Option<Duration>) -> Result<ExitStatus, RunError> {
        let waited = match limit {
            Some(limit) => {
                let waited = timeout(limit, self.child.wait()).await;
                match waited {
                    Ok(status) => status,
                    Err(_) => {
                        warn!("steamcmd exceeded {:?}, killing it", limit);
                        self.shutdown().await;
                        return Err(RunError::TimedOut(limit));
                    }
                }
            }
            None => self.child.wait().await,
        };

        // Leftover group members still belong to this invocation.
        self.shutdown().await;
        waited.map_err(RunError::Wait)
    }

    /// Kills the group, reaps the direct child and waits for the group to vanish.
    async fn shutdown(&mut self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid {
            process_group::kill(pgid);
        }

        if let Ok(None) = self.child.try_wait() {
            if let Err(e) = self.child.start_kill() {
                warn!("Failed to kill steamcmd: {}", e);
            }
        }
        if let Err(e) = self.child.wait().await {
            warn!("Failed to reap steamcmd: {}", e);
        }

        #[cfg(unix)]
        if let Some(pgid) = self.pgid {
            let deadline = Instant::now() + GROUP_EXIT_GRACE;
            while process_group::is_alive(pgid) && Instant::now() < deadline {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            if process_group::is_alive(pgid) {
                warn!("steamcmd process group {} still present after kill", pgid);
            }
        }

        self.settled = true;
    }
}

impl Drop for GroupChild {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        #[cfg(unix)]
        if let Some(pgid) = self.pgid {
            debug!("steamcmd call dropped, killing process group {}", pgid);
            process_group::kill(pgid);

            // Blocking here keeps the lock held until the group is gone.
            let deadline = Instant::now() + GROUP_EXIT_GRACE;
            while Instant::now() < deadline {
                // Reap the leader so it does not linger as a zombie member.
                let _ = self.child.try_wait();
                if !process_group::is_alive(pgid) {
                    return;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            warn!("steamcmd process group {} still present after kill", pgid);
        }
    }
}

#[cfg(unix)]
mod process_group {
    /// Sends SIGKILL to every process in the group.
    pub(super) fn kill(pgid: i32) {
        // ESRCH for a group that is already gone is ignored.
        unsafe {
            libc::killpg(pgid, libc::SIGKILL);
        }
    }

    /// True while any process of the group, zombies included, still exists.
    pub(super) fn is_alive(pgid: i32) -> bool {
        unsafe { libc::killpg(pgid, 0) == 0 }
    }
}

/// Hides the password that follows `+login <user>` before logging.
fn redacted_args(args: &[String]) -> Vec<&str> {
    args.iter()
        .enumerate()
        .map(|(i, arg)| {
            let is_password = i >= 2
                && args[i - 2] == "+login"
                && !args[i - 1].starts_with('+')
                && !arg.starts_with('+');
            if is_password {
                "<redacted>"
            } else {
                arg.as_str()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_redacted_args_hides_password() {
        let a = args(&["+login", "bob", "hunter2", "+app_update", "42", "+quit"]);
        assert_eq!(
            redacted_args(&a),
            vec!["+login", "bob", "<redacted>", "+app_update", "42", "+quit"]
        );
    }

    #[test]
    fn test_redacted_args_keeps_anonymous_script() {
        let a = args(&["+login", "anonymous", "+force_install_dir", "/x", "+quit"]);
        assert_eq!(redacted_args(&a), a.iter().map(|s| s.as_str()).collect::<Vec<_>>());
    }

    #[cfg(unix)]
    mod unix {
        use super::super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::path::Path;
        use tempfile::TempDir;

        fn write_script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("steamcmd.sh");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn invocation(dir: &Path, program: PathBuf, args: &[&str]) -> Invocation {
            Invocation {
                program,
                args: args.iter().map(|s| s.to_string()).collect(),
                working_dir: dir.to_path_buf(),
                stream_output: false,
                timeout: None,
            }
        }

        #[tokio::test]
        async fn test_success() {
            let temp_dir = TempDir::new().unwrap();
            let script = write_script(temp_dir.path(), "exit 0");

            let result = ProcessRunner
                .execute(&invocation(temp_dir.path(), script, &["+quit"]))
                .await;
            assert!(result.is_ok());
        }

        #[tokio::test]
        async fn test_exit_code_is_preserved() {
            let temp_dir = TempDir::new().unwrap();
            let script = write_script(temp_dir.path(), "exit 8");

            let err = ProcessRunner
                .execute(&invocation(temp_dir.path(), script, &["+quit"]))
                .await
                .unwrap_err();
            assert_eq!(err.exit_code(), Some(8));
        }

        #[tokio::test]
        async fn test_args_and_working_dir() {
            let temp_dir = TempDir::new().unwrap();
            let script = write_script(temp_dir.path(), r#"echo "$@" > args.txt; pwd > cwd.txt"#);

            ProcessRunner
                .execute(&invocation(
                    temp_dir.path(),
                    script,
                    &["+login", "anonymous", "+quit"],
                ))
                .await
                .unwrap();

            let recorded = std::fs::read_to_string(temp_dir.path().join("args.txt")).unwrap();
            assert_eq!(recorded.trim(), "+login anonymous +quit");

            let cwd = std::fs::read_to_string(temp_dir.path().join("cwd.txt")).unwrap();
            let expected = temp_dir.path().canonicalize().unwrap();
            assert_eq!(Path::new(cwd.trim()).canonicalize().unwrap(), expected);
        }

        #[tokio::test]
        async fn test_missing_program_is_spawn_error() {
            let temp_dir = TempDir::new().unwrap();
            let missing = temp_dir.path().join("steamcmd.sh");

            let err = ProcessRunner
                .execute(&invocation(temp_dir.path(), missing, &["+quit"]))
                .await
                .unwrap_err();
            assert!(matches!(err, RunError::Spawn { .. }));
        }

        #[tokio::test]
        async fn test_timeout_kills_child() {
            let temp_dir = TempDir::new().unwrap();
            let script = write_script(temp_dir.path(), "sleep 30");

            let mut inv = invocation(temp_dir.path(), script, &["+quit"]);
            inv.timeout = Some(Duration::from_millis(200));

            let started = std::time::Instant::now();
            let err = ProcessRunner.execute(&inv).await.unwrap_err();
            assert!(matches!(err, RunError::TimedOut(_)));
            assert!(started.elapsed() < Duration::from_secs(10));
        }

        /// Launcher that forks a client which writes into the tool dir later.
        const FORKING_LAUNCHER: &str = "sh -c 'sleep 1; echo still-writing > cache.lock'";

        #[tokio::test]
        async fn test_timeout_kills_forked_client() {
            let temp_dir = TempDir::new().unwrap();
            let script = write_script(temp_dir.path(), FORKING_LAUNCHER);

            let mut inv = invocation(temp_dir.path(), script, &["+quit"]);
            inv.timeout = Some(Duration::from_millis(200));

            let err = ProcessRunner.execute(&inv).await.unwrap_err();
            assert!(matches!(err, RunError::TimedOut(_)));

            tokio::time::sleep(Duration::from_millis(1500)).await;
            assert!(!temp_dir.path().join("cache.lock").exists());
        }

        #[tokio::test]
        async fn test_background_leftovers_are_killed_on_exit() {
            let temp_dir = TempDir::new().unwrap();
            let script = write_script(
                temp_dir.path(),
                "(sleep 1; echo late > cache.lock) &\nexit 0",
            );

            ProcessRunner
                .execute(&invocation(temp_dir.path(), script, &["+quit"]))
                .await
                .unwrap();

            tokio::time::sleep(Duration::from_millis(1500)).await;
            assert!(!temp_dir.path().join("cache.lock").exists());
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
        async fn test_dropped_call_kills_forked_client() {
            let temp_dir = TempDir::new().unwrap();
            let script = write_script(temp_dir.path(), FORKING_LAUNCHER);
            let inv = invocation(temp_dir.path(), script, &["+quit"]);

            let handle = tokio::spawn(async move { ProcessRunner.execute(&inv).await });
            tokio::time::sleep(Duration::from_millis(200)).await;
            handle.abort();
            assert!(handle.await.unwrap_err().is_cancelled());

            tokio::time::sleep(Duration::from_millis(1500)).await;
            assert!(!temp_dir.path().join("cache.lock").exists());
        }
    }
}
