//! Subprocess execution of unit actions.
//!
//! Each action runs with piped output and an enforced timeout. On Unix the
//! child leads its own process group, so a timeout kills everything the
//! action started, not just the top-level process. The group is also killed
//! when the action exits normally: nothing it started outlives it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::unit::{Action, BuildUnit};

use super::UnitExecutor;
use super::types::{ActionOutput, ExecuteConfig, ExecuteError};

/// Bytes of stdout kept in the artifact record.
const OUTPUT_TAIL_BYTES: usize = 4096;

/// Size of each read from a child's output pipe.
const READ_CHUNK: usize = 8192;

/// Runs unit actions as subprocesses.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
  root: PathBuf,
  shell: Option<String>,
  default_timeout: Duration,
}

impl ProcessExecutor {
  pub fn new(config: &ExecuteConfig) -> Self {
    Self {
      root: config.root.clone(),
      shell: config.shell.clone(),
      default_timeout: config.default_timeout,
    }
  }
}

impl UnitExecutor for ProcessExecutor {
  async fn execute(&self, unit: &BuildUnit) -> Result<ActionOutput, ExecuteError> {
    run_action(&unit.action, &self.root, self.shell.as_deref(), self.default_timeout).await
  }
}

/// Run `action` to completion or until its timeout.
///
/// # Arguments
///
/// * `action` - The action to run
/// * `root` - Directory a relative `cwd` resolves against
/// * `shell` - Shell override for script actions
/// * `default_timeout` - Timeout when the action declares none
///
/// # Returns
///
/// The trimmed stdout tail on a zero exit status.
pub async fn run_action(
  action: &Action,
  root: &Path,
  shell: Option<&str>,
  default_timeout: Duration,
) -> Result<ActionOutput, ExecuteError> {
  let timeout = action.timeout(default_timeout);
  let working_dir = action.working_dir(root);

  let mut command = if action.uses_shell() {
    let (shell_cmd, shell_args) = get_shell(shell);
    let mut command = Command::new(shell_cmd);
    command.args(shell_args).arg(&action.command);
    command
  } else {
    let mut command = Command::new(&action.command);
    command.args(&action.args);
    command
  };

  command
    .current_dir(&working_dir)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

  #[cfg(unix)]
  command.process_group(0);

  debug!(
    command = %action.display_command(),
    working_dir = ?working_dir,
    timeout_secs = timeout.as_secs(),
    "spawning process"
  );

  let mut child = command.spawn().map_err(|e| ExecuteError::Spawn {
    command: action.display_command(),
    message: e.to_string(),
  })?;

  // Captured up front: the id is gone once the child has been reaped
  let pid = child.id();
  let mut stdout_task = tokio::spawn(read_tail(child.stdout.take(), OUTPUT_TAIL_BYTES));
  let mut stderr_task = tokio::spawn(read_tail(child.stderr.take(), OUTPUT_TAIL_BYTES));

  // The deadline covers the reads too: anything the action left running can
  // hold the pipes open after the leader exits
  let finished = tokio::time::timeout(timeout, async {
    let status = child.wait().await?;
    kill_group(pid);
    let stdout = (&mut stdout_task).await.unwrap_or_default();
    let stderr = (&mut stderr_task).await.unwrap_or_default();
    Ok::<_, std::io::Error>((status, stdout, stderr))
  })
  .await;

  let (status, stdout, stderr) = match finished {
    Ok(outcome) => outcome?,
    Err(_) => {
      warn!(
        command = %action.display_command(),
        timeout_secs = timeout.as_secs(),
        "action timed out, killing"
      );
      kill_group(pid);
      if let Err(e) = child.kill().await {
        debug!(error = %e, "failed to kill process");
      }
      stdout_task.abort();
      stderr_task.abort();
      return Err(ExecuteError::Timeout {
        timeout_secs: timeout.as_secs(),
      });
    }
  };

  if !status.success() {
    let stderr = String::from_utf8_lossy(&stderr);
    if !stderr.is_empty() {
      debug!(stderr = %stderr, "command stderr");
    }
    return Err(ExecuteError::Failed { code: status.code() });
  }

  let stdout = tail(&String::from_utf8_lossy(&stdout), OUTPUT_TAIL_BYTES);
  if !stdout.is_empty() {
    debug!(stdout = %stdout, "command output");
  }

  Ok(ActionOutput { exit_code: 0, stdout })
}

/// Read `stream` to the end, keeping only its last `limit` bytes.
async fn read_tail<R: AsyncRead + Unpin>(stream: Option<R>, limit: usize) -> Vec<u8> {
  let mut kept = Vec::with_capacity(limit);
  let Some(mut stream) = stream else {
    return kept;
  };

  let mut chunk = [0u8; READ_CHUNK];
  loop {
    match stream.read(&mut chunk).await {
      Ok(0) => break,
      Ok(n) => {
        kept.extend_from_slice(&chunk[..n]);
        if kept.len() > limit {
          let excess = kept.len() - limit;
          kept.drain(..excess);
        }
      }
      Err(e) => {
        debug!(error = %e, "failed to read process output");
        break;
      }
    }
  }
  kept
}

/// Kill every process in the action's group.
///
/// The child was spawned as a group leader, so its pid is the group id. Once
/// the group is empty this is a no-op.
#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
  use rustix::process::{Pid, Signal, kill_process_group};

  if let Some(pgid) = pid.and_then(|id| Pid::from_raw(id as i32))
    && let Err(e) = kill_process_group(pgid, Signal::KILL)
    && e != rustix::io::Errno::SRCH
  {
    debug!(error = %e, "failed to kill process group");
  }
}

#[cfg(windows)]
fn kill_group(_pid: Option<u32>) {}

/// The last `max_bytes` of `text`, trimmed, cut on a char boundary.
fn tail(text: &str, max_bytes: usize) -> String {
  let text = text.trim();
  if text.len() <= max_bytes {
    return text.to_string();
  }
  let mut start = text.len() - max_bytes;
  while !text.is_char_boundary(start) {
    start += 1;
  }
  text[start..].to_string()
}

/// Get the shell command and arguments for the current platform.
///
/// Without an override this is `/bin/sh -c` on Unix and a profile-less
/// PowerShell on Windows; `$SHELL` is ignored since interactive shells may
/// source profile files.
fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  if let Some(shell) = override_shell {
    let args = if shell.contains("powershell") || shell.contains("pwsh") {
      vec!["-NoProfile".to_string(), "-Command".to_string()]
    } else if shell.contains("cmd") {
      vec!["/C".to_string()]
    } else {
      vec!["-c".to_string()]
    };
    return (shell.to_string(), args);
  }

  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    (
      "powershell.exe".to_string(),
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ],
    )
  }
}
