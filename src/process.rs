use std::{fmt, process::Stdio};

use itertools::Itertools;
use tokio::{
  io::{AsyncBufReadExt, AsyncRead, BufReader},
  process::{Child, ChildStdout, Command},
  task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{util::tail_lines, Error, Result};

// lines of stderr kept for error reporting
const STDERR_TAIL_LINES: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
  Extractor,
  Transcoder,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Stage::Extractor => f.write_str("extractor"),
      Stage::Transcoder => f.write_str("transcoder"),
    }
  }
}

pub struct Exit {
  pub status: std::process::ExitStatus,
  pub stderr: String,
}

impl Exit {
  pub fn success(&self) -> bool {
    self.status.success()
  }

  /// Human readable failure detail: the status plus the stderr tail.
  pub fn detail(&self) -> String {
    let tail = tail_lines(&self.stderr, STDERR_TAIL_LINES);
    if tail.is_empty() {
      self.status.to_string()
    } else {
      format!("{}: {}", self.status, tail)
    }
  }
}

/// An external process owned by a single request.
///
/// Stdout is left for the caller to take, stderr is drained in the
/// background so a chatty process can never stall on a full pipe. The
/// exit status can be collected once. Dropping a handle whose process is
/// still running kills and reaps it.
pub struct ProcessHandle {
  stage: Stage,
  pid: Option<u32>,
  child: Option<Child>,
  stderr: Option<JoinHandle<String>>,
}

impl ProcessHandle {
  pub fn spawn(stage: Stage, mut cmd: Command, stdin: Stdio) -> Result<Self> {
    let cmd_line = describe(&cmd);
    cmd
      .stdin(stdin)
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
      stage.error(format!("failed to spawn `{cmd_line}`: {e}"))
    })?;
    let pid = child.id();
    debug!(%stage, ?pid, "spawned `{}`", cmd_line);

    let stderr = child
      .stderr
      .take()
      .map(|stderr| tokio::spawn(drain_stderr(stage, stderr)));

    Ok(Self {
      stage,
      pid,
      child: Some(child),
      stderr,
    })
  }

  pub fn stage(&self) -> Stage {
    self.stage
  }

  #[allow(unused)]
  pub fn pid(&self) -> Option<u32> {
    self.pid
  }

  pub fn take_stdout(&mut self) -> Result<ChildStdout> {
    self
      .child
      .as_mut()
      .and_then(|child| child.stdout.take())
      .ok_or_else(|| self.stage.error("stdout not captured".to_string()))
  }

  /// Waits for the process to exit. Only the first call yields a status.
  pub async fn wait(&mut self) -> Result<Exit> {
    let mut child = self
      .child
      .take()
      .ok_or_else(|| self.stage.error("exit status already taken".into()))?;

    let status = child.wait().await?;
    let stderr = match self.stderr.take() {
      Some(task) => task.await.unwrap_or_default(),
      None => String::new(),
    };
    debug!(stage = %self.stage, pid = ?self.pid, %status, "process exited");

    Ok(Exit { status, stderr })
  }
}

impl Drop for ProcessHandle {
  fn drop(&mut self) {
    let Some(mut child) = self.child.take() else {
      return;
    };

    // already exited, nothing to reap
    if let Ok(Some(_)) = child.try_wait() {
      return;
    }

    debug!(stage = %self.stage, pid = ?self.pid, "terminating process");
    if let Err(e) = child.start_kill() {
      warn!(stage = %self.stage, "failed to kill process: {}", e);
    }

    // reap eagerly when a runtime is around, kill_on_drop covers the rest
    if let Ok(rt) = tokio::runtime::Handle::try_current() {
      rt.spawn(async move {
        let _ = child.wait().await;
      });
    }
  }
}

impl Stage {
  pub fn error(self, detail: String) -> Error {
    match self {
      Stage::Extractor => Error::ExtractionFailed(detail),
      Stage::Transcoder => Error::TranscodeFailed(detail),
    }
  }
}

async fn drain_stderr(stage: Stage, stderr: impl AsyncRead + Unpin) -> String {
  let mut lines = BufReader::new(stderr).lines();
  let mut collected = String::new();

  while let Ok(Some(line)) = lines.next_line().await {
    if line.starts_with("ERROR:") {
      warn!(%stage, "{}", line);
    } else {
      debug!(%stage, "{}", line);
    }
    collected.push_str(&line);
    collected.push('\n');
  }

  collected
}

fn describe(cmd: &Command) -> String {
  let cmd = cmd.as_std();
  std::iter::once(cmd.get_program())
    .chain(cmd.get_args())
    .map(|arg| arg.to_string_lossy())
    .join(" ")
}

#[cfg(test)]
mod test {
  use tokio::io::AsyncReadExt;

  use super::*;

  fn sh(script: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(script);
    cmd
  }

  #[tokio::test]
  async fn test_exit_status_collected_once() {
    let mut handle = ProcessHandle::spawn(
      Stage::Extractor,
      sh("echo 'ERROR: video unavailable' >&2; exit 3"),
      Stdio::null(),
    )
    .unwrap();

    let exit = handle.wait().await.unwrap();
    assert!(!exit.success());
    assert!(exit.detail().contains("ERROR: video unavailable"));

    assert!(matches!(
      handle.wait().await,
      Err(Error::ExtractionFailed(_))
    ));
  }

  #[tokio::test]
  async fn test_stdout_is_captured() {
    let mut handle =
      ProcessHandle::spawn(Stage::Transcoder, sh("printf hello"), Stdio::null())
        .unwrap();

    let mut out = String::new();
    handle
      .take_stdout()
      .unwrap()
      .read_to_string(&mut out)
      .await
      .unwrap();
    assert_eq!(out, "hello");
    assert!(handle.wait().await.unwrap().success());
  }

  #[tokio::test]
  async fn test_spawn_failure_maps_to_stage() {
    let cmd = Command::new("/nonexistent/transcoder-binary");
    let err = ProcessHandle::spawn(Stage::Transcoder, cmd, Stdio::null())
      .err()
      .unwrap();
    assert!(matches!(err, Error::TranscodeFailed(_)));
  }

  #[test]
  fn test_describe() {
    let mut cmd = Command::new("yt-dlp");
    cmd.arg("-j").arg("https://youtu.be/x");
    assert_eq!(describe(&cmd), "yt-dlp -j https://youtu.be/x");
  }
}
