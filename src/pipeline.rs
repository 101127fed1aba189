//! A request-scoped chain of at most two processes (extractor, optional
//! transcoder) whose final stdout is relayed to the http response.

use std::{process::Stdio, time::Duration};

use bytes::Bytes;
use futures::{stream::BoxStream, StreamExt};
use tokio::process::{ChildStdout, Command};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::{
  process::{ProcessHandle, Stage},
  Error, Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
  Validating,
  Extracting,
  Transcoding,
  Relaying,
  Done,
  Failed,
}

impl PipelineState {
  pub fn is_terminal(self) -> bool {
    matches!(self, PipelineState::Done | PipelineState::Failed)
  }
}

pub struct Pipeline {
  source: String,
  stages: Vec<ProcessHandle>,
  state: PipelineState,
  idle_timeout: Duration,
}

impl Pipeline {
  pub fn new(source: impl Into<String>, idle_timeout: Duration) -> Self {
    Self {
      source: source.into(),
      stages: Vec::with_capacity(2),
      state: PipelineState::Validating,
      idle_timeout,
    }
  }

  #[allow(unused)]
  pub fn pids(&self) -> Vec<u32> {
    self.stages.iter().filter_map(ProcessHandle::pid).collect()
  }

  pub fn spawn_extractor(mut self, cmd: Command) -> Result<Self> {
    self.transition(PipelineState::Extracting);
    match ProcessHandle::spawn(Stage::Extractor, cmd, Stdio::null()) {
      Ok(handle) => {
        self.stages.push(handle);
        Ok(self)
      }
      Err(e) => Err(self.fail(e)),
    }
  }

  /// Connects the extractor's stdout straight to the transcoder's stdin.
  /// The bytes between the two never pass through this process.
  pub fn spawn_transcoder(mut self, cmd: Command) -> Result<Self> {
    self.transition(PipelineState::Transcoding);
    let stdin = match self.last_stdout().and_then(into_stdio) {
      Ok(stdin) => stdin,
      Err(e) => return Err(self.fail(e)),
    };

    match ProcessHandle::spawn(Stage::Transcoder, cmd, stdin) {
      Ok(handle) => {
        self.stages.push(handle);
        Ok(self)
      }
      Err(e) => Err(self.fail(e)),
    }
  }

  /// Waits for the first chunk of output. A pipeline failing before it
  /// produced anything is reported as an error, so the caller can still
  /// answer with a proper status code.
  pub async fn start(mut self) -> Result<Relay> {
    let stdout = match self.last_stdout() {
      Ok(stdout) => stdout,
      Err(e) => return Err(self.fail(e)),
    };

    let mut relay = Relay {
      reader: ReaderStream::new(stdout),
      pipeline: self,
      pending: None,
      sent: 0,
    };

    match relay.next_chunk().await {
      Ok(Some(bytes)) => {
        relay.pipeline.transition(PipelineState::Relaying);
        relay.pending = Some(bytes);
        Ok(relay)
      }
      Ok(None) => {
        relay.pipeline.transition(PipelineState::Relaying);
        relay.finish().await?;
        Ok(relay)
      }
      Err(e) => Err(relay.pipeline.fail(e)),
    }
  }

  fn last_stdout(&mut self) -> Result<ChildStdout> {
    self
      .stages
      .last_mut()
      .ok_or_else(|| Error::ExtractionFailed("no process in pipeline".into()))?
      .take_stdout()
  }

  fn transition(&mut self, next: PipelineState) {
    debug!(source = %self.source, "pipeline {:?} -> {:?}", self.state, next);
    self.state = next;
  }

  fn fail(&mut self, err: Error) -> Error {
    self.transition(PipelineState::Failed);
    err
  }

  // a failure anywhere in a two-stage pipeline is a transcode failure
  fn failure(&self, stage: Stage, detail: String) -> Error {
    if self.stages.len() > 1 {
      Stage::Transcoder.error(format!("{stage}: {detail}"))
    } else {
      stage.error(detail)
    }
  }

  async fn reconcile(&mut self) -> Result<()> {
    let mut failure = None;

    for i in 0..self.stages.len() {
      let stage = self.stages[i].stage();
      let waited =
        tokio::time::timeout(self.idle_timeout, self.stages[i].wait()).await;

      let detail = match waited {
        Ok(Ok(exit)) if exit.success() => continue,
        Ok(Ok(exit)) => exit.detail(),
        Ok(Err(e)) => e.to_string(),
        Err(_) => "did not exit after closing its output".to_string(),
      };

      failure.get_or_insert_with(|| self.failure(stage, detail));
    }

    match failure {
      Some(err) => Err(err),
      None => Ok(()),
    }
  }
}

fn into_stdio(stdout: ChildStdout) -> Result<Stdio> {
  let stdio: Stdio = stdout.try_into()?;
  Ok(stdio)
}

/// The running pipeline plus its output, bound to one response.
pub struct Relay {
  pipeline: Pipeline,
  reader: ReaderStream<ChildStdout>,
  pending: Option<Bytes>,
  sent: usize,
}

impl Relay {
  pub fn state(&self) -> PipelineState {
    self.pipeline.state
  }

  #[allow(unused)]
  pub fn pids(&self) -> Vec<u32> {
    self.pipeline.pids()
  }

  async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
    let idle = self.pipeline.idle_timeout;
    let last = self
      .pipeline
      .stages
      .last()
      .map(ProcessHandle::stage)
      .unwrap_or(Stage::Extractor);

    match tokio::time::timeout(idle, self.reader.next()).await {
      Ok(Some(Ok(bytes))) => Ok(Some(bytes)),
      Ok(Some(Err(e))) => Err(self.pipeline.failure(last, e.to_string())),
      Ok(None) => Ok(None),
      Err(_) => Err(self.pipeline.failure(
        last,
        format!("no output for {} seconds", idle.as_secs()),
      )),
    }
  }

  async fn finish(&mut self) -> Result<()> {
    match self.pipeline.reconcile().await {
      Ok(()) => {
        self.pipeline.transition(PipelineState::Done);
        info!(
          source = %self.pipeline.source,
          "relayed {} bytes",
          self.sent
        );
        Ok(())
      }
      Err(e) => Err(self.pipeline.fail(e)),
    }
  }

  /// Turns the relay into a response body. An error item ends the stream,
  /// which makes the http layer cut the connection.
  pub fn into_stream(self) -> BoxStream<'static, Result<Bytes>> {
    futures::stream::unfold(self, |mut relay| async move {
      if let Some(bytes) = relay.pending.take() {
        relay.sent += bytes.len();
        return Some((Ok(bytes), relay));
      }

      if relay.state().is_terminal() {
        return None;
      }

      let result = match relay.next_chunk().await {
        Ok(Some(bytes)) => {
          relay.sent += bytes.len();
          return Some((Ok(bytes), relay));
        }
        Ok(None) => relay.finish().await,
        Err(e) => Err(relay.pipeline.fail(e)),
      };

      match result {
        Ok(()) => None,
        Err(e) => {
          warn!(
            source = %relay.pipeline.source,
            "stream truncated after {} bytes: {}",
            relay.sent,
            e
          );
          Some((Err(e), relay))
        }
      }
    })
    .boxed()
  }
}

impl Drop for Relay {
  fn drop(&mut self) {
    if self.pipeline.state.is_terminal() {
      return;
    }

    info!(
      source = %self.pipeline.source,
      "client went away after {} bytes, terminating pipeline",
      self.sent
    );
    self.pipeline.transition(PipelineState::Failed);
    // the process handles are dropped with the pipeline, killing them
  }
}

#[cfg(test)]
mod test {
  use std::path::Path;

  use futures::TryStreamExt;

  use super::*;
  use crate::test_util::{script, wait_gone};

  const IDLE: Duration = Duration::from_secs(10);

  fn sh(path: &Path) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg(path);
    cmd
  }

  async fn collect(relay: Relay) -> (Vec<u8>, Option<Error>) {
    let mut stream = relay.into_stream();
    let mut out = Vec::new();
    while let Some(item) = stream.next().await {
      match item {
        Ok(bytes) => out.extend_from_slice(&bytes),
        Err(e) => return (out, Some(e)),
      }
    }
    (out, None)
  }

  #[tokio::test]
  async fn test_relays_every_byte() {
    let dir = tempfile::tempdir().unwrap();
    // large enough to span many pipe buffers
    let extractor = script(&dir, "extractor", "head -c 1000003 /dev/zero");

    let relay = Pipeline::new("test", IDLE)
      .spawn_extractor(sh(&extractor))
      .unwrap()
      .start()
      .await
      .unwrap();
    assert_eq!(relay.state(), PipelineState::Relaying);

    let (out, err) = collect(relay).await;
    assert!(err.is_none());
    assert_eq!(out.len(), 1000003);
  }

  #[tokio::test]
  async fn test_transcoder_reads_extractor_output() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = script(&dir, "extractor", "printf 'hello pipeline'");
    let transcoder = script(&dir, "transcoder", "exec tr 'a-z' 'A-Z'");

    let relay = Pipeline::new("test", IDLE)
      .spawn_extractor(sh(&extractor))
      .unwrap()
      .spawn_transcoder(sh(&transcoder))
      .unwrap()
      .start()
      .await
      .unwrap();

    let bytes: Vec<Bytes> = relay.into_stream().try_collect().await.unwrap();
    assert_eq!(bytes.concat(), b"HELLO PIPELINE");
  }

  #[tokio::test]
  async fn test_failure_before_first_byte() {
    let dir = tempfile::tempdir().unwrap();
    let extractor =
      script(&dir, "extractor", "echo 'ERROR: unavailable' >&2; exit 1");

    let err = Pipeline::new("test", IDLE)
      .spawn_extractor(sh(&extractor))
      .unwrap()
      .start()
      .await
      .err()
      .unwrap();
    assert!(
      matches!(&err, Error::ExtractionFailed(msg) if msg.contains("unavailable"))
    );
  }

  #[tokio::test]
  async fn test_transcode_failure_before_first_byte() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = script(&dir, "extractor", "printf data");
    let transcoder = script(&dir, "transcoder", "cat > /dev/null; exit 2");

    let err = Pipeline::new("test", IDLE)
      .spawn_extractor(sh(&extractor))
      .unwrap()
      .spawn_transcoder(sh(&transcoder))
      .unwrap()
      .start()
      .await
      .err()
      .unwrap();
    assert!(matches!(err, Error::TranscodeFailed(_)));
  }

  #[tokio::test]
  async fn test_failure_after_first_byte_truncates() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = script(&dir, "extractor", "printf partial; exit 1");

    let relay = Pipeline::new("test", IDLE)
      .spawn_extractor(sh(&extractor))
      .unwrap()
      .start()
      .await
      .unwrap();

    let (out, err) = collect(relay).await;
    assert_eq!(out, b"partial");
    assert!(matches!(err, Some(Error::ExtractionFailed(_))));
  }

  #[tokio::test]
  async fn test_empty_successful_output() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = script(&dir, "extractor", "exit 0");

    let relay = Pipeline::new("test", IDLE)
      .spawn_extractor(sh(&extractor))
      .unwrap()
      .start()
      .await
      .unwrap();
    assert_eq!(relay.state(), PipelineState::Done);

    let (out, err) = collect(relay).await;
    assert!(out.is_empty());
    assert!(err.is_none());
  }

  #[tokio::test]
  async fn test_idle_timeout_fails_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = script(&dir, "extractor", "exec sleep 30");

    let err = Pipeline::new("test", Duration::from_millis(200))
      .spawn_extractor(sh(&extractor))
      .unwrap()
      .start()
      .await
      .err()
      .unwrap();
    assert!(matches!(err, Error::ExtractionFailed(_)));
  }

  #[cfg(target_os = "linux")]
  #[tokio::test]
  async fn test_disconnect_terminates_processes() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = script(&dir, "extractor", "printf hello; exec sleep 30");
    let transcoder = script(&dir, "transcoder", "exec cat");

    let relay = Pipeline::new("test", IDLE)
      .spawn_extractor(sh(&extractor))
      .unwrap()
      .spawn_transcoder(sh(&transcoder))
      .unwrap()
      .start()
      .await
      .unwrap();

    let pids = relay.pids();
    assert_eq!(pids.len(), 2);

    let mut stream = relay.into_stream();
    let first = stream.next().await.unwrap().unwrap();
    assert!(b"hello".starts_with(&first));

    // the client disconnecting drops the response body
    drop(stream);

    for pid in pids {
      assert!(
        wait_gone(pid, Duration::from_secs(5)).await,
        "process {pid} outlived its request"
      );
    }
  }
}
