use std::{process::Stdio, time::Duration};

use http_types::Url;
use serde::{de::DeserializeOwned, Deserialize};
use tokio::{io::AsyncReadExt, process::Command};
use tracing::debug;

use crate::{
  config::Tool,
  process::{ProcessHandle, Stage},
  request::{ExtractionRequest, OutputFormat},
  util::redact_proxy,
  video::PLACEHOLDER_TITLE,
  Error, Result,
};

use super::DirectLink;

// run yt-dlp command line, either for its json description of a video or
// for the media bytes themselves. requires the yt-dlp executable.
#[derive(Clone, Debug)]
pub struct Ytdlp {
  tool: Tool,
  proxy: Option<String>,
  timeout: Duration,
}

#[derive(Deserialize, Debug, Default)]
pub struct VideoInfo {
  pub title: Option<String>,
  /// Set when yt-dlp resolved the format selector to a single format.
  pub url: Option<String>,
  pub duration: Option<f64>,
  pub thumbnail: Option<String>,
  #[serde(default)]
  pub formats: Vec<Format>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct Format {
  pub format_id: Option<String>,
  pub ext: Option<String>,
  pub vcodec: Option<String>,
  pub acodec: Option<String>,
  pub url: Option<String>,
  pub protocol: Option<String>,
  pub height: Option<u32>,
  pub abr: Option<f64>,
  pub filesize: Option<f64>,
  pub filesize_approx: Option<f64>,
}

fn is_codec(codec: Option<&str>) -> bool {
  codec.map_or(false, |c| !c.is_empty() && c != "none")
}

fn is_valid_url(url: &str) -> bool {
  url
    .parse::<Url>()
    .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
    .unwrap_or(false)
}

impl Format {
  pub fn has_video(&self) -> bool {
    is_codec(self.vcodec.as_deref())
  }

  pub fn is_audio_only(&self) -> bool {
    is_codec(self.acodec.as_deref()) && self.vcodec.as_deref() == Some("none")
  }

  pub fn size(&self) -> Option<f64> {
    self.filesize.or(self.filesize_approx)
  }

  // plain http(s) download, not a manifest that needs a player
  fn direct_url(&self) -> Option<&str> {
    let plain = self
      .protocol
      .as_deref()
      .map_or(true, |p| p == "https" || p == "http");
    self.url.as_deref().filter(|url| plain && is_valid_url(url))
  }
}

impl VideoInfo {
  /// Picks the reference a client can fetch directly.
  ///
  /// Video: the first format in extractor order with a video codec and a
  /// direct url. Audio: the highest bitrate audio-only format with a direct
  /// url. Otherwise the top-level recommendation, if it is a valid url.
  pub fn direct_url(&self, format: OutputFormat) -> Option<&str> {
    let candidate = match format {
      OutputFormat::Video => self
        .formats
        .iter()
        .filter(|f| f.has_video())
        .find_map(Format::direct_url),
      OutputFormat::Audio => self
        .formats
        .iter()
        .filter(|f| f.is_audio_only() && f.direct_url().is_some())
        .max_by(|a, b| {
          let (a, b) = (a.abr.unwrap_or(0.0), b.abr.unwrap_or(0.0));
          a.total_cmp(&b)
        })
        .and_then(Format::direct_url),
    };

    candidate.or_else(|| self.url.as_deref().filter(|u| is_valid_url(u)))
  }

  pub fn into_direct_link(
    self,
    format: OutputFormat,
    source_url: &str,
  ) -> Result<DirectLink> {
    let url = self
      .direct_url(format)
      .ok_or_else(|| Error::NoDirectURL(source_url.to_string()))?
      .to_string();

    Ok(DirectLink {
      url,
      title: self.title.unwrap_or_else(|| PLACEHOLDER_TITLE.to_string()),
      duration: self.duration,
      thumbnail: self.thumbnail,
    })
  }
}

impl Ytdlp {
  pub fn new(tool: Tool, proxy: Option<String>, timeout: Duration) -> Self {
    Self {
      tool,
      proxy,
      timeout,
    }
  }

  fn command(&self) -> Command {
    let mut cmd = self.tool.command();
    if let Some(proxy) = &self.proxy {
      debug!("using proxy: {}", redact_proxy(proxy));
      cmd.arg("--proxy").arg(proxy);
    }
    cmd
  }

  /// `yt-dlp -j`, optionally resolving a format selector.
  pub async fn info(
    &self,
    url: &str,
    selector: Option<&str>,
  ) -> Result<VideoInfo> {
    let mut args = vec!["-j".to_string(), "--no-playlist".to_string()];
    if let Some(selector) = selector {
      args.push("-f".to_string());
      args.push(selector.to_string());
    }
    args.push(url.to_string());

    self.dump_json(args).await
  }

  /// Runs yt-dlp to completion and parses its stdout as json. The process
  /// is killed when it does not finish in time.
  pub async fn dump_json<T: DeserializeOwned>(
    &self,
    args: Vec<String>,
  ) -> Result<T> {
    let mut cmd = self.command();
    cmd.args(args);

    tokio::time::timeout(self.timeout, run_to_end(cmd))
      .await
      .map_err(|_| {
        Error::ExtractionFailed(format!(
          "timed out after {} seconds",
          self.timeout.as_secs()
        ))
      })?
  }

  // yt-dlp -f 'bestaudio/best' -o - 'https://youtube.com/watch?v=XXXXXXX'
  pub fn stream_command(&self, req: &ExtractionRequest) -> Command {
    let mut cmd = self.command();
    cmd
      .arg("--no-playlist")
      .arg("--no-progress")
      .arg("--quiet")
      .arg("--no-warnings")
      .arg("-f")
      .arg(&req.quality_hint)
      .arg("-o")
      .arg("-")
      .arg(&req.source_url);
    cmd
  }
}

async fn run_to_end<T: DeserializeOwned>(cmd: Command) -> Result<T> {
  let mut handle = ProcessHandle::spawn(Stage::Extractor, cmd, Stdio::null())?;

  let mut stdout = Vec::new();
  handle.take_stdout()?.read_to_end(&mut stdout).await?;
  let exit = handle.wait().await?;
  if !exit.success() {
    return Err(Error::ExtractionFailed(exit.detail()));
  }

  serde_json::from_slice(&stdout).map_err(|e| {
    Error::ExtractionFailed(format!("unparsable extractor output: {e}"))
  })
}
