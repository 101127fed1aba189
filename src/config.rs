use std::{net::SocketAddr, str::FromStr, time::Duration};

use tokio::process::Command;

use crate::search::SearchBackend;

/// An external executable plus the leading arguments it is always run
/// with, e.g. `python3 -m yt_dlp`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tool {
  pub program: String,
  pub args: Vec<String>,
}

impl Tool {
  pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      program: program.into(),
      args: args.into_iter().map(Into::into).collect(),
    }
  }

  // split on whitespace; no quoting support
  pub fn parse(s: &str) -> Option<Self> {
    let mut words = s.split_whitespace();
    let program = words.next()?;
    Some(Self::new(program, words))
  }

  pub fn command(&self) -> Command {
    let mut cmd = Command::new(&self.program);
    cmd.args(&self.args);
    cmd
  }
}

#[derive(Clone, Debug)]
pub struct Config {
  pub bind_addr: SocketAddr,
  /// Base url this instance is reachable at, used for self-referencing
  /// fallback links.
  pub public_url: String,
  pub ytdlp: Tool,
  pub ffmpeg: Tool,
  pub ytdlp_proxy: Option<String>,
  pub mp3_bitrate: String,
  pub convert_service_url: Option<String>,
  pub search_backend: SearchBackend,
  pub search_page_size: usize,
  pub search_limit: usize,
  pub extractor_timeout: Duration,
  pub stream_idle_timeout: Duration,
  pub upstream_timeout: Duration,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
      public_url: "http://localhost:3000".to_string(),
      ytdlp: Tool::new("yt-dlp", Vec::<String>::new()),
      ffmpeg: Tool::new("ffmpeg", Vec::<String>::new()),
      ytdlp_proxy: None,
      mp3_bitrate: "192k".to_string(),
      convert_service_url: None,
      search_backend: SearchBackend::Ytdlp,
      search_page_size: 10,
      search_limit: 50,
      extractor_timeout: Duration::from_secs(60),
      stream_idle_timeout: Duration::from_secs(120),
      upstream_timeout: Duration::from_secs(30),
    }
  }
}

impl Config {
  pub fn from_env() -> Self {
    let default = Self::default();

    let port = env_parse("PORT").unwrap_or(default.bind_addr.port());
    let host = env_parse("BIND_ADDR").unwrap_or(default.bind_addr.ip());
    let public_url = env_var("PUBLIC_URL")
      .map(|url| url.trim_end_matches('/').to_string())
      .unwrap_or_else(|| format!("http://localhost:{port}"));

    Self {
      bind_addr: SocketAddr::new(host, port),
      public_url,
      ytdlp: env_var("YTDLP_BIN")
        .and_then(|s| Tool::parse(&s))
        .unwrap_or(default.ytdlp),
      ffmpeg: env_var("FFMPEG_BIN")
        .and_then(|s| Tool::parse(&s))
        .unwrap_or(default.ffmpeg),
      ytdlp_proxy: env_var("YTDLP_PROXY"),
      mp3_bitrate: env_var("MP3_BITRATE").unwrap_or(default.mp3_bitrate),
      convert_service_url: env_var("CONVERT_SERVICE_URL"),
      search_backend: env_parse("SEARCH_BACKEND")
        .unwrap_or(default.search_backend),
      search_page_size: env_parse("SEARCH_PAGE_SIZE")
        .filter(|n| *n > 0)
        .unwrap_or(default.search_page_size),
      search_limit: env_parse("SEARCH_LIMIT")
        .filter(|n| *n > 0)
        .unwrap_or(default.search_limit),
      extractor_timeout: env_secs("EXTRACTOR_TIMEOUT_SECS")
        .unwrap_or(default.extractor_timeout),
      stream_idle_timeout: env_secs("STREAM_IDLE_TIMEOUT_SECS")
        .unwrap_or(default.stream_idle_timeout),
      upstream_timeout: env_secs("UPSTREAM_TIMEOUT_SECS")
        .unwrap_or(default.upstream_timeout),
    }
  }
}

// empty variables count as unset
fn env_var(key: &str) -> Option<String> {
  std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
  env_var(key).and_then(|s| s.trim().parse::<T>().ok())
}

fn env_secs(key: &str) -> Option<Duration> {
  env_parse::<u64>(key).map(Duration::from_secs)
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn test_tool_parse() {
    assert_eq!(
      Tool::parse("python3 -m yt_dlp"),
      Some(Tool::new("python3", ["-m", "yt_dlp"]))
    );
    assert_eq!(
      Tool::parse("  ffmpeg  "),
      Some(Tool::new("ffmpeg", Vec::<String>::new()))
    );
    assert_eq!(Tool::parse("   "), None);
  }

  #[test]
  fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.bind_addr.port(), 3000);
    assert_eq!(config.ytdlp.program, "yt-dlp");
    assert_eq!(config.search_page_size, 10);
    assert!(config.convert_service_url.is_none());
  }
}
