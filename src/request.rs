//! Validation of raw query parameters into an [`ExtractionRequest`].

use async_trait::async_trait;
use axum::extract::{FromRequestParts, Query};
use http_types::Url;
use serde::{de::DeserializeOwned, Deserialize};

use crate::{Error, Result};

/// Like [`Query`], but a malformed query string (e.g. a duplicated key) is
/// answered with the usual json error body.
pub struct Params<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for Params<T>
where
  T: DeserializeOwned,
  S: Send + Sync,
{
  type Rejection = Error;

  async fn from_request_parts(
    parts: &mut http::request::Parts,
    state: &S,
  ) -> Result<Self, Self::Rejection> {
    let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
    Ok(Params(value))
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
  Video,
  Audio,
}

impl OutputFormat {
  pub fn ext(self) -> &'static str {
    match self {
      OutputFormat::Video => "mp4",
      OutputFormat::Audio => "mp3",
    }
  }

  pub fn mime_type(self) -> &'static str {
    match self {
      OutputFormat::Video => "video/mp4",
      OutputFormat::Audio => "audio/mpeg",
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractionRequest {
  pub source_url: String,
  pub output_format: OutputFormat,
  /// yt-dlp format selector expression
  pub quality_hint: String,
}

/// Query string shared by every url-taking endpoint.
#[derive(Deserialize, Debug, Default)]
pub struct UrlQuery {
  pub url: Option<String>,
  pub format: Option<String>,
}

impl ExtractionRequest {
  pub fn from_query(query: &UrlQuery, default_format: &str) -> Result<Self> {
    let source_url = validate_url(query.url.as_deref())?;
    let format = query
      .format
      .as_deref()
      .map(str::trim)
      .filter(|f| !f.is_empty())
      .unwrap_or(default_format);
    let (output_format, quality_hint) = parse_format(format)?;

    Ok(Self {
      source_url,
      output_format,
      quality_hint,
    })
  }

  /// A video request preferring the lowest-latency stream, at most 240p.
  pub fn low_latency_video(source_url: String) -> Self {
    Self {
      source_url,
      output_format: OutputFormat::Video,
      quality_hint: "best[height<=240]/worst".to_string(),
    }
  }
}

pub fn validate_url(raw: Option<&str>) -> Result<String> {
  let raw = raw
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .ok_or_else(|| Error::InvalidInput("Missing url".into()))?;
  let decoded = decode_param(raw);

  let url: Url = decoded
    .parse()
    .map_err(|_| Error::InvalidInput(format!("Invalid url: {decoded}")))?;
  match url.scheme() {
    "http" | "https" if url.host_str().is_some() => Ok(decoded),
    _ => Err(Error::InvalidInput(format!("Unsupported url: {decoded}"))),
  }
}

/// Undoes percent-encoding the framework's own query decoding left behind,
/// e.g. a client encoding the url twice.
pub fn decode_param(raw: &str) -> String {
  let mut value = raw.to_string();
  // bounded, a malicious value could nest encodings arbitrarily deep
  for _ in 0..3 {
    if value.contains("://") || !value.contains('%') {
      break;
    }
    match urlencoding::decode(&value) {
      Ok(decoded) if decoded != value => value = decoded.into_owned(),
      _ => break,
    }
  }
  value
}

fn parse_format(format: &str) -> Result<(OutputFormat, String)> {
  let parsed = match format {
    "mp4" => (OutputFormat::Video, "best[ext=mp4]/best".to_string()),
    "best" => (OutputFormat::Video, "best".to_string()),
    "mp3" => (OutputFormat::Audio, "bestaudio/best".to_string()),
    f if f.starts_with("bestaudio") => (OutputFormat::Audio, f.to_string()),
    f => {
      return Err(Error::InvalidInput(format!("Unsupported format: {f}")))
    }
  };

  Ok(parsed)
}
