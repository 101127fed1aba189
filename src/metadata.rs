//! Metadata-shaped endpoints. Extractor failures here are masked with
//! placeholder data instead of surfacing as errors.

use std::collections::BTreeMap;

use axum::{
  extract::State,
  Json,
};
use serde::Serialize;
use tracing::warn;

use crate::{
  app::AppState,
  extractor::{Extraction, Format, VideoInfo},
  request::{
    validate_url, ExtractionRequest, OutputFormat, Params, UrlQuery,
  },
  video::PLACEHOLDER_TITLE,
  Error, Result,
};

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
  Video,
  Audio,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QualityDescriptor {
  pub kind: Kind,
  pub ext: String,
  /// `720p` for video, `128kbps` for audio
  pub quality: String,
  pub size: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub format_id: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct VideoInfoResponse {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub thumbnail: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration: Option<f64>,
  pub video: Vec<QualityDescriptor>,
  pub audio: Vec<QualityDescriptor>,
}

fn placeholder(kind: Kind, ext: &str, quality: &str) -> QualityDescriptor {
  QualityDescriptor {
    kind,
    ext: ext.to_string(),
    quality: quality.to_string(),
    size: "Unknown".to_string(),
    format_id: None,
  }
}

pub fn fallback_video() -> Vec<QualityDescriptor> {
  ["1080p", "720p", "480p", "360p"]
    .into_iter()
    .map(|q| placeholder(Kind::Video, "mp4", q))
    .collect()
}

pub fn fallback_audio() -> Vec<QualityDescriptor> {
  ["320kbps", "192kbps", "128kbps"]
    .into_iter()
    .map(|q| placeholder(Kind::Audio, "mp3", q))
    .collect()
}

impl VideoInfoResponse {
  pub fn fallback() -> Self {
    Self {
      title: None,
      thumbnail: None,
      duration: None,
      video: fallback_video(),
      audio: fallback_audio(),
    }
  }

  pub fn from_info(info: VideoInfo) -> Self {
    let mut video = video_qualities(&info.formats);
    if video.is_empty() {
      video = fallback_video();
    }
    let mut audio = audio_qualities(&info.formats);
    if audio.is_empty() {
      audio = fallback_audio();
    }

    Self {
      title: info.title,
      thumbnail: info.thumbnail,
      duration: info.duration,
      video,
      audio,
    }
  }
}

fn format_size(size: Option<f64>) -> String {
  const MB: f64 = 1024.0 * 1024.0;
  match size {
    Some(bytes) if bytes >= MB => format!("{:.1} MB", bytes / MB),
    Some(bytes) if bytes > 0.0 => format!("{:.0} KB", (bytes / 1024.0).ceil()),
    _ => "Unknown".to_string(),
  }
}

fn descriptor(kind: Kind, quality: String, f: &Format) -> QualityDescriptor {
  QualityDescriptor {
    kind,
    ext: f.ext.clone().unwrap_or_default(),
    quality,
    size: format_size(f.size()),
    format_id: f.format_id.clone(),
  }
}

/// One entry per resolution, highest first. yt-dlp lists formats worst to
/// best, so later entries win.
fn video_qualities(formats: &[Format]) -> Vec<QualityDescriptor> {
  let mut by_height = BTreeMap::new();
  for f in formats.iter().filter(|f| f.has_video()) {
    if let Some(height) = f.height.filter(|h| *h > 0) {
      by_height.insert(height, f);
    }
  }

  by_height
    .into_iter()
    .rev()
    .map(|(height, f)| descriptor(Kind::Video, format!("{height}p"), f))
    .collect()
}

/// One entry per rounded bitrate, highest first.
fn audio_qualities(formats: &[Format]) -> Vec<QualityDescriptor> {
  let mut by_bitrate = BTreeMap::new();
  for f in formats.iter().filter(|f| f.is_audio_only()) {
    if let Some(abr) = f.abr.filter(|abr| *abr > 0.0) {
      by_bitrate.insert(abr.round() as u64, f);
    }
  }

  by_bitrate
    .into_iter()
    .rev()
    .map(|(abr, f)| descriptor(Kind::Audio, format!("{abr}kbps"), f))
    .collect()
}

pub async fn video_info(
  State(state): State<AppState>,
  Params(query): Params<UrlQuery>,
) -> Result<Json<VideoInfoResponse>> {
  // every format is listed, so a `format` parameter plays no role here
  let source_url = validate_url(query.url.as_deref())?;

  let resp = match state.ytdlp.info(&source_url, None).await {
    Ok(info) => VideoInfoResponse::from_info(info),
    Err(e) => {
      warn!("serving fallback qualities for {}: {}", source_url, e);
      VideoInfoResponse::fallback()
    }
  };

  Ok(Json(resp))
}

pub async fn get_google_url(
  State(state): State<AppState>,
  Params(query): Params<UrlQuery>,
) -> Result<Extraction> {
  let req = ExtractionRequest::from_query(&query, "mp4")?;
  let info = state
    .ytdlp
    .info(&req.source_url, Some(&req.quality_hint))
    .await?;

  let link = info.into_direct_link(req.output_format, &req.source_url)?;
  Ok(Extraction::Direct(link))
}

#[derive(Serialize, Debug)]
pub struct StreamLink {
  pub url: String,
  pub title: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub duration: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub thumbnail: Option<String>,
  pub fallback: bool,
}

pub async fn get_stream_url(
  State(state): State<AppState>,
  Params(query): Params<UrlQuery>,
) -> Result<Json<StreamLink>> {
  let source_url = validate_url(query.url.as_deref())?;
  let req = ExtractionRequest::low_latency_video(source_url);

  // the selector only narrows yt-dlp's top-level `url`, which is the last
  // resort; the first direct video format listed still wins
  let direct = match state
    .ytdlp
    .info(&req.source_url, Some(&req.quality_hint))
    .await
  {
    Ok(info) => info.into_direct_link(OutputFormat::Video, &req.source_url),
    Err(e) => Err(e),
  };

  let link = match direct {
    Ok(link) => StreamLink {
      url: link.url,
      title: link.title,
      duration: link.duration,
      thumbnail: link.thumbnail,
      fallback: false,
    },
    Err(e @ (Error::ExtractionFailed(_) | Error::NoDirectURL(_))) => {
      warn!("falling back to proxied stream for {}: {}", req.source_url, e);
      StreamLink {
        url: format!(
          "{}/stream?url={}",
          state.config.public_url,
          urlencoding::encode(&req.source_url)
        ),
        title: PLACEHOLDER_TITLE.to_string(),
        duration: None,
        thumbnail: None,
        fallback: true,
      }
    }
    Err(e) => return Err(e),
  };

  Ok(Json(link))
}
