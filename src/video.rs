use axum::Json;
use http_types::Url;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::{
  request::{validate_url, Params, UrlQuery},
  Error, Result,
};

pub const PLACEHOLDER_TITLE: &str = "YouTube Video";

#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VideoItem {
  pub title: String,
  pub link: String,
  pub thumbnail: String,
  pub channel: String,
  pub duration: String,
  pub views: String,
  pub uploaded: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VideoList {
  pub videos: Vec<VideoItem>,
  pub page: usize,
  pub has_more: bool,
}

static VIDEO_ID_REGEX: Lazy<Regex> =
  Lazy::new(|| Regex::new("^[A-Za-z0-9_-]{11}$").unwrap());

pub fn thumbnail_url(video_id: &str) -> String {
  format!("https://i.ytimg.com/vi/{video_id}/hqdefault.jpg")
}

/// Finds the video id embedded in a youtube url: `watch?v=<id>`,
/// `youtu.be/<id>`, `/shorts/<id>`, `/embed/<id>` or `/live/<id>`.
pub fn extract_video_id(url_str: &str) -> Option<String> {
  let url: Url = url_str.parse().ok()?;
  let host = url.host_str()?.trim_start_matches("www.");

  let candidate = match host {
    "youtu.be" => url.path_segments()?.next().map(str::to_string),
    "youtube.com" | "m.youtube.com" | "music.youtube.com"
    | "youtube-nocookie.com" => {
      let segs: Vec<_> = url.path_segments()?.take(2).collect();
      match segs.as_slice() {
        ["watch"] | ["watch", ""] => url
          .query_pairs()
          .find_map(|(k, v)| (k == "v").then(|| v.into_owned())),
        ["shorts" | "embed" | "live" | "v", id] => Some(id.to_string()),
        _ => None,
      }
    }
    _ => None,
  }?;

  VIDEO_ID_REGEX.is_match(&candidate).then_some(candidate)
}

/// Minimal metadata derived purely from the url, no collaborator involved.
pub fn synthesize_item(url: &str) -> Result<VideoItem> {
  let video_id = extract_video_id(url).ok_or_else(|| {
    Error::InvalidInput(format!("Could not find a video id in {url}"))
  })?;

  Ok(VideoItem {
    title: PLACEHOLDER_TITLE.to_string(),
    link: url.to_string(),
    thumbnail: thumbnail_url(&video_id),
    ..Default::default()
  })
}

pub async fn video_by_url(
  Params(query): Params<UrlQuery>,
) -> Result<Json<VideoList>> {
  let url = validate_url(query.url.as_deref())?;
  let item = synthesize_item(&url)?;

  Ok(Json(VideoList {
    videos: vec![item],
    page: 1,
    has_more: false,
  }))
}
