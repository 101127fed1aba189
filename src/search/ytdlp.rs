use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
  extractor::Ytdlp,
  util::{format_duration, format_views, today, upload_recency},
  video::{extract_video_id, thumbnail_url, VideoItem},
  Result,
};

use super::SearchProvider;

// run yt-dlp's own youtube search. requires yt-dlp executable.
pub struct YtdlpSearch {
  ytdlp: Ytdlp,
  limit: usize,
}

impl YtdlpSearch {
  pub fn new(ytdlp: Ytdlp, limit: usize) -> Self {
    Self { ytdlp, limit }
  }
}

#[derive(Debug, serde::Deserialize)]
struct Playlist {
  #[serde(default)]
  entries: Vec<Option<Entry>>,
}

#[derive(Debug, serde::Deserialize)]
struct Entry {
  id: Option<String>,
  title: Option<String>,
  url: Option<String>,
  channel: Option<String>,
  uploader: Option<String>,
  duration: Option<f64>,
  view_count: Option<u64>,
  upload_date: Option<String>,
  #[serde(default)]
  thumbnails: Vec<Thumbnail>,
}

#[derive(Debug, serde::Deserialize, Clone, Default)]
struct Thumbnail {
  url: String,
  #[serde(default)]
  width: i32,
}

#[async_trait]
impl SearchProvider for YtdlpSearch {
  async fn search(&self, query: &str) -> Result<Vec<VideoItem>> {
    let args = vec![
      // don't fetch video pages
      "--flat-playlist".to_string(),
      // emit the output as a single json object instead of jsonl
      "--dump-single-json".to_string(),
      format!("ytsearch{}:{}", self.limit, query),
    ];
    let playlist: Playlist = self.ytdlp.dump_json(args).await?;

    Ok(into_items(playlist, today()))
  }
}

fn into_items(playlist: Playlist, today: NaiveDate) -> Vec<VideoItem> {
  playlist
    .entries
    .into_iter()
    .flatten()
    .filter_map(|entry| entry.into_item(today))
    .collect()
}

impl Entry {
  fn into_item(self, today: NaiveDate) -> Option<VideoItem> {
    let link = match (self.url, &self.id) {
      (Some(url), _) if url.starts_with("http") => url,
      (_, Some(id)) => format!("https://www.youtube.com/watch?v={id}"),
      _ => return None,
    };

    let video_id = self.id.or_else(|| extract_video_id(&link));
    let thumbnail = self
      .thumbnails
      .into_iter()
      .max_by_key(|t| t.width)
      .map(|t| t.url)
      .or_else(|| video_id.as_deref().map(thumbnail_url))
      .unwrap_or_default();

    Some(VideoItem {
      title: self.title.unwrap_or_default(),
      link,
      thumbnail,
      channel: self.channel.or(self.uploader).unwrap_or_default(),
      duration: self.duration.map(format_duration).unwrap_or_default(),
      views: self.view_count.map(format_views).unwrap_or_default(),
      uploaded: self
        .upload_date
        .and_then(|d| upload_recency(&d, today))
        .unwrap_or_default(),
    })
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn test_into_items() {
    let playlist: Playlist = serde_json::from_value(json!({
      "entries": [
        {
          "id": "dQw4w9WgXcQ",
          "title": "Never Gonna Give You Up",
          "url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
          "channel": "Rick Astley",
          "duration": 212.0,
          "view_count": 1_500_000_000u64,
          "upload_date": "20240101",
          "thumbnails": [
            { "url": "https://i.ytimg.com/small.jpg", "width": 168 },
            { "url": "https://i.ytimg.com/large.jpg", "width": 336 }
          ]
        },
        null,
        { "id": "aaaaaaaaaaa", "title": "No extras", "uploader": "someone" },
        { "title": "no id and no url" }
      ]
    }))
    .unwrap();

    let today = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
    let items = into_items(playlist, today);
    assert_eq!(items.len(), 2);

    assert_eq!(
      items[0],
      VideoItem {
        title: "Never Gonna Give You Up".into(),
        link: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".into(),
        thumbnail: "https://i.ytimg.com/large.jpg".into(),
        channel: "Rick Astley".into(),
        duration: "3:32".into(),
        views: "1,500,000,000 views".into(),
        uploaded: "2 weeks ago".into(),
      }
    );

    assert_eq!(items[1].link, "https://www.youtube.com/watch?v=aaaaaaaaaaa");
    assert_eq!(
      items[1].thumbnail,
      "https://i.ytimg.com/vi/aaaaaaaaaaa/hqdefault.jpg"
    );
    assert_eq!(items[1].channel, "someone");
    assert_eq!(items[1].duration, "");
  }
}
