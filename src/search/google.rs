use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
  video::{extract_video_id, thumbnail_url, VideoItem},
  Error, Result,
};

use super::SearchProvider;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64)";

// google wraps result links as /url?q=<target>&sa=...
static REDIRECT_REGEX: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"/url\?q=(.*?)&").unwrap());

// scrape a google results page restricted to youtube.com
pub struct GoogleSearch {
  http: reqwest::Client,
}

impl GoogleSearch {
  pub fn new(http: reqwest::Client) -> Self {
    Self { http }
  }
}

#[async_trait]
impl SearchProvider for GoogleSearch {
  async fn search(&self, query: &str) -> Result<Vec<VideoItem>> {
    let url = format!(
      "https://www.google.com/search?q=site:youtube.com+{}",
      urlencoding::encode(query)
    );
    let body = self
      .http
      .get(url)
      .header("User-Agent", USER_AGENT)
      .send()
      .await?
      .error_for_status()?
      .text()
      .await?;

    parse_results(&body)
  }
}

fn parse_results(html: &str) -> Result<Vec<VideoItem>> {
  let dom = tl::parse(html, tl::ParserOptions::default())
    .map_err(|_| Error::InvalidHTML("search results page"))?;
  let parser = dom.parser();

  let anchors = dom
    .query_selector("a[href]")
    .expect("selector is hard-coded, thus must be valid");

  let mut items = Vec::new();
  for node in anchors {
    let Some(tag) = node.get(parser).and_then(|n| n.as_tag()) else {
      continue;
    };
    let Some(href) = tag.attributes().get("href").flatten() else {
      continue;
    };

    let href = href.as_utf8_str();
    if !href.contains("youtube.com/watch") {
      continue;
    }

    let decoded = urlencoding::decode(&href)
      .map(|s| s.into_owned())
      .unwrap_or_else(|_| href.to_string());
    let Some(link) = REDIRECT_REGEX
      .captures(&decoded)
      .and_then(|c| c.get(1))
      .map(|m| m.as_str().to_string())
    else {
      continue;
    };

    let title = tag.inner_text(parser).trim().to_string();
    if title.is_empty() {
      continue;
    }

    let thumbnail = extract_video_id(&link)
      .map(|id| thumbnail_url(&id))
      .unwrap_or_default();

    items.push(VideoItem {
      title,
      link,
      thumbnail,
      ..Default::default()
    });
  }

  Ok(items)
}
