mod google;
mod ytdlp;

use std::{collections::HashSet, str::FromStr, sync::Arc};

use async_trait::async_trait;
use axum::{
  extract::State,
  Json,
};
use serde::Deserialize;

use crate::{
  app::AppState,
  config::Config,
  extractor::Ytdlp,
  request::Params,
  video::{VideoItem, VideoList},
  Error, Result,
};

pub use google::GoogleSearch;
pub use ytdlp::YtdlpSearch;

/// An external source of search results. Returns the whole result list at
/// once, pagination happens on our side.
#[async_trait]
pub trait SearchProvider: Send + Sync {
  async fn search(&self, query: &str) -> Result<Vec<VideoItem>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchBackend {
  Ytdlp,
  Google,
}

impl FromStr for SearchBackend {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "ytdlp" | "yt-dlp" => Ok(SearchBackend::Ytdlp),
      "google" => Ok(SearchBackend::Google),
      other => Err(format!("unknown search backend: {other}")),
    }
  }
}

pub fn provider(
  config: &Config,
  ytdlp: &Ytdlp,
  http: &reqwest::Client,
) -> Arc<dyn SearchProvider> {
  match config.search_backend {
    SearchBackend::Ytdlp => {
      Arc::new(YtdlpSearch::new(ytdlp.clone(), config.search_limit))
    }
    SearchBackend::Google => Arc::new(GoogleSearch::new(http.clone())),
  }
}

#[derive(Deserialize, Debug)]
pub struct SearchQuery {
  q: Option<String>,
  page: Option<String>,
}

pub async fn search(
  State(state): State<AppState>,
  Params(query): Params<SearchQuery>,
) -> Result<Json<VideoList>> {
  let q = query
    .q
    .as_deref()
    .map(str::trim)
    .filter(|q| !q.is_empty())
    .ok_or_else(|| Error::InvalidInput("Missing query".into()))?;
  let page = parse_page(query.page.as_deref())?;

  let results = state
    .search
    .search(q)
    .await
    .map_err(|e| Error::Search(e.to_string()))?;
  let results = dedupe_by_link(results);

  Ok(Json(paginate(results, page, state.config.search_page_size)))
}

fn parse_page(page: Option<&str>) -> Result<usize> {
  let Some(page) = page.map(str::trim).filter(|p| !p.is_empty()) else {
    return Ok(1);
  };

  match page.parse::<usize>() {
    Ok(n) if n > 0 => Ok(n),
    _ => Err(Error::InvalidInput(format!("Invalid page: {page}"))),
  }
}

/// Keeps the first occurrence of every link.
pub fn dedupe_by_link(items: Vec<VideoItem>) -> Vec<VideoItem> {
  let mut seen = HashSet::with_capacity(items.len());
  items
    .into_iter()
    .filter(|item| seen.insert(item.link.clone()))
    .collect()
}

/// 1-based page of `size` items out of the full result list.
pub fn paginate(items: Vec<VideoItem>, page: usize, size: usize) -> VideoList {
  let start = (page - 1).saturating_mul(size);
  let has_more = items.len() > start.saturating_add(size);
  let videos = items.into_iter().skip(start).take(size).collect();

  VideoList {
    videos,
    page,
    has_more,
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn item(link: &str) -> VideoItem {
    VideoItem {
      title: format!("title of {link}"),
      link: link.to_string(),
      ..Default::default()
    }
  }

  #[test]
  fn test_dedupe_by_link() {
    let items = vec![item("a"), item("b"), item("a"), item("c"), item("b")];
    let links: Vec<_> = dedupe_by_link(items)
      .into_iter()
      .map(|i| i.link)
      .collect();
    assert_eq!(links, ["a", "b", "c"]);
  }

  #[test]
  fn test_paginate() {
    let items: Vec<_> = (0..25).map(|i| item(&i.to_string())).collect();

    let first = paginate(items.clone(), 1, 10);
    assert_eq!(first.videos.len(), 10);
    assert_eq!(first.videos[0].link, "0");
    assert!(first.has_more);

    let last = paginate(items.clone(), 3, 10);
    assert_eq!(last.videos.len(), 5);
    assert_eq!(last.videos[0].link, "20");
    assert!(!last.has_more);

    let beyond = paginate(items.clone(), 4, 10);
    assert!(beyond.videos.is_empty());
    assert!(!beyond.has_more);

    let exact = paginate(items[..20].to_vec(), 2, 10);
    assert_eq!(exact.videos.len(), 10);
    assert!(!exact.has_more);
  }

  #[test]
  fn test_parse_page() {
    assert_eq!(parse_page(None).unwrap(), 1);
    assert_eq!(parse_page(Some("")).unwrap(), 1);
    assert_eq!(parse_page(Some("3")).unwrap(), 3);
    assert!(matches!(parse_page(Some("0")), Err(Error::InvalidInput(_))));
    assert!(matches!(parse_page(Some("two")), Err(Error::InvalidInput(_))));
  }

  #[test]
  fn test_backend_from_str() {
    assert_eq!("yt-dlp".parse::<SearchBackend>(), Ok(SearchBackend::Ytdlp));
    assert_eq!("Google".parse::<SearchBackend>(), Ok(SearchBackend::Google));
    assert!("bing".parse::<SearchBackend>().is_err());
  }
}
