use std::sync::Arc;

use axum::{response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
  config::Config,
  convert, extractor::Ytdlp, metadata, search,
  search::SearchProvider,
  stream,
  transcoder::Ffmpeg,
  video, Result,
};

/// Immutable per-process values shared by every request.
#[derive(Clone)]
pub struct AppState {
  pub config: Arc<Config>,
  pub ytdlp: Ytdlp,
  pub ffmpeg: Ffmpeg,
  pub search: Arc<dyn SearchProvider>,
  pub http: reqwest::Client,
}

impl AppState {
  pub fn new(config: Config) -> Result<Self> {
    let http = reqwest::Client::builder()
      .timeout(config.upstream_timeout)
      .build()?;
    let ytdlp = Ytdlp::new(
      config.ytdlp.clone(),
      config.ytdlp_proxy.clone(),
      config.extractor_timeout,
    );
    let ffmpeg = Ffmpeg::new(config.ffmpeg.clone(), config.mp3_bitrate.clone());
    let search = search::provider(&config, &ytdlp, &http);

    Ok(Self {
      config: Arc::new(config),
      ytdlp,
      ffmpeg,
      search,
      http,
    })
  }
}

pub fn router(state: AppState) -> Router {
  Router::new()
    .route("/health", get(health))
    .route("/search", get(search::search))
    .route("/video-by-url", get(video::video_by_url))
    .route("/video-info", get(metadata::video_info))
    .route("/get-google-url", get(metadata::get_google_url))
    .route("/get-stream-url", get(metadata::get_stream_url))
    .route("/stream", get(stream::stream))
    .route("/download", get(stream::download))
    .route("/convert-url", get(convert::convert_url))
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive())
    .with_state(state)
}

async fn health() -> impl IntoResponse {
  Json(json!({ "status": "ok" }))
}
