//! Byte-stream endpoints, backed by a process pipeline.

use axum::extract::State;

use crate::{
  app::AppState,
  extractor::Extraction,
  pipeline::Pipeline,
  request::{ExtractionRequest, OutputFormat, Params, UrlQuery},
  video::extract_video_id,
  Result,
};

/// Whether the relayed bytes are meant to be played inline or saved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Delivery {
  Inline,
  Attachment,
}

async fn run(
  state: &AppState,
  req: &ExtractionRequest,
  delivery: Delivery,
) -> Result<Extraction> {
  let mut pipeline =
    Pipeline::new(&req.source_url, state.config.stream_idle_timeout)
      .spawn_extractor(state.ytdlp.stream_command(req))?;

  // only audio goes through the transcoder, video is relayed as extracted
  if req.output_format == OutputFormat::Audio {
    pipeline = pipeline.spawn_transcoder(state.ffmpeg.mp3_command())?;
  }

  let relay = pipeline.start().await?;

  let attachment = (delivery == Delivery::Attachment).then(|| {
    let name = extract_video_id(&req.source_url)
      .unwrap_or_else(|| "video".to_string());
    format!("{}.{}", name, req.output_format.ext())
  });

  Ok(Extraction::Stream {
    stream: relay.into_stream(),
    mime_type: req.output_format.mime_type(),
    attachment,
  })
}

pub async fn stream(
  State(state): State<AppState>,
  Params(query): Params<UrlQuery>,
) -> Result<Extraction> {
  // inline playback is always the video itself
  let query = UrlQuery {
    format: None,
    ..query
  };
  let req = ExtractionRequest::from_query(&query, "mp4")?;

  run(&state, &req, Delivery::Inline).await
}

pub async fn download(
  State(state): State<AppState>,
  Params(query): Params<UrlQuery>,
) -> Result<Extraction> {
  let req = ExtractionRequest::from_query(&query, "mp4")?;

  run(&state, &req, Delivery::Attachment).await
}
