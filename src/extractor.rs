mod ytdlp;

use axum::{
  body::StreamBody,
  response::{IntoResponse, Response},
  Json,
};
use bytes::Bytes;
use futures::stream::BoxStream;
use http::{header, HeaderValue};
use serde::Serialize;

use crate::Result;

pub use ytdlp::{Format, VideoInfo, Ytdlp};

/// A direct reference to media bytes, bypassing any player page.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DirectLink {
  pub url: String,
  pub title: String,
  pub duration: Option<f64>,
  pub thumbnail: Option<String>,
}

/// What a pipeline hands back to the client: either a json description
/// or a live byte stream.
pub enum Extraction {
  Direct(DirectLink),
  Stream {
    stream: BoxStream<'static, Result<Bytes>>,
    mime_type: &'static str,
    /// Download file name. Inline streams advertise range support instead.
    attachment: Option<String>,
  },
}

impl IntoResponse for Extraction {
  fn into_response(self) -> Response {
    match self {
      Extraction::Direct(link) => Json(link).into_response(),
      Extraction::Stream {
        stream,
        mime_type,
        attachment,
      } => {
        let mut resp = StreamBody::new(stream).into_response();
        let headers = resp.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(mime_type));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        match attachment {
          Some(filename) => {
            let disposition = format!("attachment; filename=\"{filename}\"");
            if let Ok(value) = HeaderValue::from_str(&disposition) {
              headers.insert(header::CONTENT_DISPOSITION, value);
            }
          }
          None => {
            headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
          }
        }

        resp
      }
    }
  }
}
