use axum::{
  extract::rejection::QueryRejection,
  response::{IntoResponse, Response},
  Json,
};
use http::StatusCode;
use serde::Serialize;

#[derive(thiserror::Error, Debug)]
pub enum Error {
  #[error("{0}")]
  InvalidInput(String),
  #[error("extraction failed: {0}")]
  ExtractionFailed(String),
  #[error("no direct url found for {0}")]
  NoDirectURL(String),
  #[error("transcode failed: {0}")]
  TranscodeFailed(String),
  #[error("upstream unavailable: {0}")]
  UpstreamUnavailable(String),
  #[error("failed to fetch search results: {0}")]
  Search(String),
  #[error("invalid html: {0}")]
  InvalidHTML(&'static str),
  #[error("io error: {0}")]
  IO(#[from] std::io::Error),
  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),
  #[error("http client error: {0}")]
  Reqwest(#[from] reqwest::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<QueryRejection> for Error {
  fn from(rejection: QueryRejection) -> Self {
    Error::InvalidInput(rejection.body_text())
  }
}

#[derive(Serialize)]
struct ErrorBody {
  error: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  message: Option<String>,
}

impl Error {
  pub fn status(&self) -> StatusCode {
    match self {
      Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
      _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  // short label shown in the `error` field of the response body
  fn label(&self) -> &'static str {
    match self {
      Error::InvalidInput(_) => "Invalid input",
      Error::ExtractionFailed(_) => "Extraction failed",
      Error::NoDirectURL(_) => "No direct URL found",
      Error::TranscodeFailed(_) => "Transcode failed",
      Error::UpstreamUnavailable(_) => "Conversion failed",
      Error::Search(_) | Error::InvalidHTML(_) => {
        "Failed to fetch results"
      }
      Error::IO(_) | Error::Json(_) | Error::Reqwest(_) => {
        "Internal server error"
      }
    }
  }

  fn body(&self) -> ErrorBody {
    match self {
      // the message of an input error is already user-facing
      Error::InvalidInput(msg) => ErrorBody {
        error: msg.clone(),
        message: None,
      },
      other => ErrorBody {
        error: other.label().to_string(),
        message: Some(other.to_string()),
      },
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::warn!("request failed: {}", self);
    }

    (status, Json(self.body())).into_response()
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn test_status_codes() {
    let invalid = Error::InvalidInput("Missing url".into());
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

    for err in [
      Error::ExtractionFailed("exit status 1".into()),
      Error::NoDirectURL("https://youtu.be/x".into()),
      Error::TranscodeFailed("broken pipe".into()),
      Error::UpstreamUnavailable("timeout".into()),
    ] {
      assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
  }

  #[test]
  fn test_error_body() {
    let body =
      serde_json::to_value(Error::InvalidInput("Missing query".into()).body())
        .unwrap();
    assert_eq!(body, serde_json::json!({ "error": "Missing query" }));

    let body =
      serde_json::to_value(Error::TranscodeFailed("exit 1".into()).body())
        .unwrap();
    assert_eq!(body["error"], "Transcode failed");
    assert_eq!(body["message"], "transcode failed: exit 1");
  }
}
