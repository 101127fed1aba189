use axum::{
  extract::State,
  Json,
};
use serde_json::Value;
use tracing::debug;

use crate::{
  app::AppState,
  request::{decode_param, validate_url, Params, UrlQuery},
  Error, Result,
};

const DEFAULT_FORMAT: &str = "mp3";

/// Hands the conversion off to the remote service and relays its answer
/// (`link`, `title`, `duration`) verbatim.
pub async fn convert_url(
  State(state): State<AppState>,
  Params(query): Params<UrlQuery>,
) -> Result<Json<Value>> {
  let url = validate_url(query.url.as_deref())?;
  let format = query
    .format
    .as_deref()
    .map(decode_param)
    .filter(|f| !f.trim().is_empty())
    .unwrap_or_else(|| DEFAULT_FORMAT.to_string());

  let service = state.config.convert_service_url.as_deref().ok_or_else(|| {
    Error::UpstreamUnavailable("no conversion service configured".into())
  })?;

  let value = request_conversion(&state.http, service, &url, &format)
    .await
    .map_err(|e| match e {
      Error::UpstreamUnavailable(_) => e,
      other => Error::UpstreamUnavailable(other.to_string()),
    })?;

  Ok(Json(value))
}

async fn request_conversion(
  http: &reqwest::Client,
  service: &str,
  url: &str,
  format: &str,
) -> Result<Value> {
  debug!("requesting conversion of {} to {} from {}", url, format, service);

  let resp = http
    .get(service)
    .query(&[("url", url), ("format", format)])
    .send()
    .await?;

  let status = resp.status();
  if !status.is_success() {
    return Err(Error::UpstreamUnavailable(format!(
      "conversion service answered {status}"
    )));
  }

  let value: Value = resp.json().await?;
  match value.get("link").and_then(Value::as_str) {
    Some(link) if !link.is_empty() => Ok(value),
    _ => Err(Error::UpstreamUnavailable(
      "conversion service returned no link".into(),
    )),
  }
}
