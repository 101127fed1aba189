use std::{net::SocketAddr, time::Duration};

use axum::Router;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod convert;
mod error;
mod extractor;
mod metadata;
mod pipeline;
mod process;
mod request;
mod search;
mod stream;
mod transcoder;
mod util;
mod video;

#[cfg(test)]
mod test_util;

pub use error::{Error, Result};

use crate::{app::AppState, config::Config, util::redact_proxy};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info")),
    )
    .init();

  let config = Config::from_env();
  info!(
    "extractor: {:?}, transcoder: {:?}, proxy: {}, search: {:?}",
    config.ytdlp,
    config.ffmpeg,
    config
      .ytdlp_proxy
      .as_deref()
      .map(redact_proxy)
      .unwrap_or_else(|| "none".to_string()),
    config.search_backend,
  );

  let addr = config.bind_addr;
  let public_url = config.public_url.clone();
  let app = app::router(AppState::new(config)?);

  Toplevel::new(move |s| async move {
    s.start(SubsystemBuilder::new("http", move |subsys| {
      serve(app, addr, public_url, subsys)
    }));
  })
  .catch_signals()
  .handle_shutdown_requests(SHUTDOWN_TIMEOUT)
  .await?;

  Ok(())
}

async fn serve(
  app: Router,
  addr: SocketAddr,
  public_url: String,
  subsys: SubsystemHandle,
) -> Result<(), hyper::Error> {
  let server = axum::Server::try_bind(&addr)?.serve(app.into_make_service());
  info!("listening on {} ({})", server.local_addr(), public_url);

  server
    .with_graceful_shutdown(subsys.on_shutdown_requested())
    .await
}
