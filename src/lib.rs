pub mod config;
pub mod driver;
pub mod matrix;
pub mod protocol;
pub mod serial;
pub mod session;
pub mod sink;

pub use config::SessionConfig;
pub use driver::{CycleOutcome, DriverHandle, DriverReport, PollDriver};
pub use matrix::{Matrix, MatrixBuffer, Sample};
pub use protocol::{FrameParser, ProtocolKind};
pub use session::run_session;

use std::path::Path;

/// Binary entry point: load config (or dense defaults), log until Ctrl-C.
pub async fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
  let config = match config_path {
    Some(path) => SessionConfig::load(path)?,
    None => SessionConfig::default(),
  };

  log::info!(
    "Pressure logger starting ({} protocol, {:?} grid)",
    config.protocol.as_str(),
    config.grid()
  );

  let report = run_session(config, async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      log::error!("Failed to listen for Ctrl-C: {}", e);
      std::future::pending::<()>().await;
    }
  })
  .await?;

  log::info!(
    "Pressure logger stopped: {} samples published, {} dropped",
    report.metrics.frames_published,
    report.metrics.dropped_samples
  );
  Ok(())
}
