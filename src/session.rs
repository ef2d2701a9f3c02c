use std::future::Future;
use std::time::Duration;
use anyhow::{anyhow, Context};

use crate::config::SessionConfig;
use crate::driver::{DriverHandle, DriverReport, DriverTiming, PollDriver};
use crate::matrix::MatrixBuffer;
use crate::serial::{SerialInterface, Transport};
use crate::sink::{CsvSink, LogSink, QueuedSink, SampleSink};

/// Controllers reset when the port opens; give them a moment before the first request
pub const PORT_SETTLE: Duration = Duration::from_millis(500);

/// Port to open: the configured one, else the first the OS reports
pub fn resolve_port(config: &SessionConfig) -> anyhow::Result<String> {
    if let Some(name) = &config.port_name {
        return Ok(name.clone());
    }
    let ports = SerialInterface::available_ports().context("Failed to list serial ports")?;
    for port in &ports {
        log::info!(
            "Found port {} ({})",
            port.port_name,
            port.product.as_deref().unwrap_or("unknown device")
        );
    }
    ports
        .into_iter()
        .next()
        .map(|p| p.port_name)
        .ok_or_else(|| anyhow!("No serial ports found; set port_name in the config"))
}

/// Sinks for one session, each behind its own queue
pub fn build_sinks(config: &SessionConfig) -> anyhow::Result<Vec<Box<dyn SampleSink>>> {
    let (rows, cols) = config.grid();
    let capacity = config.sink_queue_capacity;
    let mut sinks: Vec<Box<dyn SampleSink>> = Vec::new();

    sinks.push(Box::new(QueuedSink::spawn(Box::new(LogSink::new()), capacity)));

    if let Some(dir) = &config.log_dir {
        let csv = CsvSink::create_in(dir, rows, cols)
            .with_context(|| format!("Failed to create CSV log in {}", dir.display()))?;
        sinks.push(Box::new(QueuedSink::spawn(Box::new(csv), capacity)));
    }

    Ok(sinks)
}

/// Wire a driver around an already-open transport
pub fn build_driver(
    config: &SessionConfig,
    transport: Box<dyn Transport>,
    sinks: Vec<Box<dyn SampleSink>>,
) -> PollDriver {
    let (rows, cols) = config.grid();
    let timing = DriverTiming {
        poll_interval: config.poll_interval(),
        response_timeout: config.response_timeout(),
    };
    let mut driver = PollDriver::new(transport, config.protocol, MatrixBuffer::new(rows, cols), timing);
    for sink in sinks {
        driver.add_sink(sink);
    }
    driver
}

/// Open the port, log until `shutdown` resolves, then release everything.
///
/// Failing to open the port is the only startup error; the sinks created
/// beforehand are closed before it is returned.
pub async fn run_session<F>(config: SessionConfig, shutdown: F) -> anyhow::Result<DriverReport>
where
    F: Future<Output = ()>,
{
    config.validate().context("Invalid session config")?;
    let port_name = resolve_port(&config)?;
    let mut sinks = build_sinks(&config)?;

    let mut interface = SerialInterface::new();
    if let Err(e) = interface.connect(&port_name, config.baud_rate, config.read_timeout()) {
        for sink in sinks.iter_mut() {
            if let Err(close_err) = sink.close().await {
                log::warn!("Failed to close sink '{}': {}", sink.name(), close_err);
            }
        }
        return Err(e).with_context(|| format!("Failed to open {}", port_name));
    }

    tokio::time::sleep(PORT_SETTLE).await;

    let driver = build_driver(&config, Box::new(interface), sinks);
    let handle = DriverHandle::spawn(driver);
    let report = handle
        .run_until(shutdown)
        .await
        .ok_or_else(|| anyhow!("Poll loop did not shut down cleanly"))?;

    if let Some(err) = &report.transport_error {
        log::error!("Session ended on transport failure: {}", err);
    }
    Ok(report)
}
