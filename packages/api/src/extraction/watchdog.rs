use std::time::Duration;

use serde::Serialize;
use tokio::{sync::mpsc, time::Instant};

use super::ExtractionGate;

/// Failures the process cannot recover from in place. The supervisor stops serving
/// when it receives one so the process manager can restart the gateway.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FatalError {
    #[error("extraction still running after {0:?}, gate is considered stuck")]
    ExtractionStuck(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    pub poll_interval: Duration,
    pub max_duration: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_duration: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtractionStatus {
    pub extracting: bool,
}

#[derive(Debug, Clone)]
pub struct ExtractionWatchdog {
    gate: ExtractionGate,
    config: WatchdogConfig,
    fatal: mpsc::UnboundedSender<FatalError>,
}

impl ExtractionWatchdog {
    pub fn new(
        gate: ExtractionGate,
        config: WatchdogConfig,
        fatal: mpsc::UnboundedSender<FatalError>,
    ) -> Self {
        Self {
            gate,
            config,
            fatal,
        }
    }

    /// Returns immediately. While an extraction runs, every call starts one more
    /// monitor; redundant monitors are harmless since they only read the gate.
    ///
    /// A monitor follows the gate, not one extraction. If an extraction ends and
    /// the next one starts within a single poll interval, the monitor keeps the
    /// first start time and can fire early against the second.
    pub fn check_status(&self) -> ExtractionStatus {
        let extracting = self.gate.is_extracting();
        if extracting {
            self.spawn_monitor();
        }
        ExtractionStatus { extracting }
    }

    fn spawn_monitor(&self) {
        let gate = self.gate.clone();
        let config = self.config;
        let fatal = self.fatal.clone();

        tokio::spawn(async move {
            let started = Instant::now();
            tracing::debug!(?config, "Extraction monitor started");

            loop {
                tokio::time::sleep(config.poll_interval).await;

                if !gate.is_extracting() {
                    tracing::debug!("Extraction finished, monitor exiting");
                    return;
                }

                let elapsed = started.elapsed();
                if elapsed >= config.max_duration {
                    tracing::error!(
                        elapsed_secs = elapsed.as_secs(),
                        "Extraction gate stuck, requesting restart"
                    );
                    if fatal.send(FatalError::ExtractionStuck(elapsed)).is_err() {
                        tracing::error!("Supervisor is gone, fatal error dropped");
                    }
                    return;
                }
            }
        });
    }
}
