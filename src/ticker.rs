use crate::config::TickerConfig;
use crate::error::BoxError;
use crate::service::Lifecycle;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum TickerError {
    #[error("Ticker startup failed: {0}")]
    Startup(String),

    #[error("Tick loop ended abnormally: {0}")]
    Loop(String),
}

/// Periodic timer service driven by the lifecycle controller
pub struct TickerService {
    config: TickerConfig,
    fail_start: bool,
    ticks: Arc<AtomicU64>,
    cancellation_token: CancellationToken,
    tick_task: Mutex<Option<JoinHandle<()>>>,
}

impl TickerService {
    pub fn new(config: TickerConfig) -> Self {
        Self {
            config,
            fail_start: false,
            ticks: Arc::new(AtomicU64::new(0)),
            cancellation_token: CancellationToken::new(),
            tick_task: Mutex::new(None),
        }
    }

    /// Make `do_start` fail after its startup delay
    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Number of ticks emitted so far
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    async fn shutdown_loop(&self) -> Result<(), TickerError> {
        self.cancellation_token.cancel();

        let handle = self.tick_task.lock().take();
        match handle {
            Some(handle) => handle
                .await
                .map_err(|e| TickerError::Loop(e.to_string())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Lifecycle for TickerService {
    async fn do_start(&self) -> Result<(), BoxError> {
        info!("Starting ticker with interval {:?}", self.config.interval());

        tokio::select! {
            _ = sleep(self.config.start_delay()) => {}
            _ = self.cancellation_token.cancelled() => {
                debug!("Ticker startup interrupted");
                return Ok(());
            }
        }

        if self.fail_start {
            return Err(Box::new(TickerError::Startup(
                "startup failure requested".to_string(),
            )));
        }

        let token = self.cancellation_token.clone();
        let ticks = Arc::clone(&self.ticks);
        let period = self.config.interval();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let count = ticks.fetch_add(1, Ordering::Relaxed) + 1;
                        info!("Tick {}", count);
                    }
                    _ = token.cancelled() => {
                        debug!("Tick loop cancelled");
                        break;
                    }
                }
            }
        });

        *self.tick_task.lock() = Some(handle);
        Ok(())
    }

    async fn do_stop(&self) -> Result<(), BoxError> {
        info!("Stopping ticker after {} ticks", self.ticks());
        self.shutdown_loop().await?;
        Ok(())
    }

    async fn do_cancel(&self) -> Result<(), BoxError> {
        warn!("Ticker stopped before it was running");
        self.shutdown_loop().await?;
        Ok(())
    }

    fn cancel_requested(&self) {
        self.cancellation_token.cancel();
    }
}
