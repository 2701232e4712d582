use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use super::Ingestor;
use crate::db::SourceStore;
use crate::error::{AppError, Result};
use crate::feed::DocumentFetcher;

/// Cooperative stop signal for the polling loop.
///
/// `Shutdown::never()` keeps the loop running until the process exits.
pub struct Shutdown {
    rx: Option<watch::Receiver<bool>>,
}

impl Shutdown {
    pub fn never() -> Self {
        Self { rx: None }
    }

    /// A shutdown that fires once `true` is sent on the returned sender.
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx: Some(rx) })
    }

    pub fn is_triggered(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    async fn triggered(&mut self) {
        let Some(rx) = self.rx.as_mut() else {
            return std::future::pending().await;
        };
        // A dropped sender can never fire, so it behaves like `never()`.
        let sender_gone = rx.wait_for(|stop| *stop).await.is_err();
        if sender_gone {
            std::future::pending::<()>().await;
        }
    }
}

/// Runs one ingestion cycle immediately and then one per tick.
///
/// Cycles never overlap. When a cycle outlasts the interval, the missed tick
/// is not queued: the next cycle starts as soon as the slow one ends and the
/// period is measured again from there.
pub struct Scheduler<S, F> {
    ingestor: Ingestor<S, F>,
    interval: Duration,
}

impl<S, F> Scheduler<S, F>
where
    S: SourceStore,
    F: DocumentFetcher,
{
    pub fn new(ingestor: Ingestor<S, F>, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(AppError::InvalidArgument(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(Self { ingestor, interval })
    }

    /// Poll until `shutdown` fires. A cycle in progress always completes.
    pub async fn run(&self, mut shutdown: Shutdown) {
        info!("Collecting feeds every {:?}", self.interval);

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.triggered() => break,
            }
            if shutdown.is_triggered() {
                break;
            }
            self.cycle().await;
        }

        info!("Scheduler stopped");
    }

    /// Poll forever.
    pub async fn run_forever(&self) {
        self.run(Shutdown::never()).await
    }

    async fn cycle(&self) {
        match self.ingestor.run_cycle().await {
            Ok(Some(report)) => {
                if let Some(err) = &report.error {
                    warn!("Cycle for source {} failed: {}", report.source_id, err);
                }
            }
            Ok(None) => {}
            Err(e) => error!("Error scraping feeds: {}", e),
        }
    }
}

/// Entry point for the aggregator daemon. Only returns on an invalid interval.
pub async fn run_scheduler<S, F>(ingestor: Ingestor<S, F>, interval: Duration) -> Result<()>
where
    S: SourceStore,
    F: DocumentFetcher,
{
    Scheduler::new(ingestor, interval)?.run_forever().await;
    Ok(())
}
