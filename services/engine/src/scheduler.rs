use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::engine::RoundEngine;
use crate::round::Phase;

/// Drives [`RoundEngine::advance`] on a fixed tick
pub struct EngineScheduler {
    engine: Arc<RoundEngine>,
    tick: Duration,
}

impl EngineScheduler {
    pub fn new(engine: Arc<RoundEngine>) -> Self {
        let tick = engine.config().tick_interval();
        Self { engine, tick }
    }

    /// Tick until cancelled. A round that is already running is played out to
    /// its crash before returning.
    pub async fn run(self, cancel: CancellationToken) {
        info!(tick_ms = self.tick.as_millis() as u64, "Engine scheduler started");

        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.step().await,
            }
        }

        while self.engine.phase().await == Some(Phase::Running) {
            ticker.tick().await;
            self.step().await;
        }
        info!("Engine scheduler stopped");
    }

    async fn step(&self) {
        if let Err(e) = self.engine.advance().await {
            error!(error = %e, code = e.code().as_str(), "Round transition failed");
            metrics::counter!("errors_total", "category" => e.category().as_str()).increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcaster::Broadcaster;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::history::HistoryStore;
    use crate::settlement_worker::loss_channel;

    #[tokio::test]
    async fn test_scheduler_opens_round_and_stops() {
        let mut config = EngineConfig::default();
        config.timing.tick_interval_ms = 1;
        let (tx, _rx) = loss_channel();
        let engine = Arc::new(
            RoundEngine::new(
                config,
                Arc::new(ManualClock::default()),
                Broadcaster::default(),
                Arc::new(HistoryStore::in_memory(50)),
                tx,
            )
            .unwrap(),
        );

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(EngineScheduler::new(engine.clone()).run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;

        // frozen clock: the round stays open for bets
        assert_eq!(engine.phase().await, Some(Phase::Betting));
        cancel.cancel();
        handle.await.unwrap();
    }
}
