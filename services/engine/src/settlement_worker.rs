//! Loss settlement worker
//!
//! The engine enqueues one [`LossSettlement`] per uncashed bet when a round
//! crashes. The worker drains the channel off the round's critical path and
//! hands each record to a [`LossHandler`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::types::{Address, Amount, RoundId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LossSettlement {
    pub round_id: RoundId,
    pub round_number: u64,
    pub address: Address,
    pub amount: Amount,
    pub settled_at: DateTime<Utc>,
}

pub type LossSender = mpsc::UnboundedSender<LossSettlement>;
pub type LossReceiver = mpsc::UnboundedReceiver<LossSettlement>;

pub fn loss_channel() -> (LossSender, LossReceiver) {
    mpsc::unbounded_channel()
}

/// Consumer of settled losses (wallet debit, ledger write, ...)
#[async_trait]
pub trait LossHandler: Send + Sync {
    async fn handle(&self, settlement: &LossSettlement) -> anyhow::Result<()>;
}

/// Logs and counts every loss
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingLossHandler;

#[async_trait]
impl LossHandler for LoggingLossHandler {
    async fn handle(&self, settlement: &LossSettlement) -> anyhow::Result<()> {
        info!(
            round_id = %settlement.round_id,
            round_number = settlement.round_number,
            address = %settlement.address,
            amount = settlement.amount.as_u64(),
            "Bet settled as loss"
        );
        metrics::counter!("crash_losses_total").increment(1);
        Ok(())
    }
}

pub struct SettlementWorker {
    receiver: LossReceiver,
    handler: Arc<dyn LossHandler>,
}

impl SettlementWorker {
    pub fn new(receiver: LossReceiver, handler: Arc<dyn LossHandler>) -> Self {
        Self { receiver, handler }
    }

    /// Runs until the channel closes or `cancel` fires; queued records are drained first
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Settlement worker started");

        loop {
            let settlement = tokio::select! {
                biased;
                next = self.receiver.recv() => match next {
                    Some(settlement) => settlement,
                    None => {
                        warn!("Loss channel closed, settlement worker shutting down");
                        return;
                    }
                },
                _ = cancel.cancelled() => break,
            };
            self.process(settlement).await;
        }

        self.receiver.close();
        while let Some(settlement) = self.receiver.recv().await {
            self.process(settlement).await;
        }
        info!("Settlement worker stopped");
    }

    async fn process(&self, settlement: LossSettlement) {
        if let Err(e) = self.handler.handle(&settlement).await {
            error!(
                round_id = %settlement.round_id,
                address = %settlement.address,
                error = %e,
                "Loss settlement failed"
            );
            metrics::counter!("errors_total", "category" => "loss_settlement").increment(1);
        }
    }
}
