//! Fan-out of engine events to any number of subscribers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::types::{Address, Amount, RoundId};
use tokio::sync::broadcast;
use tracing::trace;

use crate::round::RoundSnapshot;

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashVerification {
    pub derived_hash: String,
    pub u: u64,
    pub crash_point: f64,
}

/// Outbound events, tagged by `type` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    #[serde(rename_all = "camelCase")]
    NewRound {
        round_id: RoundId,
        round_number: u64,
        commit_hash: String,
        starts_at: DateTime<Utc>,
        betting_closes_at: DateTime<Utc>,
    },

    Tick { multiplier: f64 },

    #[serde(rename_all = "camelCase")]
    Bet {
        address: Address,
        amount: Amount,
        placed_at: DateTime<Utc>,
    },

    Cashout {
        address: Address,
        multiplier: f64,
        payout: Amount,
    },

    #[serde(rename_all = "camelCase")]
    Crash {
        round_id: RoundId,
        crash_point_display: f64,
        server_seed: String,
        commit_hash: String,
        verify: CrashVerification,
    },

    State(Box<RoundSnapshot>),
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::NewRound { .. } => "newRound",
            EngineEvent::Tick { .. } => "tick",
            EngineEvent::Bet { .. } => "bet",
            EngineEvent::Cashout { .. } => "cashout",
            EngineEvent::Crash { .. } => "crash",
            EngineEvent::State(_) => "state",
        }
    }
}

/// Non-blocking publisher; events sent with no subscriber are dropped
#[derive(Debug, Clone)]
pub struct Broadcaster {
    tx: broadcast::Sender<EngineEvent>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: EngineEvent) {
        let name = event.name();
        if let Err(e) = self.tx.send(event) {
            trace!(event = name, error = %e, "No subscribers for event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let broadcaster = Broadcaster::default();
        let mut first = broadcaster.subscribe();
        let mut second = broadcaster.subscribe();

        broadcaster.publish(EngineEvent::Tick { multiplier: 1.25 });

        assert_eq!(first.recv().await.unwrap(), EngineEvent::Tick { multiplier: 1.25 });
        assert_eq!(second.recv().await.unwrap(), EngineEvent::Tick { multiplier: 1.25 });
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let broadcaster = Broadcaster::default();
        broadcaster.publish(EngineEvent::Tick { multiplier: 1.0 });
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_value(EngineEvent::NewRound {
            round_id: RoundId::new(),
            round_number: 3,
            commit_hash: "abc".into(),
            starts_at: Utc::now(),
            betting_closes_at: Utc::now(),
        })
        .unwrap();
        assert_eq!(json["type"], "newRound");
        assert_eq!(json["commitHash"], "abc");
        assert!(json.get("bettingClosesAt").is_some());

        let tick = serde_json::to_value(EngineEvent::Tick { multiplier: 2.0 }).unwrap();
        assert_eq!(tick["type"], "tick");
        assert_eq!(tick["multiplier"], 2.0);
    }
}
