//! Provably-fair crash round engine
//!
//! [`RoundEngine`] owns the live round. [`EngineScheduler`] advances it on a
//! tick, [`Broadcaster`] fans events out, [`HistoryStore`] keeps the audit
//! window, and [`SettlementWorker`] drains losses.

pub mod broadcaster;
pub mod clock;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fairness;
pub mod history;
pub mod ledger;
pub mod round;
pub mod scheduler;
pub mod settlement_worker;

pub use broadcaster::{Broadcaster, EngineEvent};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::RoundEngine;
pub use errors::{EngineError, Result};
pub use history::{HistoryEntry, HistoryStore};
pub use ledger::Bet;
pub use round::{Phase, RoundSnapshot};
pub use scheduler::EngineScheduler;
pub use settlement_worker::{LossHandler, LossSettlement, SettlementWorker};
