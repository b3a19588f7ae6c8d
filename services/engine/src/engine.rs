//! Round engine: one active round per table behind a single async lock
//!
//! Every phase change happens inside [`RoundEngine::advance`], and bets and
//! cashouts are validated under the same lock. A cashout that reaches the lock
//! after the crash tick therefore always sees `CRASHED`.

use chrono::{DateTime, Utc};
use shared::types::{Address, Amount, Multiplier, RoundId};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::broadcaster::{Broadcaster, CrashVerification, EngineEvent};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::errors::{EngineError, Result};
use crate::fairness::{FairnessGenerator, VerificationReport};
use crate::history::{HistoryEntry, HistoryStore};
use crate::ledger::Bet;
use crate::round::{Phase, Round, RoundSnapshot};
use crate::settlement_worker::{LossSender, LossSettlement};

#[derive(Default)]
struct EngineState {
    round: Option<Round>,
    rounds_started: u64,
}

/// Work left over after a transition, done once the round lock is released
#[derive(Default)]
struct Settled {
    history: Option<HistoryEntry>,
}

pub struct RoundEngine {
    config: EngineConfig,
    fairness: FairnessGenerator,
    clock: Arc<dyn Clock>,
    state: Mutex<EngineState>,
    broadcaster: Broadcaster,
    history: Arc<HistoryStore>,
    losses: LossSender,
}

impl RoundEngine {
    pub fn new(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        broadcaster: Broadcaster,
        history: Arc<HistoryStore>,
        losses: LossSender,
    ) -> Result<Self> {
        config.validate()?;
        let fairness = FairnessGenerator::new(config.house_edge_bps, config.growth.clone())?;

        Ok(Self {
            config,
            fairness,
            clock,
            state: Mutex::new(EngineState::default()),
            broadcaster,
            history,
            losses,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    /// Open the first round if none is active; returns the current snapshot
    ///
    /// Numbering continues after the highest round already in history.
    pub async fn start(&self) -> Result<RoundSnapshot> {
        let mut state = self.state.lock().await;
        if let Some(round) = state.round.as_ref() {
            return Ok(round.snapshot());
        }
        let restored = self.history.last_round_number().await;
        if restored > state.rounds_started {
            info!(last_round = restored, "Continuing round numbering from history");
            state.rounds_started = restored;
        }
        let now = self.clock.now();
        self.open_round(&mut state, now)
    }

    /// Apply at most one transition for the current clock reading
    ///
    /// Returns the phase entered, or `None` when the round only ticked or is
    /// still waiting on a timer.
    pub async fn advance(&self) -> Result<Option<Phase>> {
        let mut settled = Settled::default();
        let entered = {
            let mut state = self.state.lock().await;
            let now = self.clock.now();
            self.transition(&mut state, now, &mut settled)?
        };

        if let Some(entry) = settled.history {
            self.history.append(entry).await;
        }
        Ok(entered)
    }

    fn transition(
        &self,
        state: &mut EngineState,
        now: DateTime<Utc>,
        settled: &mut Settled,
    ) -> Result<Option<Phase>> {
        let phase = match state.round.as_ref() {
            Some(round) => round.phase,
            None => {
                self.open_round(state, now)?;
                return Ok(Some(Phase::Betting));
            }
        };

        match phase {
            Phase::Betting => {
                let Some(round) = state.round.as_mut() else {
                    return Ok(None);
                };
                if now < round.betting_closes_at {
                    return Ok(None);
                }
                round.phase = Phase::Running;
                round.running_started_at = Some(now);
                round.current_multiplier = self.config.growth.multiplier_at(0);

                info!(
                    round_id = %round.id,
                    round_number = round.number,
                    bets = round.ledger.len(),
                    phase = %round.phase,
                    "Betting closed, round running"
                );
                self.publish_state(round);
                Ok(Some(Phase::Running))
            }
            Phase::Running => {
                let Some(round) = state.round.as_mut() else {
                    return Ok(None);
                };
                let started = round.running_started_at.unwrap_or(round.betting_closes_at);
                let multiplier = self
                    .config
                    .growth
                    .multiplier_at((now - started).num_milliseconds());

                if multiplier >= round.outcome.crash_point {
                    settled.history = self.crash(round, now);
                    return Ok(Some(Phase::Crashed));
                }

                round.current_multiplier = multiplier;
                self.broadcaster.publish(EngineEvent::Tick { multiplier });
                Ok(None)
            }
            Phase::Crashed => {
                let Some(round) = state.round.as_mut() else {
                    return Ok(None);
                };
                round.phase = Phase::Cooldown;
                debug!(round_id = %round.id, phase = %round.phase, "Cooldown started");
                self.publish_state(round);
                Ok(Some(Phase::Cooldown))
            }
            Phase::Cooldown => {
                let ends_at = state.round.as_ref().and_then(|round| round.cooldown_ends_at);
                if ends_at.map_or(false, |ends_at| now < ends_at) {
                    return Ok(None);
                }
                self.open_round(state, now)?;
                Ok(Some(Phase::Betting))
            }
        }
    }

    /// RUNNING -> CRASHED: reveal, settle losses, freeze into history
    fn crash(&self, round: &mut Round, now: DateTime<Utc>) -> Option<HistoryEntry> {
        round.phase = Phase::Crashed;
        round.current_multiplier = round.outcome.crash_point;
        round.crashed_at = Some(now);
        round.cooldown_ends_at = Some(now + self.config.cooldown());

        for bet in round.ledger.settle_losses() {
            let settlement = LossSettlement {
                round_id: round.id,
                round_number: round.number,
                address: bet.address,
                amount: bet.amount,
                settled_at: now,
            };
            if let Err(e) = self.losses.send(settlement) {
                warn!(round_id = %round.id, error = %e, "Loss settlement channel closed");
            }
        }

        info!(
            round_id = %round.id,
            round_number = round.number,
            crash_point = round.outcome.crash_point,
            bets = round.ledger.len(),
            phase = %round.phase,
            "Round crashed"
        );

        self.broadcaster.publish(EngineEvent::Crash {
            round_id: round.id,
            crash_point_display: round.outcome.crash_point_display,
            server_seed: round.outcome.seed.to_hex(),
            commit_hash: round.outcome.commit_hash.clone(),
            verify: CrashVerification {
                derived_hash: round.outcome.derived_hash.clone(),
                u: round.outcome.u,
                crash_point: round.outcome.crash_point,
            },
        });
        self.publish_state(round);

        HistoryEntry::from_round(round)
    }

    fn open_round(&self, state: &mut EngineState, now: DateTime<Utc>) -> Result<RoundSnapshot> {
        let id = RoundId::new();
        let outcome = self.fairness.draw(&id)?;
        let number = state.rounds_started + 1;

        let round = Round::open(
            id,
            number,
            outcome,
            self.config.house_edge_bps,
            now,
            self.config.betting_window(),
            self.config.growth.multiplier_at(0),
        );

        info!(
            round_id = %round.id,
            round_number = number,
            commit_hash = %round.outcome.commit_hash,
            phase = %round.phase,
            "New round opened"
        );
        metrics::counter!("crash_rounds_total").increment(1);

        self.broadcaster.publish(EngineEvent::NewRound {
            round_id: round.id,
            round_number: number,
            commit_hash: round.outcome.commit_hash.clone(),
            starts_at: round.created_at,
            betting_closes_at: round.betting_closes_at,
        });
        let snapshot = round.snapshot();
        self.broadcaster
            .publish(EngineEvent::State(Box::new(snapshot.clone())));

        state.rounds_started = number;
        state.round = Some(round);
        Ok(snapshot)
    }

    fn publish_state(&self, round: &Round) {
        self.broadcaster
            .publish(EngineEvent::State(Box::new(round.snapshot())));
    }

    pub async fn can_bet(&self, address: &str) -> bool {
        let Ok(address) = Address::new(address) else {
            return false;
        };
        let state = self.state.lock().await;
        state
            .round
            .as_ref()
            .map_or(false, |round| round.ledger.can_bet(round.phase, &address))
    }

    /// Accept a stake for the current round; the first bet per address wins
    pub async fn register_bet(&self, address: &str, amount: u64) -> Result<Bet> {
        let address = Address::new(address)?;
        let amount = Amount::stake(amount)?;

        let mut state = self.state.lock().await;
        let now = self.clock.now();
        let round = state.round.as_mut().ok_or(EngineError::NoActiveRound)?;
        let bet = round.ledger.register_bet(round.phase, address, amount, now)?;

        debug!(
            round_id = %round.id,
            address = %bet.address,
            amount = bet.amount.as_u64(),
            "Bet accepted"
        );
        metrics::counter!("crash_bets_total").increment(1);
        self.broadcaster.publish(EngineEvent::Bet {
            address: bet.address.clone(),
            amount: bet.amount,
            placed_at: bet.placed_at,
        });
        Ok(bet)
    }

    /// Lock in the multiplier of the last tick
    pub async fn register_cashout(&self, address: &str) -> Result<Bet> {
        let address = Address::new(address)?;

        let mut state = self.state.lock().await;
        let round = state.round.as_mut().ok_or(EngineError::NoActiveRound)?;
        let multiplier = Multiplier::from_f64(round.current_multiplier)?;
        let bet = round
            .ledger
            .register_cashout(round.phase, &address, multiplier)?;

        debug!(
            round_id = %round.id,
            address = %bet.address,
            multiplier = %multiplier,
            payout = bet.payout.as_u64(),
            "Cashout accepted"
        );
        metrics::counter!("crash_cashouts_total").increment(1);
        self.broadcaster.publish(EngineEvent::Cashout {
            address: bet.address.clone(),
            multiplier: multiplier.to_f64(),
            payout: bet.payout,
        });
        Ok(bet)
    }

    pub async fn snapshot(&self) -> Option<RoundSnapshot> {
        self.state.lock().await.round.as_ref().map(Round::snapshot)
    }

    pub async fn phase(&self) -> Option<Phase> {
        self.state.lock().await.round.as_ref().map(Round::phase)
    }

    /// Replay the fairness proof of a round still in the history window
    pub async fn verify(&self, round_id: &RoundId) -> Result<VerificationReport> {
        let entry = self
            .history
            .find(round_id)
            .await
            .ok_or(EngineError::RoundNotFound(*round_id))?;
        Ok(self.fairness.verify(&entry.proof()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::settlement_worker::loss_channel;

    fn engine() -> (RoundEngine, ManualClock) {
        let clock = ManualClock::default();
        let (tx, _rx) = loss_channel();
        let engine = RoundEngine::new(
            EngineConfig::default(),
            Arc::new(clock.clone()),
            Broadcaster::default(),
            Arc::new(HistoryStore::in_memory(50)),
            tx,
        )
        .unwrap();
        (engine, clock)
    }

    #[tokio::test]
    async fn test_start_opens_betting_round() {
        let (engine, _clock) = engine();
        let snapshot = engine.start().await.unwrap();
        assert_eq!(snapshot.phase, Phase::Betting);
        assert_eq!(snapshot.round_number, 1);
        assert!(snapshot.server_seed.is_none());

        // idempotent
        let again = engine.start().await.unwrap();
        assert_eq!(again.round_id, snapshot.round_id);
    }

    #[tokio::test]
    async fn test_numbering_continues_after_restart() {
        let clock = ManualClock::default();
        let history = Arc::new(HistoryStore::in_memory(50));
        let (tx, _rx) = loss_channel();
        let first = RoundEngine::new(
            EngineConfig::default(),
            Arc::new(clock.clone()),
            Broadcaster::default(),
            history.clone(),
            tx.clone(),
        )
        .unwrap();
        first.start().await.unwrap();
        clock.advance_ms(10_000);
        first.advance().await.unwrap();
        while first.phase().await != Some(Phase::Crashed) {
            clock.advance_ms(50);
            first.advance().await.unwrap();
        }
        assert_eq!(history.last_round_number().await, 1);

        // a fresh engine over the same audit window
        let second = RoundEngine::new(
            EngineConfig::default(),
            Arc::new(clock.clone()),
            Broadcaster::default(),
            history,
            tx,
        )
        .unwrap();
        assert_eq!(second.start().await.unwrap().round_number, 2);
    }

    #[tokio::test]
    async fn test_betting_waits_for_window() {
        let (engine, clock) = engine();
        engine.start().await.unwrap();

        clock.advance_ms(9_999);
        assert_eq!(engine.advance().await.unwrap(), None);
        clock.advance_ms(1);
        assert_eq!(engine.advance().await.unwrap(), Some(Phase::Running));
    }

    #[tokio::test]
    async fn test_operations_without_round() {
        let (engine, _clock) = engine();
        assert_eq!(
            engine.register_bet("alice", 10).await.unwrap_err(),
            EngineError::NoActiveRound
        );
        assert!(!engine.can_bet("alice").await);
    }

    #[tokio::test]
    async fn test_invalid_inputs_rejected() {
        let (engine, _clock) = engine();
        engine.start().await.unwrap();
        assert!(matches!(
            engine.register_bet("alice", 0).await,
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            engine.register_bet("   ", 10).await,
            Err(EngineError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.house_edge_bps = -10;
        let (tx, _rx) = loss_channel();
        let result = RoundEngine::new(
            config,
            Arc::new(ManualClock::default()),
            Broadcaster::default(),
            Arc::new(HistoryStore::in_memory(50)),
            tx,
        );
        assert!(matches!(result, Err(EngineError::Configuration { .. })));
    }
}
