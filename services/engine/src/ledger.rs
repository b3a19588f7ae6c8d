//! Per-round bet bookkeeping
//!
//! The ledger never reads the clock or the phase on its own; the engine passes
//! both in while holding the round lock, so every check here is evaluated
//! against the same `(phase, multiplier)` pair a tick would see.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::types::{Address, Amount, Multiplier};
use std::collections::HashMap;

use crate::errors::{EngineError, Result};
use crate::round::Phase;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bet {
    pub address: Address,
    pub amount: Amount,
    pub placed_at: DateTime<Utc>,
    pub cashed_out: bool,
    pub cashout_multiplier: Option<Multiplier>,
    /// Zero until cashed out; stays zero for a loss
    pub payout: Amount,
}

impl Bet {
    fn new(address: Address, amount: Amount, placed_at: DateTime<Utc>) -> Self {
        Self {
            address,
            amount,
            placed_at,
            cashed_out: false,
            cashout_multiplier: None,
            payout: Amount::ZERO,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BetLedger {
    bets: Vec<Bet>,
    index: HashMap<Address, usize>,
    losses_settled: bool,
}

impl BetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_bet(&self, phase: Phase, address: &Address) -> bool {
        phase == Phase::Betting && !self.index.contains_key(address)
    }

    /// First writer wins; a second bet for the same address is a conflict
    pub fn register_bet(
        &mut self,
        phase: Phase,
        address: Address,
        amount: Amount,
        placed_at: DateTime<Utc>,
    ) -> Result<Bet> {
        if phase != Phase::Betting {
            return Err(EngineError::WrongPhase {
                expected: Phase::Betting,
                actual: phase,
            });
        }
        if amount.is_zero() {
            return Err(shared::types::ValidationError::ZeroAmount.into());
        }
        if self.index.contains_key(&address) {
            return Err(EngineError::DuplicateBet { address });
        }

        let bet = Bet::new(address.clone(), amount, placed_at);
        self.index.insert(address, self.bets.len());
        self.bets.push(bet.clone());
        Ok(bet)
    }

    /// Lock in `multiplier` for the address; payout is floored to whole base units
    pub fn register_cashout(
        &mut self,
        phase: Phase,
        address: &Address,
        multiplier: Multiplier,
    ) -> Result<Bet> {
        let slot = *self.index.get(address).ok_or_else(|| EngineError::NoBet {
            address: address.clone(),
        })?;
        let bet = &mut self.bets[slot];

        if bet.cashed_out {
            return Err(EngineError::AlreadyCashedOut {
                address: address.clone(),
            });
        }
        if phase != Phase::Running {
            return Err(EngineError::WrongPhase {
                expected: Phase::Running,
                actual: phase,
            });
        }

        bet.payout = multiplier.apply(bet.amount)?;
        bet.cashout_multiplier = Some(multiplier);
        bet.cashed_out = true;
        Ok(bet.clone())
    }

    /// Uncashed bets, returned once; later calls yield nothing
    pub fn settle_losses(&mut self) -> Vec<Bet> {
        if self.losses_settled {
            return Vec::new();
        }
        self.losses_settled = true;
        self.bets.iter().filter(|bet| !bet.cashed_out).cloned().collect()
    }

    pub fn get(&self, address: &Address) -> Option<&Bet> {
        self.index.get(address).map(|slot| &self.bets[*slot])
    }

    /// Bets in placement order
    pub fn bets(&self) -> &[Bet] {
        &self.bets
    }

    pub fn len(&self) -> usize {
        self.bets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bets.is_empty()
    }
}
