//! Pari-mutuel pot settlement
//!
//! Splits the pooled stakes of one market+outcome among the entries that match
//! the winning identity. Every unit of the pot ends up in exactly one of
//! `payouts`, `house_take` or `carryover`:
//!
//! `sum(payouts) + house_take + carryover == pot`
//!
//! Pots are `u128`, so any number of `u64` stakes can be summed without overflow.
//! Shares are computed with a 256-bit intermediate product.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::constants::{BPS_DENOMINATOR, NO_WINNER_HOUSE_TAKE_BPS};

/// One participant's stake in a pooled market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeEntry {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    pub amount: u64,
}

impl StakeEntry {
    pub fn by_id(user_id: impl Into<String>, amount: u64) -> Self {
        Self {
            user_id: Some(user_id.into()),
            display_name: None,
            amount,
        }
    }

    pub fn by_name(display_name: impl Into<String>, amount: u64) -> Self {
        Self {
            user_id: None,
            display_name: Some(display_name.into()),
            amount,
        }
    }

    /// Aggregation key: the user id, else the normalized display name
    pub fn user_key(&self) -> String {
        match (&self.user_id, &self.display_name) {
            (Some(id), _) => id.clone(),
            (None, Some(name)) => normalize_display_name(name),
            (None, None) => String::new(),
        }
    }
}

/// Identity of the winning participant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WinnerIdentity {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl WinnerIdentity {
    /// When both sides carry an id, the id decides; otherwise the normalized
    /// display names must be equal and non-empty.
    pub fn matches(&self, entry: &StakeEntry) -> bool {
        if let (Some(winner_id), Some(entry_id)) = (&self.user_id, &entry.user_id) {
            return winner_id == entry_id;
        }

        match (&self.display_name, &entry.display_name) {
            (Some(winner_name), Some(entry_name)) => {
                let winner_name = normalize_display_name(winner_name);
                !winner_name.is_empty() && winner_name == normalize_display_name(entry_name)
            }
            _ => false,
        }
    }
}

/// Lowercased, `@`-stripped, whitespace-collapsed form of a display name
pub fn normalize_display_name(name: &str) -> String {
    name.trim()
        .trim_start_matches('@')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    Paid,
    NoWinners,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payout {
    pub user: String,
    pub stake: u128,
    pub amount: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementResult {
    pub pot: u128,
    /// Ordered by descending aggregated stake, ties by first appearance
    pub payouts: Vec<Payout>,
    pub house_take: u128,
    pub carryover: u128,
    pub status: SettlementStatus,
}

impl SettlementResult {
    pub fn total_paid(&self) -> u128 {
        self.payouts.iter().map(|p| p.amount).sum()
    }

    pub fn payout_for(&self, user: &str) -> Option<u128> {
        self.payouts.iter().find(|p| p.user == user).map(|p| p.amount)
    }

    /// Conservation check: nothing created, nothing lost
    pub fn is_conserved(&self) -> bool {
        self.total_paid() + self.house_take + self.carryover == self.pot
    }
}

/// Settle one market+outcome pool
///
/// With no matching winner the pot is split 50% house, 50% carryover; the
/// rounding remainder of the house share favours carryover.
pub fn settle(stakes: &[StakeEntry], winner: &WinnerIdentity) -> SettlementResult {
    let live: Vec<&StakeEntry> = stakes.iter().filter(|s| s.amount > 0).collect();
    let pot: u128 = live.iter().map(|s| s.amount as u128).sum();

    if pot == 0 {
        return SettlementResult {
            pot: 0,
            payouts: Vec::new(),
            house_take: 0,
            carryover: 0,
            status: SettlementStatus::Paid,
        };
    }

    // Aggregate winning stake per user, remembering first appearance
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut winners: Vec<(String, u128)> = Vec::new();
    for entry in live.iter().filter(|s| winner.matches(s)) {
        let key = entry.user_key();
        match index.get(&key) {
            Some(&i) => winners[i].1 += entry.amount as u128,
            None => {
                index.insert(key.clone(), winners.len());
                winners.push((key, entry.amount as u128));
            }
        }
    }

    if winners.is_empty() {
        let house_take = mul_div_floor(
            pot,
            NO_WINNER_HOUSE_TAKE_BPS as u128,
            BPS_DENOMINATOR as u128,
        );
        return SettlementResult {
            pot,
            payouts: Vec::new(),
            house_take,
            carryover: pot - house_take,
            status: SettlementStatus::NoWinners,
        };
    }

    // Stable sort keeps insertion order among equal stakes
    winners.sort_by(|a, b| b.1.cmp(&a.1));

    let total_winning: u128 = winners.iter().map(|(_, stake)| stake).sum();
    let mut payouts: Vec<Payout> = winners
        .into_iter()
        .map(|(user, stake)| Payout {
            amount: mul_div_floor(pot, stake, total_winning),
            user,
            stake,
        })
        .collect();

    let distributed: u128 = payouts.iter().map(|p| p.amount).sum();
    let mut remainder = pot - distributed;
    let n = payouts.len();
    let mut cursor = 0usize;
    while remainder > 0 {
        payouts[cursor % n].amount += 1;
        remainder -= 1;
        cursor += 1;
    }

    SettlementResult {
        pot,
        payouts,
        house_take: 0,
        carryover: 0,
        status: SettlementStatus::Paid,
    }
}

/// `floor(a * b / c)` for `b <= c`, exact over the whole `u128` range
fn mul_div_floor(a: u128, b: u128, c: u128) -> u128 {
    let (hi, lo) = widening_mul(a, b);
    if hi == 0 {
        return lo / c;
    }

    // Shift-subtract division of the 256-bit product. `b <= c` keeps `hi < c`,
    // so the quotient fits in 128 bits.
    let mut rem = hi;
    let mut quotient = 0u128;
    for bit in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> bit) & 1);
        quotient <<= 1;
        if carry == 1 || rem >= c {
            rem = rem.wrapping_sub(c);
            quotient |= 1;
        }
    }
    quotient
}

/// Full 256-bit product as `(high, low)` halves
fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = u64::MAX as u128;
    let (a1, a0) = (a >> 64, a & MASK);
    let (b1, b0) = (b >> 64, b & MASK);

    let p00 = a0 * b0;
    let p01 = a0 * b1;
    let p10 = a1 * b0;
    let p11 = a1 * b1;

    let mid = (p00 >> 64) + (p01 & MASK) + (p10 & MASK);
    let lo = (p00 & MASK) | (mid << 64);
    let hi = p11 + (p01 >> 64) + (p10 >> 64) + (mid >> 64);
    (hi, lo)
}

/// A stake tagged with the market and outcome it was placed on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketStake {
    pub market_id: String,
    pub outcome: String,
    #[serde(flatten)]
    pub entry: StakeEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSettlement {
    pub market_id: String,
    pub outcome: String,
    pub result: SettlementResult,
}

/// Group stakes by market+outcome (first-seen order) and settle each group
///
/// Markets without a resolved winner are left out; they stay open for the caller.
pub fn settle_markets(
    stakes: &[MarketStake],
    winners: &HashMap<String, WinnerIdentity>,
) -> Vec<MarketSettlement> {
    let mut order: Vec<(String, String)> = Vec::new();
    let mut groups: HashMap<(String, String), Vec<StakeEntry>> = HashMap::new();

    for stake in stakes {
        let key = (stake.market_id.clone(), stake.outcome.clone());
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(stake.entry.clone());
    }

    order
        .into_iter()
        .filter_map(|key| {
            let winner = winners.get(&key.0)?;
            let entries = groups.remove(&key)?;
            Some(MarketSettlement {
                result: settle(&entries, winner),
                market_id: key.0,
                outcome: key.1,
            })
        })
        .collect()
}
