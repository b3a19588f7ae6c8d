use serde::Deserialize;
use shared::constants::*;
use std::env;
use std::time::Duration;

use crate::errors::EngineError;

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Signed so a negative value can be reported instead of failing to parse
    pub house_edge_bps: i64,
    pub timing: TimingConfig,
    pub growth: GrowthConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    pub betting_window_ms: u64,
    pub cooldown_ms: u64,
    pub tick_interval_ms: u64,
}

/// `multiplier(t) = clamp(base * e^(t / rate_secs), min_multiplier, max_multiplier)`
///
/// The same bounds clamp the crash point, so every crash point is reachable.
#[derive(Debug, Clone, Deserialize)]
pub struct GrowthConfig {
    pub base: f64,
    pub rate_secs: f64,
    pub min_multiplier: f64,
    pub max_multiplier: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    pub capacity: usize,
    pub flush_interval_ms: u64,
    pub redis_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            house_edge_bps: DEFAULT_HOUSE_EDGE_BPS,
            timing: TimingConfig {
                betting_window_ms: DEFAULT_BETTING_WINDOW_MS,
                cooldown_ms: DEFAULT_COOLDOWN_MS,
                tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            },
            growth: GrowthConfig::default(),
            history: HistoryConfig {
                capacity: HISTORY_CAPACITY,
                flush_interval_ms: 2_000,
                redis_url: None,
            },
        }
    }
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            base: DEFAULT_GROWTH_BASE,
            rate_secs: DEFAULT_GROWTH_RATE_SECS,
            min_multiplier: MIN_CRASH_POINT,
            max_multiplier: MAX_CRASH_POINT,
        }
    }
}

impl EngineConfig {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = EngineConfig {
            house_edge_bps: env::var("HOUSE_EDGE_BPS")
                .unwrap_or_else(|_| defaults.house_edge_bps.to_string())
                .parse()?,
            timing: TimingConfig {
                betting_window_ms: env::var("BETTING_WINDOW_MS")
                    .unwrap_or_else(|_| defaults.timing.betting_window_ms.to_string())
                    .parse()?,
                cooldown_ms: env::var("COOLDOWN_MS")
                    .unwrap_or_else(|_| defaults.timing.cooldown_ms.to_string())
                    .parse()?,
                tick_interval_ms: env::var("TICK_INTERVAL_MS")
                    .unwrap_or_else(|_| defaults.timing.tick_interval_ms.to_string())
                    .parse()?,
            },
            growth: GrowthConfig {
                base: env::var("GROWTH_BASE")
                    .unwrap_or_else(|_| defaults.growth.base.to_string())
                    .parse()?,
                rate_secs: env::var("GROWTH_RATE_SECS")
                    .unwrap_or_else(|_| defaults.growth.rate_secs.to_string())
                    .parse()?,
                min_multiplier: env::var("MIN_MULTIPLIER")
                    .unwrap_or_else(|_| defaults.growth.min_multiplier.to_string())
                    .parse()?,
                max_multiplier: env::var("MAX_MULTIPLIER")
                    .unwrap_or_else(|_| defaults.growth.max_multiplier.to_string())
                    .parse()?,
            },
            history: HistoryConfig {
                capacity: env::var("HISTORY_CAPACITY")
                    .unwrap_or_else(|_| defaults.history.capacity.to_string())
                    .parse()?,
                flush_interval_ms: env::var("HISTORY_FLUSH_INTERVAL_MS")
                    .unwrap_or_else(|_| defaults.history.flush_interval_ms.to_string())
                    .parse()?,
                redis_url: env::var("REDIS_URL").ok().filter(|url| !url.trim().is_empty()),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with; fatal at startup
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.house_edge_bps < 0 {
            return Err(EngineError::configuration(
                "house_edge_bps",
                format!("must not be negative, got {}", self.house_edge_bps),
            ));
        }
        if self.house_edge_bps >= BPS_DENOMINATOR {
            return Err(EngineError::configuration(
                "house_edge_bps",
                format!("must be below {}, got {}", BPS_DENOMINATOR, self.house_edge_bps),
            ));
        }
        if self.timing.betting_window_ms == 0 {
            return Err(EngineError::configuration("betting_window_ms", "must be positive"));
        }
        if self.timing.tick_interval_ms == 0 {
            return Err(EngineError::configuration("tick_interval_ms", "must be positive"));
        }
        self.growth.validate()?;
        if self.history.capacity == 0 {
            return Err(EngineError::configuration("history_capacity", "must be positive"));
        }
        Ok(())
    }

    pub fn betting_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.timing.betting_window_ms as i64)
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.timing.cooldown_ms as i64)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.timing.tick_interval_ms)
    }

    pub fn history_flush_interval(&self) -> Duration {
        Duration::from_millis(self.history.flush_interval_ms.max(1))
    }
}

impl GrowthConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        let finite = [self.base, self.rate_secs, self.min_multiplier, self.max_multiplier]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(EngineError::configuration("growth", "values must be finite"));
        }
        if self.base <= 0.0 || self.rate_secs <= 0.0 {
            return Err(EngineError::configuration(
                "growth",
                "base and rate must be positive",
            ));
        }
        if self.min_multiplier <= 0.0 || self.min_multiplier >= self.max_multiplier {
            return Err(EngineError::configuration(
                "growth",
                format!(
                    "bounds must satisfy 0 < min < max, got [{}, {}]",
                    self.min_multiplier, self.max_multiplier
                ),
            ));
        }
        Ok(())
    }

    /// Multiplier `elapsed_ms` after the round started running
    pub fn multiplier_at(&self, elapsed_ms: i64) -> f64 {
        let t = elapsed_ms.max(0) as f64 / 1_000.0;
        (self.base * (t / self.rate_secs).exp()).clamp(self.min_multiplier, self.max_multiplier)
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min_multiplier, self.max_multiplier)
    }
}
