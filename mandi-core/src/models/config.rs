use super::Quantity;
use crate::ValidationError;
use std::time::Duration;
use time::OffsetDateTime;

/// The engine runs within a context. This config describes that context.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MarketConfig {
    /// Scheduling and re-listing policy
    pub auction: AuctionConfig,
    /// Pooling policy
    pub pooling: PoolingConfig,
    /// Settlement policy
    pub settlement: SettlementConfig,
    /// Dispute policy
    pub dispute: DisputeConfig,
}

/// Scheduling, re-listing and fill policy for auctions.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Clone, Debug, PartialEq)]
pub struct AuctionConfig {
    /// The shortest bidding window that may be scheduled
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub min_duration: Duration,
    /// The longest bidding window, also the cap of the re-listing backoff
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub max_duration: Duration,
    /// The window used when the engine schedules a lot itself (pools)
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub default_duration: Duration,
    /// After this many no-bid attempts a lot is closed unsold for good
    pub max_attempts: u32,
    /// Each re-listing multiplies the previous window by this factor
    pub backoff_factor: u32,
    /// Gap between a no-bid close and the next attempt
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub relist_delay: Duration,
    /// How long past its window a lot may stay open before it is force-closed
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub grace: Duration,
    /// Whether a sealed bid may be partially filled
    pub sealed_partial_fills: bool,
    /// Whether an open bid may be partially filled
    pub open_partial_fills: bool,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self {
            min_duration: Duration::from_secs(30),
            max_duration: Duration::from_secs(24 * 3600),
            default_duration: Duration::from_secs(3600),
            max_attempts: 3,
            backoff_factor: 2,
            relist_delay: Duration::ZERO,
            grace: Duration::from_secs(300),
            sealed_partial_fills: false,
            open_partial_fills: true,
        }
    }
}

impl AuctionConfig {
    /// Check a requested window against the clock and the duration bounds
    pub fn check_schedule(
        &self,
        now: OffsetDateTime,
        start: OffsetDateTime,
        duration: Duration,
    ) -> Result<(), ValidationError> {
        if start < now {
            return Err(ValidationError::StartInPast);
        }
        if duration < self.min_duration {
            return Err(ValidationError::DurationTooShort {
                minimum: self.min_duration,
            });
        }
        if duration > self.max_duration {
            return Err(ValidationError::DurationTooLong {
                maximum: self.max_duration,
            });
        }
        Ok(())
    }

    /// The window of the next attempt after a no-bid close
    pub fn relist_duration(&self, previous: Duration) -> Duration {
        previous
            .saturating_mul(self.backoff_factor.max(1))
            .min(self.max_duration)
    }

    /// Whether attempt `attempt_number` may still be scheduled
    pub fn allows_attempt(&self, attempt_number: u32) -> bool {
        attempt_number <= self.max_attempts
    }
}

/// Pooling policy.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Clone, Debug, PartialEq)]
pub struct PoolingConfig {
    /// Crops below this quantity may pool; pools must reach it to be auctioned
    pub min_auctionable: Quantity,
    /// A forming pool older than this is dissolved
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub max_age: Duration,
    /// Gap between promotion and the pool's bidding window
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub start_delay: Duration,
}

impl Default for PoolingConfig {
    fn default() -> Self {
        Self {
            min_auctionable: Quantity(100),
            max_age: Duration::from_secs(72 * 3600),
            start_delay: Duration::ZERO,
        }
    }
}

/// Settlement policy.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SettlementConfig {
    /// Fail a fill whose debit would overdraw the buyer's wallet
    pub require_buyer_funds: bool,
}

/// Dispute policy.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Clone, Debug, PartialEq)]
pub struct DisputeConfig {
    /// How long after payment a transaction may still be disputed
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub window: Duration,
}

impl Default for DisputeConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(72 * 3600),
        }
    }
}
