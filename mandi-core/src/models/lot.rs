use super::{Amount, Quantity};
use crate::ValidationError;
use std::{fmt::Display, str::FromStr, time::Duration};
use time::OffsetDateTime;

/// How the price of competing bids is exposed while a lot is open.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BiddingType {
    /// Prices are visible to every bidder and must meet the floor price
    #[default]
    Open,
    /// Prices are hidden from other bidders until the lot closes
    Sealed,
}

/// The quality grade assigned to a lot. Only lots of equal grade may pool.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QualityGrade {
    /// Premium produce
    A,
    /// Standard produce
    B,
    /// Fair average quality
    C,
}

/// The result of a closed lot.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Closing {
    /// At least one fill settled
    Sold,
    /// Nothing settled
    Unsold,
}

/// The lifecycle status of a crop or pooled lot.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LotStatus {
    /// Listed but not scheduled
    Draft,
    /// Member of a pool; only the pool is auctioned
    Pooled,
    /// Waiting for its bidding window to start
    Scheduled,
    /// Accepting bids
    Open,
    /// Bidding is over
    Closed(Closing),
    /// Retired by the seller before sale
    Withdrawn,
}

/// Inputs to the lot state machine.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LotEvent {
    /// Place (or re-place) the lot on the auction calendar
    Schedule,
    /// The scheduled start has been reached
    Open,
    /// The window elapsed with no valid bid and attempts remain
    Relist,
    /// The window elapsed and at least one fill settled
    CloseSold,
    /// The window elapsed with nothing sold and no attempts remain, or a forced close
    CloseUnsold,
    /// The seller retires the lot
    Withdraw,
    /// The crop joins a pool
    JoinPool,
    /// The crop leaves (or is released from) its pool
    LeavePool,
}

impl LotStatus {
    /// The transition table of the lot lifecycle.
    ///
    /// ```text
    /// Draft ──Schedule──> Scheduled ──Open──> Open ──CloseSold───> Closed(Sold)
    ///   │  ^                 ^   │              ├──CloseUnsold─> Closed(Unsold)
    ///   │  └─LeavePool─┐     │   └─Withdraw─┐   └──Relist──────> Scheduled
    ///   └─JoinPool─> Pooled ─┘CloseSold     └──> Withdrawn
    /// ```
    ///
    /// Any pair not listed is rejected.
    pub fn apply(self, event: LotEvent) -> Result<LotStatus, ValidationError> {
        use Closing::*;
        use LotEvent as E;
        use LotStatus as S;

        let next = match (self, event) {
            (S::Draft, E::Schedule) => S::Scheduled,
            (S::Scheduled, E::Schedule) => S::Scheduled,
            (S::Closed(Unsold), E::Schedule) => S::Scheduled,
            (S::Scheduled, E::Open) => S::Open,
            (S::Open, E::Relist) => S::Scheduled,
            (S::Open, E::CloseSold) => S::Closed(Sold),
            (S::Open, E::CloseUnsold) => S::Closed(Unsold),
            (S::Pooled, E::CloseSold) => S::Closed(Sold),
            (S::Draft | S::Scheduled | S::Closed(Unsold), E::Withdraw) => S::Withdrawn,
            (S::Draft, E::JoinPool) => S::Pooled,
            (S::Pooled, E::LeavePool) => S::Draft,
            (from, event) => return Err(ValidationError::InvalidTransition { from, event }),
        };
        Ok(next)
    }

    /// Whether the lot has reached a state it never leaves on its own
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed(_) | Self::Withdrawn)
    }

    /// The storage representation of this status
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pooled => "pooled",
            Self::Scheduled => "scheduled",
            Self::Open => "open",
            Self::Closed(Closing::Sold) => "sold",
            Self::Closed(Closing::Unsold) => "unsold",
            Self::Withdrawn => "withdrawn",
        }
    }
}

impl Display for LotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LotStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "draft" => Self::Draft,
            "pooled" => Self::Pooled,
            "scheduled" => Self::Scheduled,
            "open" => Self::Open,
            "sold" => Self::Closed(Closing::Sold),
            "unsold" => Self::Closed(Closing::Unsold),
            "withdrawn" => Self::Withdrawn,
            other => return Err(UnknownVariant(other.to_owned())),
        })
    }
}

/// A stored string did not name any variant of the expected enum.
#[derive(Debug, thiserror::Error)]
#[error("unknown variant: {0}")]
pub struct UnknownVariant(pub String);

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum.
macro_rules! text_enum {
    ($enum:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $enum {
            /// The storage representation of this value
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $enum {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $enum {
            type Err = $crate::models::UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err($crate::models::UnknownVariant(other.to_owned())),
                }
            }
        }
    };
}

pub(crate) use text_enum;

text_enum!(BiddingType { Open => "open", Sealed => "sealed" });
text_enum!(QualityGrade { A => "A", B => "B", C => "C" });

/// When a lot is planned to open, and for how long.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// The planned opening time
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub start: OffsetDateTime,
    /// The length of the bidding window
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub duration: Duration,
}

/// The actual bidding window of an open (or closed) lot.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BiddingWindow {
    /// When bidding started
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub start: OffsetDateTime,
    /// When bidding ends
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub end: OffsetDateTime,
}

impl BiddingWindow {
    /// Whether `now` falls inside the window
    pub fn contains(&self, now: OffsetDateTime) -> bool {
        self.start <= now && now < self.end
    }
}

/// The auction bookkeeping shared by crops and pools.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct AuctionState {
    /// Lifecycle status
    pub status: LotStatus,
    /// Open or sealed bidding
    pub bidding_type: BiddingType,
    /// The minimum acceptable price per unit
    pub floor_price: Amount,
    /// The quantity originally listed
    pub total_quantity: Quantity,
    /// The quantity not yet sold
    pub available_quantity: Quantity,
    /// The planned window, once scheduled
    pub schedule: Option<Schedule>,
    /// The actual window, once opened
    pub window: Option<BiddingWindow>,
    /// The current attempt; starts at 1 and grows on every no-bid close
    pub attempt_number: u32,
}

impl AuctionState {
    /// A fresh draft with everything still available
    pub fn draft(bidding_type: BiddingType, floor_price: Amount, quantity: Quantity) -> Self {
        Self {
            status: LotStatus::Draft,
            bidding_type,
            floor_price,
            total_quantity: quantity,
            available_quantity: quantity,
            schedule: None,
            window: None,
            attempt_number: 1,
        }
    }

    /// Apply `event` to the status through the transition table
    pub fn transition(&mut self, event: LotEvent) -> Result<LotStatus, ValidationError> {
        self.status = self.status.apply(event)?;
        Ok(self.status)
    }

    /// A scheduled lot whose start time has been reached
    pub fn is_due_to_open(&self, now: OffsetDateTime) -> bool {
        self.status == LotStatus::Scheduled && self.schedule.is_some_and(|s| s.start <= now)
    }

    /// An open lot whose window has elapsed
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.status == LotStatus::Open && self.window.is_some_and(|w| w.end <= now)
    }

    /// Check the quantity and window invariants.
    pub fn check(&self) -> Result<(), ValidationError> {
        if self.available_quantity < Quantity::ZERO
            || self.available_quantity > self.total_quantity
        {
            return Err(ValidationError::QuantityOutOfBounds {
                available: self.available_quantity,
                total: self.total_quantity,
            });
        }
        if let Some(window) = self.window {
            if window.end <= window.start {
                return Err(ValidationError::EmptyWindow);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_reaches_sold() {
        let mut status = LotStatus::Draft;
        for event in [LotEvent::Schedule, LotEvent::Open, LotEvent::CloseSold] {
            status = status.apply(event).unwrap();
        }
        assert_eq!(status, LotStatus::Closed(Closing::Sold));
        assert!(status.is_terminal());
    }

    #[test]
    fn relist_returns_to_scheduled() {
        assert_eq!(
            LotStatus::Open.apply(LotEvent::Relist).unwrap(),
            LotStatus::Scheduled
        );
    }

    #[test]
    fn open_lot_cannot_be_withdrawn() {
        let err = LotStatus::Open.apply(LotEvent::Withdraw).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidTransition {
                from: LotStatus::Open,
                event: LotEvent::Withdraw
            }
        ));
    }

    #[test]
    fn sold_lot_cannot_be_rescheduled() {
        assert!(
            LotStatus::Closed(Closing::Sold)
                .apply(LotEvent::Schedule)
                .is_err()
        );
        assert!(
            LotStatus::Closed(Closing::Unsold)
                .apply(LotEvent::Schedule)
                .is_ok()
        );
    }

    #[test]
    fn pooled_crop_must_leave_before_scheduling() {
        assert!(LotStatus::Pooled.apply(LotEvent::Schedule).is_err());
        assert_eq!(
            LotStatus::Pooled.apply(LotEvent::LeavePool).unwrap(),
            LotStatus::Draft
        );
    }

    #[test]
    fn status_text_roundtrip() {
        for status in [
            LotStatus::Draft,
            LotStatus::Pooled,
            LotStatus::Scheduled,
            LotStatus::Open,
            LotStatus::Closed(Closing::Sold),
            LotStatus::Closed(Closing::Unsold),
            LotStatus::Withdrawn,
        ] {
            assert_eq!(status.as_str().parse::<LotStatus>().unwrap(), status);
        }
        assert!("auctioned".parse::<LotStatus>().is_err());
    }

    #[test]
    fn invariants_catch_oversold_state() {
        let mut state = AuctionState::draft(BiddingType::Open, Amount(10), Quantity(100));
        assert!(state.check().is_ok());
        state.available_quantity = Quantity(-1);
        assert!(state.check().is_err());
        state.available_quantity = Quantity(101);
        assert!(state.check().is_err());
    }
}
