use super::{DisputeId, TransactionId, UserId, text_enum};
use time::OffsetDateTime;

/// The lifecycle of a dispute.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisputeStatus {
    /// Raised; the transaction's wallet entries are held
    Open,
    /// An operator is looking at the evidence
    UnderReview,
    /// Decided for the buyer; the sale is reversed
    ResolvedBuyer,
    /// Decided for the seller; the hold is released
    ResolvedSeller,
    /// Dropped by the raiser; the hold is released
    Withdrawn,
}

text_enum!(DisputeStatus {
    Open => "open",
    UnderReview => "under_review",
    ResolvedBuyer => "resolved_buyer",
    ResolvedSeller => "resolved_seller",
    Withdrawn => "withdrawn",
});

/// The terminal outcomes a dispute may be resolved with.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// Refund the buyer and reverse the seller's credit
    Buyer,
    /// Confirm the sale
    Seller,
    /// The raiser drops the dispute
    Withdrawn,
}

impl Resolution {
    /// The terminal status this resolution leads to
    pub fn status(self) -> DisputeStatus {
        match self {
            Self::Buyer => DisputeStatus::ResolvedBuyer,
            Self::Seller => DisputeStatus::ResolvedSeller,
            Self::Withdrawn => DisputeStatus::Withdrawn,
        }
    }
}

impl DisputeStatus {
    /// Whether the dispute has been settled one way or another
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Open | Self::UnderReview)
    }

    /// The resolution this terminal status stands for
    pub fn resolution(&self) -> Option<Resolution> {
        match self {
            Self::ResolvedBuyer => Some(Resolution::Buyer),
            Self::ResolvedSeller => Some(Resolution::Seller),
            Self::Withdrawn => Some(Resolution::Withdrawn),
            Self::Open | Self::UnderReview => None,
        }
    }

    /// The dispute transition table.
    ///
    /// Only a reviewed dispute can be decided; the raiser may withdraw at any
    /// point before a decision.
    pub fn apply(self, next: DisputeStatus) -> Result<DisputeStatus, DisputeRejection> {
        use DisputeStatus::*;
        match (self, next) {
            (Open, UnderReview)
            | (UnderReview, ResolvedBuyer | ResolvedSeller)
            | (Open | UnderReview, Withdrawn) => Ok(next),
            (from, to) => Err(DisputeRejection::InvalidTransition { from, to }),
        }
    }
}

/// Why a dispute operation was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DisputeRejection {
    /// Only the buyer or seller of a transaction may dispute it
    #[error("only a party to the transaction may dispute it")]
    NotParty,
    /// A reason must be given
    #[error("a reason is required")]
    MissingReason,
    /// The transaction has already been refunded
    #[error("transaction has been refunded")]
    Refunded,
    /// The dispute window after payment has elapsed
    #[error("the dispute window has elapsed")]
    WindowElapsed,
    /// The transaction already has an unresolved dispute
    #[error("transaction already has active dispute {0}")]
    AlreadyDisputed(DisputeId),
    /// The requested status change is not allowed
    #[error("dispute cannot move from {from} to {to}")]
    InvalidTransition {
        /// The current status
        from: DisputeStatus,
        /// The requested status
        to: DisputeStatus,
    },
    /// The dispute has already ended
    #[error("dispute is already {0}")]
    Closed(DisputeStatus),
}

/// A challenge against a transaction.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Dispute {
    /// The dispute's id
    pub id: DisputeId,
    /// The challenged transaction
    pub transaction_id: TransactionId,
    /// Who raised it
    pub raised_by: UserId,
    /// Why
    pub reason: String,
    /// Supporting evidence (document references, notes)
    pub evidence: Vec<String>,
    /// Current status
    pub status: DisputeStatus,
    /// When it was raised
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub opened_at: OffsetDateTime,
    /// When it reached a terminal status
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339::option"))]
    pub resolved_at: Option<OffsetDateTime>,
    /// The operator's note on the decision
    pub resolution_note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use DisputeStatus::*;

    #[test]
    fn decisions_require_review() {
        assert!(Open.apply(ResolvedBuyer).is_err());
        assert_eq!(Open.apply(UnderReview), Ok(UnderReview));
        assert_eq!(UnderReview.apply(ResolvedBuyer), Ok(ResolvedBuyer));
        assert_eq!(UnderReview.apply(ResolvedSeller), Ok(ResolvedSeller));
    }

    #[test]
    fn withdrawal_is_allowed_until_decided() {
        assert_eq!(Open.apply(Withdrawn), Ok(Withdrawn));
        assert_eq!(UnderReview.apply(Withdrawn), Ok(Withdrawn));
        assert!(ResolvedSeller.apply(Withdrawn).is_err());
    }

    #[test]
    fn terminal_states_map_to_resolutions() {
        for resolution in [Resolution::Buyer, Resolution::Seller, Resolution::Withdrawn] {
            assert!(resolution.status().is_terminal());
            assert_eq!(resolution.status().resolution(), Some(resolution));
        }
        assert_eq!(UnderReview.resolution(), None);
    }
}
