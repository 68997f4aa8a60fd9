use super::{Market, MarketResult};
use crate::clock::Clock;
use crate::error::{MarketError, Store as _};
use mandi_core::ConflictError;
use mandi_core::models::{
    Dispute, DisputeId, DisputeRejection, DisputeStatus, EntryState, MarketEvent, PaymentStatus,
    Resolution, Transaction, TransactionId, UserId,
};
use mandi_core::ports::{DisputeRepository, HoldRelease, MarketRepository, Notifier};
use tracing::{info, warn};

impl<R: MarketRepository, N: Notifier, C: Clock> Market<R, N, C> {
    /// Raise a dispute against a transaction and freeze its wallet entries.
    ///
    /// Only the buyer or the seller may raise one, while payment is pending
    /// or within the dispute window after payment, and a transaction carries
    /// at most one unresolved dispute.
    pub async fn open_dispute(
        &self,
        transaction_id: TransactionId,
        raised_by: UserId,
        reason: &str,
        evidence: Vec<String>,
    ) -> MarketResult<Dispute, R> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DisputeRejection::MissingReason.into());
        }
        let tx = self.transaction(transaction_id).await?;
        if raised_by != tx.retailer_id && raised_by != tx.farmer_id {
            return Err(DisputeRejection::NotParty.into());
        }

        let now = self.now();
        match tx.payment_status {
            PaymentStatus::Refunded => return Err(DisputeRejection::Refunded.into()),
            PaymentStatus::Paid => {
                let deadline = tx.paid_at.unwrap_or(tx.created_at) + self.config().dispute.window;
                if now > deadline {
                    return Err(DisputeRejection::WindowElapsed.into());
                }
            }
            PaymentStatus::PendingPayment => {}
        }

        let dispute = Dispute {
            id: DisputeId::random(),
            transaction_id,
            raised_by,
            reason: reason.to_owned(),
            evidence,
            status: DisputeStatus::Open,
            opened_at: now,
            resolved_at: None,
            resolution_note: None,
        };

        let _wallets = self.lock_wallets([tx.farmer_id, tx.retailer_id]).await;
        self.repo.open_dispute(&dispute).await.store()??;

        info!(dispute_id = %dispute.id, %transaction_id, %raised_by, "dispute opened");
        self.notify(MarketEvent::DisputeOpened {
            dispute_id: dispute.id,
            transaction_id,
        });
        Ok(dispute)
    }

    /// Attach more evidence to an unresolved dispute. Only the parties may add it.
    pub async fn add_evidence(
        &self,
        dispute_id: DisputeId,
        by: UserId,
        evidence: String,
    ) -> MarketResult<Dispute, R> {
        let mut dispute = self.dispute(dispute_id).await?;
        if dispute.status.is_terminal() {
            return Err(DisputeRejection::Closed(dispute.status).into());
        }
        let tx = self.transaction(dispute.transaction_id).await?;
        if by != tx.retailer_id && by != tx.farmer_id {
            return Err(DisputeRejection::NotParty.into());
        }

        dispute.evidence.push(evidence);
        if !self
            .repo
            .update_dispute(&dispute, dispute.status)
            .await
            .store()?
        {
            return Err(ConflictError::Stale.into());
        }
        Ok(dispute)
    }

    /// Move an open dispute under review
    pub async fn begin_review(&self, dispute_id: DisputeId) -> MarketResult<Dispute, R> {
        let mut dispute = self.dispute(dispute_id).await?;
        let expected = dispute.status;
        dispute.status = expected.apply(DisputeStatus::UnderReview)?;
        if !self
            .repo
            .update_dispute(&dispute, expected)
            .await
            .store()?
        {
            return Err(ConflictError::Stale.into());
        }
        info!(%dispute_id, "dispute under review");
        Ok(dispute)
    }

    /// Decide a dispute and unfreeze the transaction's entries.
    ///
    /// A decision for the buyer reverses the entries (refunding the buyer
    /// and cancelling the seller's credit) and marks the transaction
    /// refunded. A decision for the seller, or a withdrawal, releases the
    /// hold. Repeating the recorded resolution is a no-op; a different one
    /// is a conflict.
    pub async fn resolve(
        &self,
        dispute_id: DisputeId,
        resolution: Resolution,
        note: Option<String>,
    ) -> MarketResult<Dispute, R> {
        let dispute = self.dispute(dispute_id).await?;
        if let Some(done) = settled(&dispute, resolution)? {
            return Ok(done);
        }

        let tx = self.transaction(dispute.transaction_id).await?;
        let _wallets = self.lock_wallets([tx.farmer_id, tx.retailer_id]).await;

        // re-read under the wallet locks, a concurrent resolve or payment may have won
        let tx = self.transaction(tx.id).await?;
        let mut dispute = self.dispute(dispute_id).await?;
        if let Some(done) = settled(&dispute, resolution)? {
            return Ok(done);
        }
        let expected = dispute.status;
        dispute.status = expected.apply(resolution.status())?;
        dispute.resolved_at = Some(self.now());
        dispute.resolution_note = note;

        let release = release_for(&tx, resolution);
        if let Err(conflict) = self
            .repo
            .resolve_dispute(&dispute, expected, release)
            .await
            .store()?
        {
            warn!(%dispute_id, error = %conflict, "dispute resolution lost a race");
            return Err(conflict.into());
        }

        info!(%dispute_id, transaction_id = %tx.id, ?resolution, "dispute resolved");
        self.notify(MarketEvent::DisputeResolved {
            dispute_id,
            transaction_id: tx.id,
            resolution,
        });
        Ok(dispute)
    }

    /// Retrieve a dispute
    pub async fn dispute(&self, dispute_id: DisputeId) -> MarketResult<Dispute, R> {
        self.repo
            .get_dispute(dispute_id)
            .await
            .store()?
            .ok_or_else(|| MarketError::not_found("dispute", dispute_id))
    }

    /// Every dispute raised against a transaction
    pub async fn disputes_for_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> MarketResult<Vec<Dispute>, R> {
        self.repo
            .disputes_for_transaction(transaction_id)
            .await
            .store()
    }
}

// A terminal dispute either already carries the requested resolution or
// conflicts with it
fn settled(dispute: &Dispute, resolution: Resolution) -> Result<Option<Dispute>, ConflictError> {
    match dispute.status.resolution() {
        None => Ok(None),
        Some(existing) if existing == resolution => Ok(Some(dispute.clone())),
        Some(existing) => Err(ConflictError::AlreadyResolved { existing }),
    }
}

fn release_for(tx: &Transaction, resolution: Resolution) -> HoldRelease {
    match resolution {
        Resolution::Buyer => HoldRelease::Reverse,
        Resolution::Seller | Resolution::Withdrawn => {
            if tx.payment_status == PaymentStatus::Paid {
                HoldRelease::Restore(EntryState::Final)
            } else {
                HoldRelease::Restore(EntryState::Pending)
            }
        }
    }
}
