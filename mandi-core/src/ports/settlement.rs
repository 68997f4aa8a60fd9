use crate::SettlementFailure;
use crate::models::{
    Amount, BidId, CropId, LotId, OrderStatus, Quantity, Transaction, TransactionId, UserId,
};
use std::future::Future;
use time::OffsetDateTime;

/// The part of a fill sourced from one crop.
#[derive(Debug, Clone, PartialEq)]
pub struct FillSlice {
    /// The transaction to create for this slice
    pub transaction_id: TransactionId,
    /// The crop supplying the goods
    pub crop_id: CropId,
    /// The farmer to credit
    pub farmer_id: UserId,
    /// The quantity taken from the crop
    pub quantity: Quantity,
}

/// Everything needed to settle one winning bid as a single atomic unit.
#[derive(Debug, Clone, PartialEq)]
pub struct FillPlan {
    /// The winning bid
    pub bid_id: BidId,
    /// The lot being closed
    pub lot_id: LotId,
    /// The attempt being closed
    pub attempt_number: u32,
    /// The buyer
    pub retailer_id: UserId,
    /// Agreed price per unit
    pub unit_price: Amount,
    /// One slice for a crop lot, one per contributing member for a pool
    pub slices: Vec<FillSlice>,
    /// Fail if the debit would overdraw the buyer's wallet
    pub require_buyer_funds: bool,
    /// Settlement time
    pub at: OffsetDateTime,
}

impl FillPlan {
    /// The total quantity of the fill
    pub fn quantity(&self) -> Quantity {
        self.slices.iter().map(|s| s.quantity).sum()
    }
}

/// Repository interface for settlement of trades.
pub trait SettlementRepository: super::Repository {
    /// Settle one fill atomically.
    ///
    /// For every slice: create the transaction (`PendingPayment`), decrement
    /// the crop's (and, for a pool, the pool's) available quantity with a
    /// guard against going negative, and post a pending purchase debit to the
    /// buyer and a pending sale credit to the farmer. Finally mark the bid
    /// accepted with the filled quantity.
    ///
    /// # Returns
    ///
    /// - Ok(Ok(transactions)) if every write succeeded
    /// - Ok(Err(failure)) if a guard failed; nothing was written
    /// - Err(repository_error) if there is some other error
    fn settle_fill(
        &self,
        plan: &FillPlan,
    ) -> impl Future<Output = Result<Result<Vec<Transaction>, SettlementFailure>, Self::Error>> + Send;

    /// Retrieve a transaction
    fn get_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> impl Future<Output = Result<Option<Transaction>, Self::Error>> + Send;

    /// Every transaction created by a lot, oldest first
    fn transactions_for_lot(
        &self,
        lot_id: LotId,
    ) -> impl Future<Output = Result<Vec<Transaction>, Self::Error>> + Send;

    /// Mark a transaction awaiting payment as paid and finalize its pending
    /// entries. Returns false (and writes nothing) if it was not awaiting
    /// payment.
    fn confirm_payment(
        &self,
        transaction_id: TransactionId,
        at: OffsetDateTime,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// Move the order status from `from` to `to`. Returns false if the
    /// transaction was not in `from`.
    fn advance_order(
        &self,
        transaction_id: TransactionId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send;
}
