use crate::ConflictError;
use crate::models::{BiddingType, CropId, PoolId, PooledCrop, QualityGrade};
use std::future::Future;

/// Repository interface for pool membership.
///
/// Every membership change touches the pool and the member crop together
/// and must be applied atomically.
pub trait PoolRepository: super::Repository {
    /// Persist a new, empty forming pool
    fn create_pool(&self, pool: &PooledCrop)
    -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// The oldest forming pool for a commodity, grade and bidding type
    fn find_forming_pool(
        &self,
        commodity: &str,
        grade: QualityGrade,
        bidding_type: BiddingType,
    ) -> impl Future<Output = Result<Option<PooledCrop>, Self::Error>> + Send;

    /// Every pool still collecting members
    fn forming_pools(&self) -> impl Future<Output = Result<Vec<PooledCrop>, Self::Error>> + Send;

    /// Record `crop_id` as the newest member of `pool` (which already lists
    /// it) and mark the crop pooled.
    ///
    /// Conflicts if the pool is no longer forming or the crop is no longer an
    /// unpooled draft.
    fn join_pool(
        &self,
        pool: &PooledCrop,
        crop_id: CropId,
    ) -> impl Future<Output = Result<Result<(), ConflictError>, Self::Error>> + Send;

    /// Remove `crop_id` from `pool` (which no longer lists it) and return the
    /// crop to draft.
    fn leave_pool(
        &self,
        pool: &PooledCrop,
        crop_id: CropId,
    ) -> impl Future<Output = Result<Result<(), ConflictError>, Self::Error>> + Send;

    /// Freeze membership and store the pool's scheduled auction state
    fn lock_pool(
        &self,
        pool: &PooledCrop,
    ) -> impl Future<Output = Result<Result<(), ConflictError>, Self::Error>> + Send;

    /// Mark a forming pool dissolved and return every member to draft
    fn dissolve_pool(
        &self,
        pool_id: PoolId,
    ) -> impl Future<Output = Result<Result<(), ConflictError>, Self::Error>> + Send;
}
