use super::{Market, MarketResult};
use crate::clock::Clock;
use crate::error::{MarketError, Store as _};
use mandi_core::ValidationError;
use mandi_core::models::{
    Crop, CropId, Lot, LotEvent, LotId, MarketEvent, PoolDecision, PoolId, PoolRejection,
    PoolStatus, PooledCrop, Schedule,
};
use mandi_core::ports::{LotRepository, MarketRepository, Notifier, PoolRepository};
use tracing::info;

// Lock order is always crop before pool.
impl<R: MarketRepository, N: Notifier, C: Clock> Market<R, N, C> {
    /// Put an undersized draft crop into the forming pool for its commodity,
    /// grade and bidding type, opening a new pool if there is none.
    ///
    /// The pool is promoted as soon as the join takes it to its threshold.
    pub async fn add_to_pool(&self, crop_id: CropId) -> MarketResult<PooledCrop, R> {
        let _guard = self.lock_lot(LotId::Crop(crop_id)).await;
        let crop = self.load_crop(crop_id).await?;

        let found = self
            .repo
            .find_forming_pool(&crop.commodity, crop.grade, crop.auction.bidding_type)
            .await
            .store()?;
        let pool_id = match found {
            Some(pool) => pool.id,
            None => {
                let now = self.now();
                let config = &self.config().pooling;
                let pool = PooledCrop::new(
                    PoolId::random(),
                    &crop,
                    config.min_auctionable,
                    now + config.max_age,
                    now,
                );
                pool.admits(&crop, config.min_auctionable)?;
                self.repo.create_pool(&pool).await.store()?;
                info!(
                    pool_id = %pool.id,
                    commodity = %pool.commodity,
                    grade = %pool.grade,
                    stale_at = %pool.stale_at,
                    "pool opened"
                );
                pool.id
            }
        };

        self.join_locked(crop, pool_id).await
    }

    /// Put a draft crop into a specific forming pool
    pub async fn join_pool(&self, pool_id: PoolId, crop_id: CropId) -> MarketResult<PooledCrop, R> {
        let _guard = self.lock_lot(LotId::Crop(crop_id)).await;
        let crop = self.load_crop(crop_id).await?;
        self.join_locked(crop, pool_id).await
    }

    async fn join_locked(&self, crop: Crop, pool_id: PoolId) -> MarketResult<PooledCrop, R> {
        let _guard = self.lock_lot(LotId::Pool(pool_id)).await;
        let mut pool = self.load_pool(pool_id).await?;
        pool.admits(&crop, self.config().pooling.min_auctionable)?;
        pool.push(&crop);
        self.repo.join_pool(&pool, crop.id).await.store()??;
        info!(
            %pool_id,
            crop_id = %crop.id,
            pooled = %pool.pooled_quantity(),
            threshold = %pool.threshold,
            "crop joined pool"
        );

        if pool.evaluate(self.now()) == PoolDecision::Promote {
            self.promote(&mut pool).await?;
        }
        Ok(pool)
    }

    /// Take a crop back out of its forming pool; it returns to draft
    pub async fn leave_pool(&self, crop_id: CropId) -> MarketResult<Crop, R> {
        let _guard = self.lock_lot(LotId::Crop(crop_id)).await;
        let crop = self.load_crop(crop_id).await?;
        let pool_id = crop.pool_id.ok_or(PoolRejection::NotMember)?;
        let _pool_guard = self.lock_lot(LotId::Pool(pool_id)).await;
        self.detach(crop, pool_id).await
    }

    // Both the crop and the pool must be locked by the caller
    pub(super) async fn detach(&self, crop: Crop, pool_id: PoolId) -> MarketResult<Crop, R> {
        let mut pool = self.load_pool(pool_id).await?;
        if pool.status != PoolStatus::Forming {
            return Err(ValidationError::LockedInPool.into());
        }
        pool.remove(crop.id)?;
        self.repo.leave_pool(&pool, crop.id).await.store()??;
        info!(%pool_id, crop_id = %crop.id, "crop left pool");
        self.load_crop(crop.id).await
    }

    /// Promote a pool that reached its threshold, or dissolve one that went
    /// stale. Pools that are neither are left alone.
    pub async fn evaluate_pool(&self, pool_id: PoolId) -> MarketResult<PoolDecision, R> {
        let _guard = self.lock_lot(LotId::Pool(pool_id)).await;
        let mut pool = self.load_pool(pool_id).await?;
        let decision = pool.evaluate(self.now());
        match decision {
            PoolDecision::Promote => self.promote(&mut pool).await?,
            PoolDecision::Dissolve => self.dissolve(&pool).await?,
            PoolDecision::Wait => {}
        }
        Ok(decision)
    }

    async fn promote(&self, pool: &mut PooledCrop) -> MarketResult<(), R> {
        let now = self.now();
        let start = now + self.config().pooling.start_delay;
        let duration = self.config().auction.default_duration;

        pool.status = PoolStatus::Locked;
        pool.auction.transition(LotEvent::Schedule)?;
        pool.auction.schedule = Some(Schedule { start, duration });
        self.repo.lock_pool(pool).await.store()??;

        let quantity = pool.pooled_quantity();
        info!(pool_id = %pool.id, %quantity, members = pool.members.len(), %start, "pool promoted");
        self.notify(MarketEvent::PoolPromoted {
            pool_id: pool.id,
            quantity,
        });
        self.notify(MarketEvent::LotScheduled {
            lot_id: pool.lot_id(),
            attempt_number: pool.auction.attempt_number,
            start,
        });
        Ok(())
    }

    pub(super) async fn dissolve(&self, pool: &PooledCrop) -> MarketResult<(), R> {
        self.repo.dissolve_pool(pool.id).await.store()??;
        info!(pool_id = %pool.id, members = pool.members.len(), "pool dissolved");
        self.notify(MarketEvent::PoolDissolved { pool_id: pool.id });
        Ok(())
    }

    async fn load_crop(&self, crop_id: CropId) -> MarketResult<Crop, R> {
        self.repo
            .get_crop(crop_id)
            .await
            .store()?
            .ok_or_else(|| MarketError::not_found("crop", crop_id))
    }

    async fn load_pool(&self, pool_id: PoolId) -> MarketResult<PooledCrop, R> {
        match self.load_lot(LotId::Pool(pool_id)).await? {
            Lot::Pool(pool) => Ok(pool),
            Lot::Crop(_) => Err(MarketError::not_found("pool", pool_id)),
        }
    }
}
