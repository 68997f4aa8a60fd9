use crate::models::{User, UserId};
use std::future::Future;

/// Read-only access to the identity store.
///
/// The engine never creates or authenticates users; it only checks that a
/// farmer is a farmer and a bidder is a retailer.
pub trait IdentityRepository: super::Repository {
    /// Look up a user by id
    fn get_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send;
}
