use crate::Db;
use crate::types::UserRow;
use mandi_core::models::{User, UserId};
use mandi_core::ports::IdentityRepository;

impl IdentityRepository for Db {
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>, Self::Error> {
        let row: Option<UserRow> = sqlx::query_as("select id, name, role from user where id = $1")
            .bind(user_id.0)
            .fetch_optional(&self.reader)
            .await?;
        row.map(User::try_from).transpose()
    }
}
