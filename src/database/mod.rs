use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::errors::Result;
use crate::models::{InventoryNumber, UserQuota};

pub mod memory;
pub mod queries;

pub use memory::MemoryDatabase;

use queries::{ConsumptionQueries, PhoneNumberQueries, UserQueries};

/// Result of [`Repository::charge_and_retire`]. Only `Charged` changes the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    Charged(UserQuota),
    /// The quota guard rejected the increment, or the user is gone.
    QuotaRejected,
    /// Some of the rows to retire were claimed by a concurrent request.
    /// `available` counts the ones that could still be claimed.
    InventoryClaimed { available: i64 },
}

/// Persistence seam for user quotas and the number inventory.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Repository: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserQuota>>;

    /// Fails with `Conflict` when `user_id` is already taken.
    async fn create_user(
        &self,
        user_id: &str,
        name: &str,
        phone_numbers_assigned: i64,
    ) -> Result<UserQuota>;

    async fn list_users(&self) -> Result<Vec<UserQuota>>;


    /// Up to `limit` numbers earmarked for `user_id`, in a stable order.
    async fn find_assigned_numbers(&self, user_id: &str, limit: i64)
        -> Result<Vec<InventoryNumber>>;

    /// Adds `amount` to `phone_numbers_used`, guarded by
    /// `phone_numbers_assigned`, and deletes the `retire` rows as one atomic
    /// step. With `require_all` the step is abandoned unless every row in
    /// `retire` can be claimed; otherwise missing rows are skipped.
    async fn charge_and_retire(
        &self,
        user_id: &str,
        amount: i64,
        retire: &[Uuid],
        require_all: bool,
    ) -> Result<ChargeOutcome>;

    async fn ping(&self) -> Result<()>;
}

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Repository for Database {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserQuota>> {
        UserQueries::find_by_user_id(&self.pool, user_id).await
    }

    async fn create_user(
        &self,
        user_id: &str,
        name: &str,
        phone_numbers_assigned: i64,
    ) -> Result<UserQuota> {
        UserQueries::create_user(&self.pool, user_id, name, phone_numbers_assigned).await
    }

    async fn list_users(&self) -> Result<Vec<UserQuota>> {
        UserQueries::list_non_admin(&self.pool).await
    }

    async fn find_assigned_numbers(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<InventoryNumber>> {
        PhoneNumberQueries::find_assigned(&self.pool, user_id, limit).await
    }

    async fn charge_and_retire(
        &self,
        user_id: &str,
        amount: i64,
        retire: &[Uuid],
        require_all: bool,
    ) -> Result<ChargeOutcome> {
        ConsumptionQueries::charge_and_retire(&self.pool, user_id, amount, retire, require_all)
            .await
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
