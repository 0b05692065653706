use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::database::{ChargeOutcome, Repository};
use crate::errors::{AppError, Result};
use crate::models::{InventoryNumber, UserQuota};

#[derive(Default)]
struct Tables {
    users: Vec<UserQuota>,
    phone_numbers: Vec<InventoryNumber>,
}

/// In-process store for local development and tests. Rows keep insertion order.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a full record, bypassing the create-user rules. Used for
    /// seeding admin accounts and fixtures.
    pub async fn insert_user(&self, user: UserQuota) {
        let mut tables = self.tables.lock().await;
        tables.users.retain(|u| u.user_id != user.user_id);
        tables.users.push(user);
    }

    pub async fn insert_number(&self, number: &str, assigned_user: Option<&str>) -> Uuid {
        let row = InventoryNumber {
            id: Uuid::new_v4(),
            number: number.to_string(),
            is_assigned: assigned_user.is_some(),
            assigned_user: assigned_user.map(str::to_string),
            created_at: Utc::now(),
        };
        let id = row.id;
        self.tables.lock().await.phone_numbers.push(row);
        id
    }

    pub async fn number_count(&self) -> usize {
        self.tables.lock().await.phone_numbers.len()
    }
}

#[async_trait]
impl Repository for MemoryDatabase {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserQuota>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.user_id == user_id).cloned())
    }

    async fn create_user(
        &self,
        user_id: &str,
        name: &str,
        phone_numbers_assigned: i64,
    ) -> Result<UserQuota> {
        let mut tables = self.tables.lock().await;
        if tables.users.iter().any(|u| u.user_id == user_id) {
            return Err(AppError::Conflict("User ID already exists".to_string()));
        }

        let user = UserQuota {
            user_id: user_id.to_string(),
            name: name.to_string(),
            phone_numbers_assigned,
            phone_numbers_used: 0,
            is_admin: false,
            created_at: Utc::now(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<UserQuota>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().filter(|u| !u.is_admin).cloned().collect())
    }

    async fn find_assigned_numbers(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<InventoryNumber>> {
        let tables = self.tables.lock().await;
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(tables
            .phone_numbers
            .iter()
            .filter(|n| n.is_assigned && n.assigned_user.as_deref() == Some(user_id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn charge_and_retire(
        &self,
        user_id: &str,
        amount: i64,
        retire: &[Uuid],
        require_all: bool,
    ) -> Result<ChargeOutcome> {
        let mut tables = self.tables.lock().await;

        let available = tables
            .phone_numbers
            .iter()
            .filter(|n| retire.contains(&n.id))
            .count();
        if require_all && available < retire.len() {
            return Ok(ChargeOutcome::InventoryClaimed {
                available: available as i64,
            });
        }

        let Some(user) = tables.users.iter_mut().find(|u| u.user_id == user_id) else {
            return Ok(ChargeOutcome::QuotaRejected);
        };
        if user.phone_numbers_used + amount > user.phone_numbers_assigned {
            return Ok(ChargeOutcome::QuotaRejected);
        }
        user.phone_numbers_used += amount;
        let charged = user.clone();

        tables.phone_numbers.retain(|n| !retire.contains(&n.id));
        Ok(ChargeOutcome::Charged(charged))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
