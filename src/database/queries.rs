use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::database::ChargeOutcome;
use crate::models::{InventoryNumber, UserQuota};

const USER_COLUMNS: &str =
    "user_id, name, phone_numbers_assigned, phone_numbers_used, is_admin, created_at";

pub struct UserQueries;

impl UserQueries {
    pub async fn create_user(
        pool: &PgPool,
        user_id: &str,
        name: &str,
        phone_numbers_assigned: i64,
    ) -> Result<UserQuota> {
        let sql = format!(
            r#"
            INSERT INTO users (user_id, name, phone_numbers_assigned)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO NOTHING
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        sqlx::query_as::<_, UserQuota>(&sql)
            .bind(user_id)
            .bind(name)
            .bind(phone_numbers_assigned)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::Conflict("User ID already exists".to_string()))
    }

    pub async fn find_by_user_id(pool: &PgPool, user_id: &str) -> Result<Option<UserQuota>> {
        let sql = format!("SELECT {} FROM users WHERE user_id = $1", USER_COLUMNS);

        let user = sqlx::query_as::<_, UserQuota>(&sql)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

        Ok(user)
    }

    pub async fn list_non_admin(pool: &PgPool) -> Result<Vec<UserQuota>> {
        let sql = format!(
            "SELECT {} FROM users WHERE is_admin = FALSE ORDER BY created_at, user_id",
            USER_COLUMNS
        );

        let users = sqlx::query_as::<_, UserQuota>(&sql).fetch_all(pool).await?;

        Ok(users)
    }
}

pub struct PhoneNumberQueries;

impl PhoneNumberQueries {
    pub async fn find_assigned(
        pool: &PgPool,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<InventoryNumber>> {
        let numbers = sqlx::query_as::<_, InventoryNumber>(
            r#"
            SELECT id, number, is_assigned, assigned_user, created_at
            FROM phone_numbers
            WHERE is_assigned = TRUE AND assigned_user = $1
            ORDER BY created_at, id
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

        Ok(numbers)
    }

    /// Provisioning happens outside the service; this exists for seeding.
    pub async fn insert_number(
        pool: &PgPool,
        number: &str,
        assigned_user: Option<&str>,
    ) -> Result<InventoryNumber> {
        let row = sqlx::query_as::<_, InventoryNumber>(
            r#"
            INSERT INTO phone_numbers (number, is_assigned, assigned_user)
            VALUES ($1, $2, $3)
            RETURNING id, number, is_assigned, assigned_user, created_at
            "#,
        )
        .bind(number)
        .bind(assigned_user.is_some())
        .bind(assigned_user)
        .fetch_one(pool)
        .await?;

        Ok(row)
    }
}

pub struct ConsumptionQueries;

impl ConsumptionQueries {
    /// Runs the inventory delete and the quota charge in one transaction.
    /// Rows locked by another transaction are skipped rather than waited on,
    /// so two processes never hand out the same row.
    pub async fn charge_and_retire(
        pool: &PgPool,
        user_id: &str,
        amount: i64,
        retire: &[Uuid],
        require_all: bool,
    ) -> Result<ChargeOutcome> {
        let mut tx = pool.begin().await?;

        if !retire.is_empty() {
            let retired = Self::claim_and_delete(&mut tx, retire).await?;
            if require_all && retired < retire.len() as u64 {
                tx.rollback().await?;
                return Ok(ChargeOutcome::InventoryClaimed {
                    available: retired as i64,
                });
            }
        }

        // The WHERE guard makes the increment a compare-and-set.
        let sql = format!(
            r#"
            UPDATE users
            SET phone_numbers_used = phone_numbers_used + $2
            WHERE user_id = $1 AND phone_numbers_used + $2 <= phone_numbers_assigned
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        let charged = sqlx::query_as::<_, UserQuota>(&sql)
            .bind(user_id)
            .bind(amount)
            .fetch_optional(&mut *tx)
            .await?;

        match charged {
            Some(user) => {
                tx.commit().await?;
                Ok(ChargeOutcome::Charged(user))
            }
            None => {
                tx.rollback().await?;
                Ok(ChargeOutcome::QuotaRejected)
            }
        }
    }

    async fn claim_and_delete(tx: &mut Transaction<'_, Postgres>, ids: &[Uuid]) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM phone_numbers
            WHERE id IN (
                SELECT id FROM phone_numbers
                WHERE id = ANY($1)
                FOR UPDATE SKIP LOCKED
            )
            "#,
        )
        .bind(ids)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected())
    }
}
