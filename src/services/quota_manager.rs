use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    database::{ChargeOutcome, Repository},
    errors::{AppError, Result},
    models::{GenerateNumbersRequest, GenerateNumbersResponse},
    services::{
        metrics::MetricsService,
        number_source::{strip_plus, NumberSource, SyntheticNumbers},
    },
};

/// A validated consumption request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeRequest {
    Count(i64),
    Custom(Vec<String>),
}

impl ConsumeRequest {
    /// Checks the request shape and caps its size at `max_per_request`.
    pub fn parse(request: GenerateNumbersRequest, max_per_request: i64) -> Result<Self> {
        let request = match (request.count, request.custom_phone_numbers) {
            (Some(_), Some(_)) => {
                return Err(AppError::Validation(
                    "Provide either count or customPhoneNumbers, not both".to_string(),
                ))
            }
            (Some(count), None) if count <= 0 => {
                return Err(AppError::Validation(
                    "count must be a positive integer".to_string(),
                ))
            }
            (Some(count), None) => ConsumeRequest::Count(count),
            (None, Some(numbers)) if numbers.is_empty() => {
                return Err(AppError::Validation(
                    "customPhoneNumbers must not be empty".to_string(),
                ))
            }
            (None, Some(numbers)) => ConsumeRequest::Custom(numbers),
            (None, None) => {
                return Err(AppError::Validation(
                    "Provide either count or customPhoneNumbers".to_string(),
                ))
            }
        };

        if request.quantity() > max_per_request {
            return Err(AppError::Validation(format!(
                "At most {} phone numbers can be requested at once",
                max_per_request
            )));
        }

        Ok(request)
    }

    pub fn quantity(&self) -> i64 {
        match self {
            ConsumeRequest::Count(count) => *count,
            ConsumeRequest::Custom(numbers) => numbers.len() as i64,
        }
    }
}

/// Per-user async mutexes. An entry is dropped once no request holds or
/// waits on it.
#[derive(Default)]
struct UserLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl UserLocks {
    fn for_user<'a>(&'a self, user_id: &'a str) -> UserLock<'a> {
        let mutex = self
            .locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        UserLock {
            locks: self,
            user_id,
            mutex,
        }
    }
}

struct UserLock<'a> {
    locks: &'a UserLocks,
    user_id: &'a str,
    mutex: Arc<Mutex<()>>,
}

impl Drop for UserLock<'_> {
    fn drop(&mut self) {
        // Two references left means the map's and this one.
        self.locks
            .locks
            .remove_if(self.user_id, |_, mutex| Arc::strong_count(mutex) == 2);
    }
}

struct Sourced {
    numbers: Vec<String>,
    inventory_ids: Vec<Uuid>,
    policy: &'static str,
}

/// Checks a user's quota, sources phone numbers and charges the quota.
pub struct QuotaManager {
    repository: Arc<dyn Repository>,
    source: NumberSource,
    synthetic: SyntheticNumbers,
    max_per_request: i64,
    metrics: Arc<MetricsService>,
    locks: UserLocks,
}

impl QuotaManager {
    pub fn new(
        repository: Arc<dyn Repository>,
        source: NumberSource,
        synthetic: SyntheticNumbers,
        max_per_request: i64,
        metrics: Arc<MetricsService>,
    ) -> Self {
        Self {
            repository,
            source,
            synthetic,
            max_per_request,
            metrics,
            locks: UserLocks::default(),
        }
    }

    pub fn source(&self) -> NumberSource {
        self.source
    }

    pub async fn consume(
        &self,
        user_id: &str,
        request: GenerateNumbersRequest,
    ) -> Result<GenerateNumbersResponse> {
        let result = match ConsumeRequest::parse(request, self.max_per_request) {
            Ok(request) => self.consume_validated(user_id, request).await,
            Err(e) => Err(e),
        };

        if let Err(ref e) = result {
            self.metrics.record_consume_failure(e.kind());
            debug!(user_id, kind = e.kind(), "phone number request rejected: {}", e);
        }

        result
    }

    async fn consume_validated(
        &self,
        user_id: &str,
        request: ConsumeRequest,
    ) -> Result<GenerateNumbersResponse> {
        let lock = self.locks.for_user(user_id);
        let _guard = lock.mutex.lock().await;

        let user = self
            .repository
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let requested = request.quantity();
        let remaining = user.remaining();
        if requested > remaining {
            return Err(AppError::QuotaExceeded {
                requested,
                remaining,
            });
        }

        let require_all = matches!(request, ConsumeRequest::Count(_));
        let sourced = self.source_numbers(user_id, request).await?;

        // Inventory rows leave the store only together with the charge.
        let outcome = self
            .repository
            .charge_and_retire(user_id, requested, &sourced.inventory_ids, require_all)
            .await?;
        match outcome {
            ChargeOutcome::Charged(_) => {}
            ChargeOutcome::QuotaRejected => {
                let remaining = self
                    .repository
                    .find_user(user_id)
                    .await?
                    .map(|u| u.remaining())
                    .unwrap_or(0);
                return Err(AppError::QuotaExceeded {
                    requested,
                    remaining,
                });
            }
            ChargeOutcome::InventoryClaimed { available } => {
                return Err(AppError::InventoryShortage {
                    requested,
                    available,
                });
            }
        }

        self.metrics.record_consumed(sourced.policy, requested as u64);
        info!(
            user_id,
            count = requested,
            policy = sourced.policy,
            "phone numbers consumed"
        );

        Ok(GenerateNumbersResponse {
            count: requested,
            phone_numbers: sourced.numbers,
        })
    }

    async fn source_numbers(&self, user_id: &str, request: ConsumeRequest) -> Result<Sourced> {
        match request {
            ConsumeRequest::Count(count) => match self.source {
                NumberSource::Inventory => {
                    let rows = self
                        .repository
                        .find_assigned_numbers(user_id, count)
                        .await?;
                    let available = rows.len() as i64;
                    if available < count {
                        return Err(AppError::InventoryShortage {
                            requested: count,
                            available,
                        });
                    }

                    let (inventory_ids, numbers): (Vec<Uuid>, Vec<String>) = rows
                        .into_iter()
                        .map(|row| (row.id, strip_plus(&row.number)))
                        .unzip();
                    Ok(Sourced {
                        numbers,
                        inventory_ids,
                        policy: "inventory",
                    })
                }
                NumberSource::Synthetic => Ok(Sourced {
                    numbers: self
                        .synthetic
                        .generate(count as usize)
                        .iter()
                        .map(|n| strip_plus(n))
                        .collect(),
                    inventory_ids: Vec::new(),
                    policy: "synthetic",
                }),
            },
            ConsumeRequest::Custom(numbers) => {
                // Earmarked rows are retired alongside, whatever their values.
                let rows = self
                    .repository
                    .find_assigned_numbers(user_id, numbers.len() as i64)
                    .await?;
                Ok(Sourced {
                    numbers,
                    inventory_ids: rows.into_iter().map(|row| row.id).collect(),
                    policy: "custom",
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{MemoryDatabase, MockRepository};
    use crate::models::{InventoryNumber, UserQuota};
    use chrono::Utc;

    const MAX_PER_REQUEST: i64 = 100;

    fn manager(db: &MemoryDatabase, source: NumberSource) -> QuotaManager {
        QuotaManager::new(
            Arc::new(db.clone()),
            source,
            SyntheticNumbers::new("1"),
            MAX_PER_REQUEST,
            Arc::new(MetricsService::new().unwrap()),
        )
    }

    fn count(n: i64) -> GenerateNumbersRequest {
        GenerateNumbersRequest {
            count: Some(n),
            custom_phone_numbers: None,
        }
    }

    fn custom(numbers: &[&str]) -> GenerateNumbersRequest {
        GenerateNumbersRequest {
            count: None,
            custom_phone_numbers: Some(numbers.iter().map(|s| s.to_string()).collect()),
        }
    }

    async fn user_with_usage(db: &MemoryDatabase, assigned: i64, used: i64) {
        db.insert_user(UserQuota {
            user_id: "u1".to_string(),
            name: "Alice".to_string(),
            phone_numbers_assigned: assigned,
            phone_numbers_used: used,
            is_admin: false,
            created_at: Utc::now(),
        })
        .await;
    }

    async fn used(db: &MemoryDatabase) -> i64 {
        db.find_user("u1").await.unwrap().unwrap().phone_numbers_used
    }

    #[test]
    fn test_request_validation() {
        assert_eq!(
            ConsumeRequest::parse(count(3), 10).unwrap(),
            ConsumeRequest::Count(3)
        );
        assert_eq!(
            ConsumeRequest::parse(count(10), 10).unwrap(),
            ConsumeRequest::Count(10)
        );
        assert!(ConsumeRequest::parse(GenerateNumbersRequest::default(), 10).is_err());
        assert!(ConsumeRequest::parse(count(0), 10).is_err());
        assert!(ConsumeRequest::parse(count(-2), 10).is_err());
        assert!(ConsumeRequest::parse(custom(&[]), 10).is_err());
        assert!(ConsumeRequest::parse(
            GenerateNumbersRequest {
                count: Some(1),
                custom_phone_numbers: Some(vec!["1".to_string()]),
            },
            10
        )
        .is_err());
    }

    #[test]
    fn test_request_size_is_capped() {
        let err = ConsumeRequest::parse(count(11), 10).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.to_string().contains("At most 10"));

        let err = ConsumeRequest::parse(count(i64::MAX), 10).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = ConsumeRequest::parse(custom(&["1", "2", "3"]), 2).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_oversized_count_is_rejected_before_charging() {
        let db = MemoryDatabase::new();
        user_with_usage(&db, 1 << 42, 0).await;

        let err = manager(&db, NumberSource::Synthetic)
            .consume("u1", count(1 << 42))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(used(&db).await, 0);
    }

    #[tokio::test]
    async fn test_inventory_consumption_strips_plus_and_deletes_rows() {
        let db = MemoryDatabase::new();
        user_with_usage(&db, 5, 3).await;
        db.insert_number("+14155550100", Some("u1")).await;
        db.insert_number("+14155550101", Some("u1")).await;

        let response = manager(&db, NumberSource::Inventory)
            .consume("u1", count(2))
            .await
            .unwrap();

        assert_eq!(response.count, 2);
        assert_eq!(response.phone_numbers, vec!["14155550100", "14155550101"]);
        assert_eq!(used(&db).await, 5);
        assert_eq!(db.number_count().await, 0);
    }

    #[tokio::test]
    async fn test_quota_exceeded_leaves_usage_untouched() {
        let db = MemoryDatabase::new();
        user_with_usage(&db, 5, 3).await;
        db.insert_number("+14155550100", Some("u1")).await;
        db.insert_number("+14155550101", Some("u1")).await;
        db.insert_number("+14155550102", Some("u1")).await;

        let err = manager(&db, NumberSource::Inventory)
            .consume("u1", count(3))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::QuotaExceeded {
                requested: 3,
                remaining: 2
            }
        ));
        assert_eq!(used(&db).await, 3);
        assert_eq!(db.number_count().await, 3);
    }

    #[tokio::test]
    async fn test_exact_remaining_succeeds_once() {
        let db = MemoryDatabase::new();
        user_with_usage(&db, 2, 0).await;
        let manager = manager(&db, NumberSource::Synthetic);

        assert!(manager.consume("u1", count(2)).await.is_ok());
        let err = manager.consume("u1", count(1)).await.unwrap_err();
        assert!(matches!(err, AppError::QuotaExceeded { .. }));
        assert_eq!(used(&db).await, 2);
    }

    #[tokio::test]
    async fn test_inventory_shortage_reports_available_without_charging() {
        let db = MemoryDatabase::new();
        user_with_usage(&db, 10, 0).await;
        db.insert_number("+14155550100", Some("u1")).await;
        db.insert_number("+14155550199", Some("someone-else")).await;

        let manager = manager(&db, NumberSource::Inventory);
        let err = manager.consume("u1", count(3)).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::InventoryShortage {
                requested: 3,
                available: 1
            }
        ));
        assert!(err.to_string().contains("Only 1 phone numbers available"));
        assert_eq!(used(&db).await, 0);
        assert_eq!(db.number_count().await, 2);
    }

    #[tokio::test]
    async fn test_empty_inventory() {
        let db = MemoryDatabase::new();
        user_with_usage(&db, 10, 0).await;

        let err = manager(&db, NumberSource::Inventory)
            .consume("u1", count(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InventoryShortage { available: 0, .. }
        ));
        assert!(err.to_string().starts_with("No phone numbers available"));
    }

    #[tokio::test]
    async fn test_synthetic_numbers_have_no_plus() {
        let db = MemoryDatabase::new();
        user_with_usage(&db, 10, 0).await;

        let response = manager(&db, NumberSource::Synthetic)
            .consume("u1", count(4))
            .await
            .unwrap();

        assert_eq!(response.count, 4);
        assert_eq!(response.phone_numbers.len(), 4);
        assert!(response.phone_numbers.iter().all(|n| !n.contains('+')));
        assert_eq!(used(&db).await, 4);
    }

    #[tokio::test]
    async fn test_custom_numbers_echoed_verbatim_and_inventory_retired() {
        let db = MemoryDatabase::new();
        user_with_usage(&db, 5, 0).await;
        db.insert_number("+14155550100", Some("u1")).await;
        db.insert_number("+14155550101", Some("u1")).await;
        db.insert_number("+14155550102", Some("u1")).await;

        let response = manager(&db, NumberSource::Inventory)
            .consume("u1", custom(&["+441234", "+441234"]))
            .await
            .unwrap();

        assert_eq!(response.count, 2);
        assert_eq!(response.phone_numbers, vec!["+441234", "+441234"]);
        assert_eq!(used(&db).await, 2);
        assert_eq!(db.number_count().await, 1);
    }

    #[tokio::test]
    async fn test_custom_numbers_ignore_inventory_shortage() {
        let db = MemoryDatabase::new();
        user_with_usage(&db, 5, 0).await;

        let response = manager(&db, NumberSource::Inventory)
            .consume("u1", custom(&["123"]))
            .await
            .unwrap();
        assert_eq!(response.phone_numbers, vec!["123"]);
        assert_eq!(used(&db).await, 1);
    }

    #[tokio::test]
    async fn test_custom_numbers_over_remaining_quota_are_rejected() {
        let db = MemoryDatabase::new();
        user_with_usage(&db, 2, 0).await;
        db.insert_number("+14155550100", Some("u1")).await;
        db.insert_number("+14155550101", Some("u1")).await;
        db.insert_number("+14155550102", Some("u1")).await;

        let err = manager(&db, NumberSource::Inventory)
            .consume("u1", custom(&["+1", "+2", "+3"]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AppError::QuotaExceeded {
                requested: 3,
                remaining: 2
            }
        ));
        assert_eq!(used(&db).await, 0);
        assert_eq!(db.number_count().await, 3);
    }

    #[tokio::test]
    async fn test_invalid_request_and_unknown_user_do_not_mutate() {
        let db = MemoryDatabase::new();
        user_with_usage(&db, 5, 0).await;
        let manager = manager(&db, NumberSource::Synthetic);

        let err = manager
            .consume("u1", GenerateNumbersRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = manager.consume("ghost", count(1)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(used(&db).await, 0);
    }

    #[tokio::test]
    async fn test_user_locks_are_released_after_use() {
        let db = MemoryDatabase::new();
        user_with_usage(&db, 5, 0).await;
        let manager = manager(&db, NumberSource::Synthetic);

        manager.consume("u1", count(1)).await.unwrap();
        manager.consume("u1", count(10)).await.unwrap_err();
        manager.consume("ghost", count(1)).await.unwrap_err();
        manager.consume("other-ghost", count(1)).await.unwrap_err();

        assert!(manager.locks.locks.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_requests_never_exceed_quota() {
        let db = MemoryDatabase::new();
        user_with_usage(&db, 10, 0).await;
        let manager = Arc::new(manager(&db, NumberSource::Synthetic));

        let handles: Vec<_> = (0..25)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.consume("u1", count(1)).await })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 10);
        assert_eq!(used(&db).await, 10);
        assert!(manager.locks.locks.is_empty());
    }

    fn alice(used: i64) -> UserQuota {
        UserQuota {
            user_id: "u1".to_string(),
            name: "Alice".to_string(),
            phone_numbers_assigned: 5,
            phone_numbers_used: used,
            is_admin: false,
            created_at: Utc::now(),
        }
    }

    fn earmarked(number: &str) -> InventoryNumber {
        InventoryNumber {
            id: Uuid::new_v4(),
            number: number.to_string(),
            is_assigned: true,
            assigned_user: Some("u1".to_string()),
            created_at: Utc::now(),
        }
    }

    fn mocked(repo: MockRepository, source: NumberSource) -> QuotaManager {
        QuotaManager::new(
            Arc::new(repo),
            source,
            SyntheticNumbers::new("1"),
            MAX_PER_REQUEST,
            Arc::new(MetricsService::new().unwrap()),
        )
    }

    #[tokio::test]
    async fn test_lost_charge_race_is_reported_as_quota_exceeded() {
        let mut repo = MockRepository::new();
        let mut reads = vec![alice(4), alice(0)];
        repo.expect_find_user()
            .times(2)
            .returning(move |_| Ok(reads.pop()));
        repo.expect_charge_and_retire()
            .times(1)
            .returning(|_, _, _, _| Ok(ChargeOutcome::QuotaRejected));

        let err = mocked(repo, NumberSource::Synthetic)
            .consume("u1", count(2))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::QuotaExceeded {
                requested: 2,
                remaining: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_rows_claimed_elsewhere_are_reported_as_shortage() {
        let mut repo = MockRepository::new();
        let rows = vec![earmarked("+14155550100"), earmarked("+14155550101")];
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

        repo.expect_find_user().returning(|_| Ok(Some(alice(0))));
        repo.expect_find_assigned_numbers()
            .returning(move |_, _| Ok(rows.clone()));
        repo.expect_charge_and_retire()
            .withf(move |_, amount, retire, require_all| {
                *amount == 2 && retire.to_vec() == ids && *require_all
            })
            .times(1)
            .returning(|_, _, _, _| Ok(ChargeOutcome::InventoryClaimed { available: 1 }));

        let err = mocked(repo, NumberSource::Inventory)
            .consume("u1", count(2))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InventoryShortage {
                requested: 2,
                available: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_custom_numbers_retire_inventory_leniently() {
        let mut repo = MockRepository::new();
        let row = earmarked("+14155550100");

        repo.expect_find_user().returning(|_| Ok(Some(alice(0))));
        repo.expect_find_assigned_numbers()
            .returning(move |_, _| Ok(vec![row.clone()]));
        repo.expect_charge_and_retire()
            .withf(|_, amount, retire, require_all| {
                *amount == 2 && retire.len() == 1 && !*require_all
            })
            .times(1)
            .returning(|_, _, _, _| Ok(ChargeOutcome::Charged(alice(2))));

        let response = mocked(repo, NumberSource::Synthetic)
            .consume("u1", custom(&["+15551234567", "+15557654321"]))
            .await
            .unwrap();
        assert_eq!(response.phone_numbers, vec!["+15551234567", "+15557654321"]);
    }

    #[tokio::test]
    async fn test_store_failure_during_charge_is_an_error() {
        let mut repo = MockRepository::new();
        let row = earmarked("+14155550100");

        repo.expect_find_user().returning(|_| Ok(Some(alice(0))));
        repo.expect_find_assigned_numbers()
            .returning(move |_, _| Ok(vec![row.clone()]));
        repo.expect_charge_and_retire()
            .times(1)
            .returning(|_, _, _, _| Err(AppError::Internal(anyhow::anyhow!("connection reset"))));

        let err = mocked(repo, NumberSource::Inventory)
            .consume("u1", count(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
