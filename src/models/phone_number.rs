use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct InventoryNumber {
    pub id: Uuid,
    pub number: String,
    pub is_assigned: bool,
    pub assigned_user: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Body of a consumption request. Exactly one field must be set.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateNumbersRequest {
    pub count: Option<i64>,
    pub custom_phone_numbers: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateNumbersResponse {
    pub count: i64,
    pub phone_numbers: Vec<String>,
}
