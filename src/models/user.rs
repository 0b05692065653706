use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UserQuota {
    pub user_id: String,
    pub name: String,
    pub phone_numbers_assigned: i64,
    pub phone_numbers_used: i64,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl UserQuota {
    pub fn remaining(&self) -> i64 {
        self.phone_numbers_assigned - self.phone_numbers_used
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub user_id: String,
    pub name: String,
    pub phone_numbers_assigned: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub user_id: String,
    pub name: String,
    pub phone_numbers_assigned: i64,
    pub phone_numbers_used: i64,
}

impl From<UserQuota> for UserResponse {
    fn from(user: UserQuota) -> Self {
        Self {
            user_id: user.user_id,
            name: user.name,
            phone_numbers_assigned: user.phone_numbers_assigned,
            phone_numbers_used: user.phone_numbers_used,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserListEntry {
    pub user_id: String,
    pub name: String,
    pub phone_numbers_assigned: i64,
    pub phone_numbers_used: i64,
    pub created_at: DateTime<Utc>,
}

impl From<UserQuota> for UserListEntry {
    fn from(user: UserQuota) -> Self {
        Self {
            user_id: user.user_id,
            name: user.name,
            phone_numbers_assigned: user.phone_numbers_assigned,
            phone_numbers_used: user.phone_numbers_used,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserProfileResponse {
    pub user_id: String,
    pub name: String,
    pub phone_numbers_assigned: i64,
    pub phone_numbers_used: i64,
    pub phone_numbers_remaining: i64,
}

impl From<UserQuota> for UserProfileResponse {
    fn from(user: UserQuota) -> Self {
        let phone_numbers_remaining = user.remaining();
        Self {
            user_id: user.user_id,
            name: user.name,
            phone_numbers_assigned: user.phone_numbers_assigned,
            phone_numbers_used: user.phone_numbers_used,
            phone_numbers_remaining,
        }
    }
}
