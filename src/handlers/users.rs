use axum::{extract::State, http::StatusCode, response::Json};

use crate::{
    errors::{AppError, Result},
    handlers::AppState,
    middleware::{AdminUser, AppJson, AuthenticatedUser},
    models::{
        CreateUserRequest, GenerateNumbersRequest, GenerateNumbersResponse, UserListEntry,
        UserProfileResponse, UserResponse,
    },
};

/// Create a user with an initial phone number allocation.
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Duplicate user ID or invalid body"),
        (status = 403, description = "Caller is not an administrator")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    AppJson(request): AppJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    let user_id = request.user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::Validation("userId is required".to_string()));
    }

    let assigned = request.phone_numbers_assigned.unwrap_or(0);
    if assigned < 0 {
        return Err(AppError::Validation(
            "phoneNumbersAssigned must not be negative".to_string(),
        ));
    }

    let user = state
        .repository
        .create_user(user_id, &request.name, assigned)
        .await?;

    state.metrics.record_user_created();
    tracing::info!(
        admin = %admin.user_id,
        user_id = %user.user_id,
        assigned,
        "user created"
    );

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// List every non-admin user.
#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "All non-admin users", body = [UserListEntry]),
        (status = 403, description = "Caller is not an administrator")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<UserListEntry>>> {
    let users = state.repository.list_users().await?;
    Ok(Json(users.into_iter().map(UserListEntry::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/users/profile",
    responses(
        (status = 200, description = "Caller's quota", body = UserProfileResponse),
        (status = 404, description = "User not found")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<UserProfileResponse>> {
    let user = state
        .repository
        .find_user(&user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(UserProfileResponse::from(user)))
}

/// Hand out phone numbers against the caller's remaining quota.
#[utoipa::path(
    post,
    path = "/api/users/generate-numbers",
    request_body = GenerateNumbersRequest,
    responses(
        (status = 200, description = "Numbers consumed", body = GenerateNumbersResponse),
        (status = 400, description = "Invalid request, quota exceeded or inventory shortage"),
        (status = 404, description = "User not found")
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn generate_phone_numbers(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    AppJson(request): AppJson<GenerateNumbersRequest>,
) -> Result<Json<GenerateNumbersResponse>> {
    let response = state
        .quota_manager
        .consume(&user.user_id, request)
        .await?;

    Ok(Json(response))
}
