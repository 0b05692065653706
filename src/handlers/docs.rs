use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health::liveness,
        crate::handlers::health::readiness,
        crate::handlers::users::create_user,
        crate::handlers::users::list_users,
        crate::handlers::users::get_profile,
        crate::handlers::users::generate_phone_numbers,
    ),
    components(
        schemas(
            crate::models::CreateUserRequest,
            crate::models::UserResponse,
            crate::models::UserListEntry,
            crate::models::UserProfileResponse,
            crate::models::GenerateNumbersRequest,
            crate::models::GenerateNumbersResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "users", description = "User quota and phone number endpoints"),
        (name = "health", description = "Health check endpoints")
    ),
    info(
        title = "Phone Number Quota API",
        version = "0.1.0",
        description = "Assigns and consumes phone numbers against a per-user quota"
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn create_docs_router() -> Router<AppState> {
    Router::new().merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
