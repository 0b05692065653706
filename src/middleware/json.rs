use axum::{extract::FromRequest, Json};

use crate::errors::AppError;

/// `Json` body extractor whose rejections go through [`AppError`], so
/// malformed or mistyped bodies get the same 400 JSON error as any other
/// invalid request.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct AppJson<T>(pub T);
