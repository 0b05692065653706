use anyhow::{bail, Result};
use std::env;

use crate::services::NumberSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl StoreBackend {
    fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => bail!("Unsupported STORE_BACKEND: {}", other),
        }
    }
}

/// Upper bound for `MAX_NUMBERS_PER_REQUEST`.
pub const MAX_NUMBERS_PER_REQUEST_CEILING: i64 = 100_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    pub store_backend: StoreBackend,
    pub number_source: NumberSource,
    pub synthetic_country_code: String,
    pub max_numbers_per_request: i64,
    pub request_timeout_secs: u64,
    pub db_max_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let synthetic_country_code = env::var("SYNTHETIC_COUNTRY_CODE")
            .unwrap_or_else(|_| "1".to_string());
        if synthetic_country_code.is_empty()
            || !synthetic_country_code.chars().all(|c| c.is_ascii_digit())
        {
            bail!("SYNTHETIC_COUNTRY_CODE must be a non-empty string of digits");
        }

        let max_numbers_per_request: i64 = env::var("MAX_NUMBERS_PER_REQUEST")
            .unwrap_or_else(|_| "1000".to_string())
            .parse()?;
        if !(1..=MAX_NUMBERS_PER_REQUEST_CEILING).contains(&max_numbers_per_request) {
            bail!(
                "MAX_NUMBERS_PER_REQUEST must be between 1 and {}",
                MAX_NUMBERS_PER_REQUEST_CEILING
            );
        }

        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/phone_quota".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| "your-secret-key".to_string()),
            store_backend: StoreBackend::parse(
                &env::var("STORE_BACKEND").unwrap_or_else(|_| "postgres".to_string()),
            )?,
            number_source: NumberSource::parse(
                &env::var("NUMBER_SOURCE").unwrap_or_else(|_| "inventory".to_string()),
            )?,
            synthetic_country_code,
            max_numbers_per_request,
            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,
        })
    }
}
