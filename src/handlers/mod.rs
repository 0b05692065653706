use std::sync::Arc;

use crate::{
    auth::JwtService,
    config::Config,
    database::Repository,
    services::{MetricsService, QuotaManager, SyntheticNumbers},
};

pub mod docs;
pub mod health;
pub mod metrics;
pub mod users;

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn Repository>,
    pub quota_manager: Arc<QuotaManager>,
    pub config: Config,
    pub metrics: Arc<MetricsService>,
    pub jwt: Arc<JwtService>,
}

impl AppState {
    pub fn new(repository: Arc<dyn Repository>, config: Config) -> anyhow::Result<Self> {
        let metrics = Arc::new(MetricsService::new()?);
        let quota_manager = Arc::new(QuotaManager::new(
            repository.clone(),
            config.number_source,
            SyntheticNumbers::new(config.synthetic_country_code.clone()),
            config.max_numbers_per_request,
            metrics.clone(),
        ));
        let jwt = Arc::new(JwtService::new(&config.jwt_secret));

        Ok(Self {
            repository,
            quota_manager,
            config,
            metrics,
            jwt,
        })
    }
}
