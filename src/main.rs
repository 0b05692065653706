use anyhow::Result;
use clap::Parser;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use phone_quota_server::{
    auth::JwtService,
    cli::{Cli, Command},
    config::{Config, StoreBackend},
    create_app,
    database::{Database, MemoryDatabase, Repository},
    handlers::AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::IssueToken {
        user_id,
        admin,
        valid_hours,
    } = cli.command()
    {
        let config = Config::from_env()?;
        let token = JwtService::new(&config.jwt_secret)
            .with_access_token_duration(chrono::Duration::hours(*valid_hours))
            .generate_access_token(user_id, *admin)?;
        println!("{}", token);
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "phone_quota_server=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let repository: Arc<dyn Repository> = match config.store_backend {
        StoreBackend::Postgres => {
            let database = Database::new(&config.database_url, config.db_max_connections).await?;
            database.migrate().await?;
            tracing::info!("Connected to database and applied migrations");
            Arc::new(database)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on shutdown");
            Arc::new(MemoryDatabase::new())
        }
    };

    let port = config.port;
    tracing::info!(
        number_source = config.number_source.as_str(),
        "Phone number source configured"
    );

    let state = AppState::new(repository, config)?;
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install shutdown handler: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}
