//! Shared application state.

use sqlx::PgPool;
use std::sync::Arc;

use crate::{
    auth::AuthManager,
    config::Config,
    db::{ChatSessionRepository, DoctorRepository, PatientRepository},
    services::{CloudinaryStorage, InferenceClient, ObjectStorage},
    Error, Result,
};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: Arc<AuthManager>,
    pub db_pool: PgPool,
    pub doctors: DoctorRepository,
    pub patients: PatientRepository,
    pub chat_sessions: ChatSessionRepository,
    pub storage: Arc<dyn ObjectStorage>,
    pub inference: Arc<InferenceClient>,
}

impl AppState {
    /// Initialize the application state: connect the pool, run migrations,
    /// build the service clients.
    pub async fn new(config: Config) -> Result<Self> {
        tracing::info!("Initializing application state...");

        let db_pool = create_db_pool(&config).await?;

        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .map_err(|e| Error::Internal(format!("Migration failed: {e}")))?;

        let state = Self::with_pool(config, db_pool)?;
        tracing::info!("Application state initialized successfully");
        Ok(state)
    }

    /// Build state around an existing pool. Does not run migrations; used by
    /// tests with a lazily-connected pool.
    pub fn with_pool(config: Config, db_pool: PgPool) -> Result<Self> {
        let config = Arc::new(config);

        let auth = Arc::new(AuthManager::new(
            &config.auth.jwt_secret,
            config.auth.token_ttl_seconds,
            config.auth.cookie_secure,
        ));

        let storage: Arc<dyn ObjectStorage> = Arc::new(CloudinaryStorage::new(&config.media)?);
        let inference = Arc::new(InferenceClient::new(&config.inference)?);

        Ok(Self {
            config,
            auth,
            doctors: DoctorRepository::new(db_pool.clone()),
            patients: PatientRepository::new(db_pool.clone()),
            chat_sessions: ChatSessionRepository::new(db_pool.clone()),
            db_pool,
            storage,
            inference,
        })
    }
}

async fn create_db_pool(config: &Config) -> Result<PgPool> {
    tracing::info!("Creating database connection pool...");

    let statement_timeout = config.database.statement_timeout_seconds;
    let lock_timeout = config.database.lock_timeout_seconds;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .min_connections(config.database.pool_min_size)
        .max_connections(config.database.pool_max_size)
        .acquire_timeout(std::time::Duration::from_secs(
            config.database.pool_timeout_seconds,
        ))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                sqlx::query(&format!("SET statement_timeout = '{}s'", statement_timeout))
                    .execute(&mut *conn)
                    .await?;

                sqlx::query(&format!("SET lock_timeout = '{}s'", lock_timeout))
                    .execute(&mut *conn)
                    .await?;

                Ok(())
            })
        })
        .connect(&config.database.url)
        .await
        .map_err(Error::Database)?;

    tracing::info!(
        "Database pool created (min: {}, max: {})",
        config.database.pool_min_size,
        config.database.pool_max_size
    );

    Ok(pool)
}
