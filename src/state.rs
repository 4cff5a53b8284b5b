use std::sync::Arc;

use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};

use crate::{
    auth::session::SessionService,
    config::AppConfig,
    db::PgPool,
    error::{AppError, AppResult},
    storage::ArtifactStore,
};

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub sessions: SessionService,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        artifacts: Arc<dyn ArtifactStore>,
        sessions: SessionService,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            artifacts,
            sessions,
        }
    }

    pub fn db(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }
}
