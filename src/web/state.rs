use std::{path::Path, sync::Arc};

use anyhow::{Context, Result, anyhow};
use chrono::Duration;
use tracing::info;

use crate::{
    config::{PortalConfig, SessionBackend},
    models::{NewUser, Role},
    store::{PgStore, PortalStore, StoreError},
    web::session::{MemorySessionStore, PgSessionStore, SessionStore},
};

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn PortalStore>,
    sessions: Arc<dyn SessionStore>,
    config: Arc<PortalConfig>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn PortalStore>,
        sessions: Arc<dyn SessionStore>,
        config: PortalConfig,
    ) -> Self {
        Self {
            store,
            sessions,
            config: Arc::new(config),
        }
    }

    /// Connects to Postgres, runs migrations and picks the configured session store.
    pub async fn connect(config: PortalConfig) -> Result<Self> {
        let store = PgStore::connect(&config.database_url, config.db_max_connections).await?;

        let sessions: Arc<dyn SessionStore> = match config.session_backend {
            SessionBackend::Postgres => Arc::new(PgSessionStore::new(store.pool())),
            SessionBackend::Memory => Arc::new(MemorySessionStore::default()),
        };

        tokio::fs::create_dir_all(&config.upload_dir)
            .await
            .with_context(|| {
                format!(
                    "failed to ensure upload directory at {}",
                    config.upload_dir.display()
                )
            })?;

        Ok(Self::new(Arc::new(store), sessions, config))
    }

    /// Provisions the configured admin account when no admin exists yet.
    pub async fn ensure_seed_admin(&self) -> Result<()> {
        let Some(seed) = self.config.seed_admin.as_ref() else {
            return Ok(());
        };

        let has_admin = self
            .store
            .admin_exists()
            .await
            .context("failed to verify admin presence")?;
        if has_admin {
            return Ok(());
        }

        let password_hash = crate::web::auth::hash_password(&seed.password)
            .map_err(|err| anyhow!("failed to hash seed admin password: {err}"))?;

        match self
            .store
            .create_user(NewUser {
                username: seed.username.clone(),
                email: seed.email.clone(),
                password_hash,
                role: Role::Admin,
            })
            .await
        {
            Ok(_) => {
                info!(username = %seed.username, "seeded admin user");
                Ok(())
            }
            Err(StoreError::Conflict(field)) => Err(anyhow!(
                "cannot seed admin `{}`: a user with that {field} already exists",
                seed.username
            )),
            Err(err) => Err(anyhow!("failed to insert seed admin user: {err}")),
        }
    }

    pub fn store(&self) -> &dyn PortalStore {
        self.store.as_ref()
    }

    pub fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn upload_dir(&self) -> &Path {
        &self.config.upload_dir
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::hours(self.config.session_ttl_hours)
    }
}
