use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{models::Role, store::StoreResult};

/// Authenticated identity bound to a session token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

/// Server-side mapping from opaque session tokens to identities.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn issue(&self, user: AuthUser, ttl: Duration) -> StoreResult<Uuid>;

    /// Returns the identity for a live token; expired tokens resolve to `None`.
    async fn resolve(&self, token: Uuid) -> StoreResult<Option<AuthUser>>;

    /// Invalidates the token. Unknown tokens are ignored.
    async fn revoke(&self, token: Uuid) -> StoreResult<()>;
}

pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn issue(&self, user: AuthUser, ttl: Duration) -> StoreResult<Uuid> {
        let token = Uuid::new_v4();
        sqlx::query("INSERT INTO sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(token)
            .bind(user.id)
            .bind(Utc::now() + ttl)
            .execute(&self.pool)
            .await?;
        Ok(token)
    }

    async fn resolve(&self, token: Uuid) -> StoreResult<Option<AuthUser>> {
        let row = sqlx::query_as::<_, (i64, String, String)>(
            "SELECT users.id, users.username, users.role FROM sessions JOIN users ON users.id = sessions.user_id WHERE sessions.id = $1 AND sessions.expires_at > NOW()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, username, role)| AuthUser {
            id,
            username,
            role: Role::from_db(&role),
        }))
    }

    async fn revoke(&self, token: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Process-local session store. Sessions do not survive a restart.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<Uuid, (AuthUser, DateTime<Utc>)>>,
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn issue(&self, user: AuthUser, ttl: Duration) -> StoreResult<Uuid> {
        let token = Uuid::new_v4();
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, (_, expires_at)| *expires_at > now);
        sessions.insert(token, (user, now + ttl));
        Ok(token)
    }

    async fn resolve(&self, token: Uuid) -> StoreResult<Option<AuthUser>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(&token)
            .filter(|(_, expires_at)| *expires_at > Utc::now())
            .map(|(user, _)| user.clone()))
    }

    async fn revoke(&self, token: Uuid) -> StoreResult<()> {
        self.sessions.write().await.remove(&token);
        Ok(())
    }
}
