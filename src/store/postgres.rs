use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::models::{
    ApplicationRow, NewApplication, NewUser, Role, SubjectDeletion, SubjectRow, UserCredentials,
};

use super::{PortalStore, StoreError, StoreResult};

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("failed to connect to Postgres")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run database migrations")?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }
}

/// Maps unique violations to [`StoreError::Conflict`], naming the field via
/// the violated constraint.
fn classify(err: sqlx::Error, field_for: fn(Option<&str>) -> &'static str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return StoreError::Conflict(field_for(db_err.constraint()));
        }
    }
    err.into()
}

fn user_conflict_field(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some("users_email_key") => "email",
        _ => "username",
    }
}

fn application_conflict_field(_: Option<&str>) -> &'static str {
    "email"
}

fn subject_conflict_field(_: Option<&str>) -> &'static str {
    "name"
}

#[async_trait]
impl PortalStore for PgStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO users (username, email, password_hash, role) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|err| classify(err, user_conflict_field))
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<UserCredentials>> {
        let row = sqlx::query_as::<_, (i64, String, String, String)>(
            "SELECT id, username, password_hash, role FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(
            row.map(|(id, username, password_hash, role)| UserCredentials {
                id,
                username,
                password_hash,
                role: Role::from_db(&role),
            }),
        )
    }

    async fn admin_exists(&self) -> StoreResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE role = 'admin')")
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn application_email_exists(&self, email: &str) -> StoreResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM applications WHERE email = $1)",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn insert_application(&self, application: NewApplication) -> StoreResult<i64> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO applications (
                full_name, gender, email, phone, university,
                field_of_study, degree_level, application_type,
                internship_duration, preferred_working_method,
                start_date, cv_file_path, motivation_file_path
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id",
        )
        .bind(&application.full_name)
        .bind(&application.gender)
        .bind(&application.email)
        .bind(&application.phone)
        .bind(&application.university)
        .bind(&application.field_of_study)
        .bind(application.degree_level.as_str())
        .bind(application.application_type.as_str())
        .bind(&application.internship_duration)
        .bind(&application.preferred_working_method)
        .bind(application.start_date)
        .bind(&application.cv_file_path)
        .bind(application.motivation_file_path.as_deref())
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| classify(err, application_conflict_field))?;

        sqlx::query(
            "INSERT INTO application_subjects (application_id, subject_id)
             SELECT $1, id FROM subjects WHERE name = ANY($2)
             ON CONFLICT DO NOTHING",
        )
        .bind(id)
        .bind(&application.subjects)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(id)
    }

    async fn list_applications(&self) -> StoreResult<Vec<ApplicationRow>> {
        let rows = sqlx::query_as::<_, ApplicationRow>(
            "SELECT a.id, a.full_name, a.email, a.gender, a.phone, a.university,
                    a.field_of_study, a.degree_level, a.application_type,
                    a.internship_duration, a.preferred_working_method,
                    a.start_date, a.created_at, a.cv_file_path, a.motivation_file_path,
                    COALESCE(
                        ARRAY_AGG(s.name ORDER BY s.name) FILTER (WHERE s.name IS NOT NULL),
                        ARRAY[]::TEXT[]
                    ) AS subjects
             FROM applications a
             LEFT JOIN application_subjects link ON link.application_id = a.id
             LEFT JOIN subjects s ON s.id = link.subject_id
             GROUP BY a.id
             ORDER BY a.created_at DESC, a.id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_applications_since(&self, since: DateTime<Utc>) -> StoreResult<i64> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM applications WHERE created_at >= $1")
                .bind(since)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn list_subjects(&self) -> StoreResult<Vec<SubjectRow>> {
        let rows = sqlx::query_as::<_, SubjectRow>("SELECT id, name FROM subjects ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn create_subject(&self, name: &str) -> StoreResult<i64> {
        sqlx::query_scalar::<_, i64>("INSERT INTO subjects (name) VALUES ($1) RETURNING id")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| classify(err, subject_conflict_field))
    }

    async fn rename_subject(&self, id: i64, name: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE subjects SET name = $2 WHERE id = $1")
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|err| classify(err, subject_conflict_field))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_subjects(&self, ids: &[i64]) -> StoreResult<SubjectDeletion> {
        let mut tx = self.pool.begin().await?;

        // Row locks keep concurrent intake from linking a subject between the
        // usage check and the delete.
        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM subjects WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(ids)
        .fetch_all(&mut *tx)
        .await?;

        let in_use = sqlx::query_scalar::<_, i64>(
            "SELECT DISTINCT subject_id FROM application_subjects
             WHERE subject_id = ANY($1) ORDER BY subject_id",
        )
        .bind(&existing)
        .fetch_all(&mut *tx)
        .await?;

        let deletable: Vec<i64> = existing
            .into_iter()
            .filter(|id| !in_use.contains(id))
            .collect();

        let mut deleted = if deletable.is_empty() {
            Vec::new()
        } else {
            sqlx::query_scalar::<_, i64>("DELETE FROM subjects WHERE id = ANY($1) RETURNING id")
                .bind(&deletable)
                .fetch_all(&mut *tx)
                .await?
        };
        deleted.sort_unstable();

        tx.commit().await?;
        Ok(SubjectDeletion { deleted, in_use })
    }
}
