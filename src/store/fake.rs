use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::models::{
    ApplicationRow, NewApplication, NewUser, Role, SubjectDeletion, SubjectRow, UserCredentials,
};

use super::{PortalStore, StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    users: Vec<UserCredentials>,
    user_emails: Vec<String>,
    applications: Vec<ApplicationRow>,
    subjects: Vec<SubjectRow>,
    links: Vec<(i64, i64)>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory stand-in for [`super::PgStore`] with the same constraint behaviour.
#[derive(Default)]
pub struct FakeStore {
    tables: Mutex<Tables>,
    pub fail_inserts: bool,
    /// Reports every email as free but rejects inserts as duplicates, like a
    /// concurrent submission winning the unique constraint.
    pub conflict_on_insert: bool,
}

impl FakeStore {
    pub fn failing_inserts() -> Self {
        Self {
            fail_inserts: true,
            ..Self::default()
        }
    }

    pub fn conflicting_inserts() -> Self {
        Self {
            conflict_on_insert: true,
            ..Self::default()
        }
    }

    pub async fn set_created_at(&self, id: i64, created_at: DateTime<Utc>) {
        let mut tables = self.tables.lock().await;
        if let Some(row) = tables.applications.iter_mut().find(|row| row.id == id) {
            row.created_at = created_at;
        }
    }

    pub async fn application_count(&self) -> usize {
        self.tables.lock().await.applications.len()
    }
}

#[async_trait]
impl PortalStore for FakeStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<i64> {
        let mut tables = self.tables.lock().await;
        if tables.users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict("username"));
        }
        if tables.user_emails.contains(&user.email) {
            return Err(StoreError::Conflict("email"));
        }
        let id = tables.next_id();
        tables.user_emails.push(user.email);
        tables.users.push(UserCredentials {
            id,
            username: user.username,
            password_hash: user.password_hash,
            role: user.role,
        });
        Ok(id)
    }

    async fn find_user_by_username(&self, username: &str) -> StoreResult<Option<UserCredentials>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    async fn admin_exists(&self) -> StoreResult<bool> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().any(|u| u.role == Role::Admin))
    }

    async fn application_email_exists(&self, email: &str) -> StoreResult<bool> {
        let tables = self.tables.lock().await;
        Ok(tables.applications.iter().any(|a| a.email == email))
    }

    async fn insert_application(&self, application: NewApplication) -> StoreResult<i64> {
        if self.fail_inserts {
            return Err(StoreError::Backend(anyhow::anyhow!("insert rejected")));
        }
        if self.conflict_on_insert {
            return Err(StoreError::Conflict("email"));
        }
        let mut tables = self.tables.lock().await;
        if tables.applications.iter().any(|a| a.email == application.email) {
            return Err(StoreError::Conflict("email"));
        }

        let id = tables.next_id();
        let mut subject_ids: Vec<(i64, String)> = tables
            .subjects
            .iter()
            .filter(|s| application.subjects.contains(&s.name))
            .map(|s| (s.id, s.name.clone()))
            .collect();
        subject_ids.sort_by(|a, b| a.1.cmp(&b.1));
        for (subject_id, _) in &subject_ids {
            tables.links.push((id, *subject_id));
        }

        tables.applications.push(ApplicationRow {
            id,
            full_name: application.full_name,
            email: application.email,
            gender: application.gender,
            phone: application.phone,
            university: application.university,
            field_of_study: application.field_of_study,
            degree_level: application.degree_level.as_str().to_string(),
            application_type: application.application_type.as_str().to_string(),
            internship_duration: application.internship_duration,
            preferred_working_method: application.preferred_working_method,
            start_date: application.start_date,
            created_at: Utc::now(),
            cv_file_path: application.cv_file_path,
            motivation_file_path: application.motivation_file_path,
            subjects: subject_ids.into_iter().map(|(_, name)| name).collect(),
        });
        Ok(id)
    }

    async fn list_applications(&self) -> StoreResult<Vec<ApplicationRow>> {
        let tables = self.tables.lock().await;
        let mut rows = tables.applications.clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn count_applications_since(&self, since: DateTime<Utc>) -> StoreResult<i64> {
        let tables = self.tables.lock().await;
        Ok(tables
            .applications
            .iter()
            .filter(|a| a.created_at >= since)
            .count() as i64)
    }

    async fn list_subjects(&self) -> StoreResult<Vec<SubjectRow>> {
        let tables = self.tables.lock().await;
        let mut rows = tables.subjects.clone();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn create_subject(&self, name: &str) -> StoreResult<i64> {
        let mut tables = self.tables.lock().await;
        if tables.subjects.iter().any(|s| s.name == name) {
            return Err(StoreError::Conflict("name"));
        }
        let id = tables.next_id();
        tables.subjects.push(SubjectRow {
            id,
            name: name.to_string(),
        });
        Ok(id)
    }

    async fn rename_subject(&self, id: i64, name: &str) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        if tables.subjects.iter().any(|s| s.name == name && s.id != id) {
            return Err(StoreError::Conflict("name"));
        }
        let subject = tables
            .subjects
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StoreError::NotFound)?;
        subject.name = name.to_string();
        Ok(())
    }

    async fn delete_subjects(&self, ids: &[i64]) -> StoreResult<SubjectDeletion> {
        let mut tables = self.tables.lock().await;
        let mut outcome = SubjectDeletion::default();
        for subject in tables.subjects.iter().filter(|s| ids.contains(&s.id)) {
            if tables.links.iter().any(|(_, sid)| *sid == subject.id) {
                outcome.in_use.push(subject.id);
            } else {
                outcome.deleted.push(subject.id);
            }
        }
        tables.subjects.retain(|s| !outcome.deleted.contains(&s.id));
        outcome.deleted.sort_unstable();
        outcome.in_use.sort_unstable();
        Ok(outcome)
    }
}
