use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Stored roles are written by this crate only, so anything unknown is
    /// treated as the least privileged role.
    pub fn from_db(value: &str) -> Self {
        match value {
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegreeLevel {
    Bachelor,
    Master,
    Engineering,
}

impl DegreeLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Bachelor" => Some(DegreeLevel::Bachelor),
            "Master" => Some(DegreeLevel::Master),
            "Engineering" => Some(DegreeLevel::Engineering),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DegreeLevel::Bachelor => "Bachelor",
            DegreeLevel::Master => "Master",
            DegreeLevel::Engineering => "Engineering",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationType {
    Solo,
    Pair,
}

impl ApplicationType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Solo" => Some(ApplicationType::Solo),
            "Pair" => Some(ApplicationType::Pair),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationType::Solo => "Solo",
            ApplicationType::Pair => "Pair",
        }
    }
}

/// Validated intake payload, ready to be persisted.
#[derive(Debug, Clone)]
pub struct NewApplication {
    pub full_name: String,
    pub email: String,
    pub gender: String,
    pub phone: String,
    pub university: String,
    pub field_of_study: String,
    pub degree_level: DegreeLevel,
    pub application_type: ApplicationType,
    pub internship_duration: String,
    pub preferred_working_method: String,
    pub start_date: Option<NaiveDate>,
    pub cv_file_path: String,
    pub motivation_file_path: Option<String>,
    pub subjects: Vec<String>,
}

/// Application as listed in the backoffice, with its subject names joined in.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ApplicationRow {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub gender: String,
    pub phone: String,
    pub university: String,
    pub field_of_study: String,
    pub degree_level: String,
    pub application_type: String,
    pub internship_duration: String,
    pub preferred_working_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub cv_file_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motivation_file_path: Option<String>,
    pub subjects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct SubjectRow {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

/// Outcome of a batch subject delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubjectDeletion {
    pub deleted: Vec<i64>,
    pub in_use: Vec<i64>,
}
