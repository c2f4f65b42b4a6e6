use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use tracing::info;

use crate::{
    models::{SubjectDeletion, SubjectRow},
    store::StoreError,
    web::{
        AppState,
        auth::require_admin,
        responses::{ApiError, Success},
    },
};

#[derive(Deserialize)]
pub struct CreateSubject {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
pub struct RenameSubject {
    #[serde(default)]
    id: i64,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
pub struct DeleteSubjects {
    #[serde(default)]
    ids: Vec<i64>,
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|_| ApiError::bad_request("Invalid JSON"))
}

pub async fn list_subjects(State(state): State<AppState>) -> Result<Json<Vec<SubjectRow>>, ApiError> {
    Ok(Json(state.store().list_subjects().await?))
}

pub async fn create_subject(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<CreateSubject>, JsonRejection>,
) -> Result<(StatusCode, Json<Success>), ApiError> {
    require_admin(&state, &jar).await?;
    let body = json_body(payload)?;

    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("Subject name required"));
    }

    match state.store().create_subject(name).await {
        Ok(id) => {
            info!(subject_id = id, name, "created subject");
            Ok((StatusCode::CREATED, Json(Success::OK)))
        }
        Err(StoreError::Conflict(_)) => Err(ApiError::conflict("Subject already exists")),
        Err(err) => Err(err.into()),
    }
}

pub async fn rename_subject(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<RenameSubject>, JsonRejection>,
) -> Result<Json<Success>, ApiError> {
    require_admin(&state, &jar).await?;
    let body = json_body(payload)?;

    let name = body.name.trim();
    if body.id == 0 || name.is_empty() {
        return Err(ApiError::bad_request("Invalid payload"));
    }

    match state.store().rename_subject(body.id, name).await {
        Ok(()) => Ok(Json(Success::OK)),
        Err(StoreError::Conflict(_)) => Err(ApiError::conflict("Subject name already exists")),
        Err(StoreError::NotFound) => Err(ApiError::NotFound("Subject not found".to_string())),
        Err(err) => Err(err.into()),
    }
}

pub async fn delete_subjects(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<DeleteSubjects>, JsonRejection>,
) -> Result<Json<SubjectDeletion>, ApiError> {
    require_admin(&state, &jar).await?;
    let mut body = json_body(payload)?;

    body.ids.sort_unstable();
    body.ids.dedup();
    if body.ids.is_empty() {
        return Err(ApiError::bad_request("No subjects selected"));
    }

    let outcome = state.store().delete_subjects(&body.ids).await?;
    info!(
        deleted = outcome.deleted.len(),
        in_use = outcome.in_use.len(),
        "deleted subjects"
    );
    Ok(Json(outcome))
}
