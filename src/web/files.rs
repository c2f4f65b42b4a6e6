use std::path::{Component, Path, PathBuf};

use axum::{
    extract::{Path as AxumPath, State},
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::web::{AppState, responses::ApiError};

/// Resolves a request path below `root`, refusing anything that could escape it.
pub fn resolve_upload_path(root: &Path, requested: &str) -> Option<PathBuf> {
    if requested.is_empty() || requested.starts_with('.') {
        return None;
    }

    let relative = Path::new(requested);
    let mut resolved = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            _ => return None,
        }
    }
    Some(resolved)
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

pub async fn serve_upload(
    State(state): State<AppState>,
    AxumPath(requested): AxumPath<String>,
) -> Result<Response, ApiError> {
    let root = state.upload_dir();
    let path = resolve_upload_path(root, &requested)
        .ok_or_else(|| ApiError::bad_request("Invalid file path"))?;

    // Symlinks inside the upload root must not lead outside of it.
    let (canonical_root, canonical_path) =
        match (tokio::fs::canonicalize(root).await, tokio::fs::canonicalize(&path).await) {
            (Ok(root), Ok(path)) => (root, path),
            _ => return Err(ApiError::NotFound("File not found".to_string())),
        };
    if !canonical_path.starts_with(&canonical_root) {
        return Err(ApiError::bad_request("Invalid file path"));
    }

    let bytes = match tokio::fs::read(&canonical_path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("File not found".to_string()));
        }
        Err(err) => {
            error!(?err, file = %canonical_path.display(), "failed to read upload");
            return Err(ApiError::internal(err));
        }
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(&canonical_path)),
    );
    Ok((headers, bytes).into_response())
}
