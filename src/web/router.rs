use axum::{
    Router,
    extract::{DefaultBodyLimit, Request, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use tracing::warn;

use crate::web::{AppState, applications, auth, files, subjects};

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config().max_upload_bytes;

    Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::whoami))
        .route("/email-exists", get(applications::email_exists))
        .route(
            "/apply",
            post(applications::apply).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/applications", get(applications::list_applications))
        .route(
            "/weekly-applications",
            get(applications::weekly_applications),
        )
        .route(
            "/subjects",
            get(subjects::list_subjects)
                .post(subjects::create_subject)
                .put(subjects::rename_subject),
        )
        .route("/subjects/delete", delete(subjects::delete_subjects))
        .route("/uploads/*path", get(files::serve_upload))
        .route("/healthz", get(healthz))
        .layer(middleware::from_fn_with_state(state.clone(), cors))
        .with_state(state)
}

/// Credentialed CORS for the configured frontend origin. Preflight requests
/// are answered here without reaching a handler.
async fn cors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    match HeaderValue::from_str(&state.config().allowed_origin) {
        Ok(origin) => {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        }
        Err(err) => warn!(?err, "allowed origin is not a valid header value"),
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("PUT, GET, POST, DELETE, OPTIONS"),
    );
    response
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}
