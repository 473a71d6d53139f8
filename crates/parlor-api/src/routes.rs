use std::path::Path;
use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    handler::HandlerWithoutStateExt,
    http::{Method, StatusCode},
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::Key;
use sha2::{Digest, Sha512};
use tower_http::services::ServeDir;

use parlor_db::Database;

use crate::error::AppError;
use crate::middleware::require_session;
use crate::uploads::UploadStorage;
use crate::views::Views;
use crate::{auth, groups, messages};

/// Shared application state for all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub uploads: Arc<UploadStorage>,
    pub views: Arc<Views>,
    /// Signs the session cookie.
    pub cookie_key: Key,
    /// Server-side lifetime of sessions created without remember-me.
    pub session_ttl: chrono::Duration,
}

impl AppState {
    pub fn new(
        db: Arc<Database>,
        uploads: Arc<UploadStorage>,
        views: Arc<Views>,
        session_secret: &str,
        session_ttl: chrono::Duration,
    ) -> Self {
        // Key needs 64 bytes of material; SHA-512 stretches any secret to that.
        let digest = Sha512::digest(session_secret.as_bytes());
        Self {
            db,
            uploads,
            views,
            cookie_key: Key::from(digest.as_slice()),
            session_ttl,
        }
    }

    /// Run a blocking DB call off the async runtime.
    pub async fn db<F, T>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        Ok(tokio::task::spawn_blocking(move || f(&db)).await??)
    }
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

/// Build the full application: auth pages, session-gated group routes,
/// `/uploads`, and the public asset directory. Anything else redirects to
/// `/dashboard`.
pub fn router(state: AppState, public_dir: &Path, max_upload_bytes: usize) -> Router {
    let public_routes = Router::new()
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/logout", get(auth::logout));

    let protected_routes = Router::new()
        .route("/dashboard", get(groups::dashboard))
        .route("/groups", get(groups::list_groups))
        .route("/groups/mine", get(groups::my_groups))
        .route("/groups/create", get(groups::create_page).post(groups::create_group))
        .route("/groups/{id}", get(groups::group_detail))
        .route("/groups/{id}/join", get(groups::join_group))
        .route("/groups/{id}/leave", get(groups::leave_group))
        .route("/groups/{id}/message", post(messages::post_message))
        .route("/groups/{id}/refresh", get(messages::refresh_messages))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    let public_assets = ServeDir::new(public_dir)
        .fallback(redirect_to_dashboard.into_service())
        .call_fallback_on_method_not_allowed(true);

    let uploaded_files = ServeDir::new(state.uploads.root())
        .fallback(redirect_to_dashboard.into_service())
        .call_fallback_on_method_not_allowed(true);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .method_not_allowed_fallback(method_not_allowed)
        .nest_service("/uploads", uploaded_files)
        .fallback_service(public_assets)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

async fn redirect_to_dashboard() -> Redirect {
    Redirect::to("/dashboard")
}

/// A GET on a route that only takes other methods counts as an unmatched path.
async fn method_not_allowed(method: Method) -> Response {
    if method == Method::GET {
        Redirect::to("/dashboard").into_response()
    } else {
        StatusCode::METHOD_NOT_ALLOWED.into_response()
    }
}
