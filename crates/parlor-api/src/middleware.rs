use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::SignedCookieJar;
use tracing::{debug, warn};

use parlor_types::models::SessionUser;

use crate::error::AppError;
use crate::routes::AppState;

pub const SESSION_COOKIE: &str = "parlor_session";

/// Resolve the session named by the signed cookie, if it exists and has not expired.
pub async fn current_session(state: &AppState, jar: &SignedCookieJar) -> Result<Option<SessionUser>, AppError> {
    let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_owned()) else {
        return Ok(None);
    };

    let now = parlor_db::now_timestamp();
    let Some(row) = state.db(move |db| db.get_session(&token, &now)).await? else {
        debug!("Session cookie present but no live session");
        return Ok(None);
    };

    match row.user_id.parse() {
        Ok(id) => Ok(Some(SessionUser {
            id,
            login_id: row.login_id,
            nickname: row.nickname,
        })),
        Err(e) => {
            warn!("Corrupt user_id '{}' on session: {}", row.user_id, e);
            Ok(None)
        }
    }
}

/// Require a live session. The `SessionUser` is stored in request extensions;
/// requests without one are sent to the login page.
pub async fn require_session(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    match current_session(&state, &jar).await? {
        Some(user) => {
            req.extensions_mut().insert(user);
            Ok(next.run(req).await)
        }
        None => Ok(Redirect::to("/login").into_response()),
    }
}
