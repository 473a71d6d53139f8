use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Form,
    extract::{Multipart, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::{
    SignedCookieJar,
    cookie::{Cookie, SameSite},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use tracing::{error, info, warn};
use uuid::Uuid;

use parlor_db::models::{SessionRow, UserRow};
use parlor_types::api::{LoginForm, RegisterForm};

use crate::error::{AppError, SERVER_ERROR};
use crate::middleware::{SESSION_COOKIE, current_session};
use crate::routes::AppState;
use crate::uploads::{MultipartForm, UploadKind};

/// Lifetime of a remember-me session, both cookie and server record.
pub const REMEMBER_ME_DAYS: i64 = 14;

/// Identical for unknown login ids and wrong passwords.
pub const INVALID_CREDENTIALS: &str = "Invalid login id or password";

// -- Passwords --

/// Hash a password with Argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::PasswordHash(e.to_string()))
}

/// `Ok(false)` on a wrong password; `Err` only when the stored hash is unreadable.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| AppError::PasswordHash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

// -- Registration --

pub async fn register_page(State(state): State<AppState>, jar: SignedCookieJar) -> Response {
    let user = current_session(&state, &jar).await.ok().flatten();
    state.views.form("register.html", user.as_ref(), None)
}

pub async fn register(State(state): State<AppState>, multipart: Multipart) -> Response {
    match try_register(&state, multipart).await {
        Ok(response) => response,
        Err(AppError::Multipart(e)) => AppError::Multipart(e).into_response(),
        Err(e) => {
            error!("Registration failed: {}", e);
            state.views.form("register.html", None, Some(SERVER_ERROR))
        }
    }
}

async fn try_register(state: &AppState, multipart: Multipart) -> Result<Response, AppError> {
    let upload = MultipartForm::read(multipart, "profileImage").await?;
    let mut form = RegisterForm::default();
    for (name, value) in &upload.fields {
        form.set_field(name, value.clone());
    }

    if let Err(message) = validate_registration(&form) {
        return Ok(state.views.form("register.html", None, Some(message)));
    }

    let (login_id, email) = (form.login_id.clone(), form.email.clone());
    let existing = state
        .db(move |db| db.find_user_by_login_or_email(&login_id, &email))
        .await?;
    if existing.is_some() {
        return Ok(state.views.form("register.html", None, Some(DUPLICATE_ACCOUNT)));
    }

    let password = form.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password)).await??;

    let stored_image = match &upload.file {
        Some(file) => Some(state.uploads.save(UploadKind::Profile, file).await?),
        None => None,
    };

    let user = UserRow {
        id: Uuid::new_v4().to_string(),
        login_id: form.login_id,
        nickname: form.nickname,
        email: form.email,
        profile_image: stored_image.clone(),
        password_hash,
        created_at: parlor_db::now_timestamp(),
    };
    let login_id = user.login_id.clone();

    // The unique constraints still catch a registration that raced past the lookup.
    if !state.db(move |db| db.create_user(&user)).await? {
        if let Some(path) = &stored_image {
            if let Err(e) = state.uploads.remove(path).await {
                warn!("Failed to remove orphaned profile image {}: {}", path, e);
            }
        }
        return Ok(state.views.form("register.html", None, Some(DUPLICATE_ACCOUNT)));
    }

    info!("Registered user {}", login_id);
    Ok(Redirect::to("/login").into_response())
}

const DUPLICATE_ACCOUNT: &str = "Login ID or email already used";

/// Presence and confirmation checks. Returns the message to show on the form.
pub fn validate_registration(form: &RegisterForm) -> Result<(), &'static str> {
    if [&form.login_id, &form.nickname, &form.email, &form.password]
        .iter()
        .any(|field| field.is_empty())
    {
        return Err("All fields are required");
    }
    if form.password != form.password_confirm {
        return Err("Passwords do not match");
    }
    Ok(())
}

// -- Login / logout --

pub async fn login_page(State(state): State<AppState>, jar: SignedCookieJar) -> Response {
    let user = current_session(&state, &jar).await.ok().flatten();
    state.views.form("login.html", user.as_ref(), None)
}

pub async fn login(State(state): State<AppState>, jar: SignedCookieJar, Form(form): Form<LoginForm>) -> Response {
    match try_login(&state, jar, form).await {
        Ok(response) => response,
        Err(e) => {
            error!("Login failed: {}", e);
            state.views.form("login.html", None, Some(SERVER_ERROR))
        }
    }
}

async fn try_login(state: &AppState, jar: SignedCookieJar, form: LoginForm) -> Result<Response, AppError> {
    let remember = form.remember();
    let LoginForm { login_id, password, .. } = form;

    let lookup_id = login_id.clone();
    let Some(user) = state.db(move |db| db.get_user_by_login_id(&lookup_id)).await? else {
        warn!("Login rejected: unknown login id");
        return Ok(state.views.form("login.html", None, Some(INVALID_CREDENTIALS)));
    };

    let stored_hash = user.password_hash.clone();
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash)).await??;
    if !valid {
        warn!("Login rejected: wrong password for {}", login_id);
        return Ok(state.views.form("login.html", None, Some(INVALID_CREDENTIALS)));
    }

    // Logging in again replaces whatever session this browser held before.
    if let Some(old) = jar.get(SESSION_COOKIE).map(|c| c.value().to_owned()) {
        state.db(move |db| db.delete_session(&old)).await?;
    }

    let now = chrono::Utc::now();
    let lifetime = if remember {
        chrono::Duration::days(REMEMBER_ME_DAYS)
    } else {
        state.session_ttl
    };
    let expires_at = now
        .checked_add_signed(lifetime)
        .ok_or(AppError::SessionExpiry(lifetime))?;
    let token = new_session_token();
    let session = SessionRow {
        token: token.clone(),
        user_id: user.id,
        login_id: user.login_id,
        nickname: user.nickname,
        remember,
        created_at: parlor_db::format_timestamp(now),
        expires_at: parlor_db::format_timestamp(expires_at),
    };
    state.db(move |db| db.create_session(&session)).await?;

    info!("User {} logged in (remember_me={})", login_id, remember);
    let jar = jar.add(session_cookie(token, remember));
    Ok((jar, Redirect::to("/dashboard")).into_response())
}

pub async fn logout(State(state): State<AppState>, jar: SignedCookieJar) -> Response {
    if let Some(token) = jar.get(SESSION_COOKIE).map(|c| c.value().to_owned()) {
        if let Err(e) = state.db(move |db| db.delete_session(&token)).await {
            warn!("Failed to delete session on logout: {}", e);
        }
    }

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Redirect::to("/login")).into_response()
}

// -- Session helpers --

/// 32 random bytes, URL-safe base64.
fn new_session_token() -> String {
    let bytes: [u8; 32] = rand::random();
    B64.encode(bytes)
}

/// Without remember-me the cookie has no expiry and ends with the browser session.
fn session_cookie(token: String, remember: bool) -> Cookie<'static> {
    let mut cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    if remember {
        cookie = cookie.max_age(time::Duration::days(REMEMBER_ME_DAYS));
    }
    cookie.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(login_id: &str, password: &str, confirm: &str) -> RegisterForm {
        RegisterForm {
            login_id: login_id.into(),
            nickname: "nick".into(),
            email: "a@example.com".into(),
            password: password.into(),
            password_confirm: confirm.into(),
        }
    }

    #[test]
    fn test_password_round_trip() {
        let hash = hash_password("hunter22").unwrap();
        assert_ne!(hash, "hunter22");
        assert!(verify_password("hunter22", &hash).unwrap());
        assert!(!verify_password("hunter23", &hash).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        assert_ne!(hash_password("same").unwrap(), hash_password("same").unwrap());
    }

    #[test]
    fn test_validate_registration() {
        assert_eq!(validate_registration(&form("alice", "pw", "pw")), Ok(()));
        assert_eq!(validate_registration(&form("", "pw", "pw")), Err("All fields are required"));
        assert_eq!(validate_registration(&form("alice", "", "")), Err("All fields are required"));
        assert_eq!(validate_registration(&form("alice", "pw", "px")), Err("Passwords do not match"));
    }

    #[test]
    fn test_session_cookie_expiry() {
        let session_only = session_cookie("t".into(), false);
        assert!(session_only.max_age().is_none());
        assert_eq!(session_only.http_only(), Some(true));

        let remembered = session_cookie("t".into(), true);
        assert_eq!(remembered.max_age(), Some(time::Duration::days(REMEMBER_ME_DAYS)));
    }

    #[test]
    fn test_session_tokens_are_unique() {
        let a = new_session_token();
        assert_eq!(a.len(), 43);
        assert_ne!(a, new_session_token());
    }
}
