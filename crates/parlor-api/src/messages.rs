use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use tracing::{info, warn};
use uuid::Uuid;

use parlor_types::api::{ErrorResponse, RefreshMessage, RefreshResponse};
use parlor_types::models::SessionUser;

use crate::error::AppError;
use crate::groups::{GroupAccess, check_access, render_detail};
use crate::routes::AppState;
use crate::uploads::{MultipartForm, UploadKind};
use crate::views;

pub const EMPTY_MESSAGE: &str = "Message cannot be empty";

/// POST /groups/{id}/message: multipart body with `text` and an optional `image`.
pub async fn post_message(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Extension(user): Extension<SessionUser>,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let group = match check_access(&state, &group_id, &user).await? {
        GroupAccess::Member(group) => group,
        GroupAccess::NotMember => {
            warn!("{} tried to post in group {} without membership", user.login_id, group_id);
            return Ok(Redirect::to("/groups").into_response());
        }
        GroupAccess::NotFound => return Ok(Redirect::to("/groups").into_response()),
    };

    let form = MultipartForm::read(multipart, "image").await?;
    let text = Some(form.text("text").to_owned()).filter(|t| !t.is_empty());

    let image_path = match &form.file {
        Some(file) => Some(state.uploads.save(UploadKind::Message, file).await?),
        None => None,
    };

    if text.is_none() && image_path.is_none() {
        return render_detail(&state, &user, group, Some(EMPTY_MESSAGE)).await;
    }

    let message_id = Uuid::new_v4().to_string();
    let gid = group.id.clone();
    let sid = user.id.to_string();
    state
        .db(move |db| {
            db.insert_message(
                &message_id,
                &gid,
                &sid,
                text.as_deref(),
                image_path.as_deref(),
                &parlor_db::now_timestamp(),
            )
        })
        .await?;

    info!("{} posted in group {}", user.login_id, group.id);
    Ok(Redirect::to(&format!("/groups/{}", group.id)).into_response())
}

/// GET /groups/{id}/refresh: the whole history as JSON for client-side re-rendering.
/// Unlike the HTML routes, access failures answer with a JSON error instead of a redirect.
pub async fn refresh_messages(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Extension(user): Extension<SessionUser>,
) -> Result<Response, AppError> {
    let group = match check_access(&state, &group_id, &user).await? {
        GroupAccess::Member(group) => group,
        GroupAccess::NotMember => {
            warn!("{} refused refresh of group {}", user.login_id, group_id);
            return Ok((StatusCode::FORBIDDEN, Json(ErrorResponse::new("Not a member"))).into_response());
        }
        GroupAccess::NotFound => {
            return Ok((StatusCode::NOT_FOUND, Json(ErrorResponse::new("Group not found"))).into_response());
        }
    };

    let rows = state.db(move |db| db.get_messages(&group.id)).await?;
    let messages = views::messages(rows)
        .into_iter()
        .map(|m| RefreshMessage {
            sender: m.sender,
            text: m.text.unwrap_or_default(),
            image_path: m.image_path.unwrap_or_default(),
            created_at: m.created_at,
        })
        .collect();

    Ok(Json(RefreshResponse { messages }).into_response())
}
