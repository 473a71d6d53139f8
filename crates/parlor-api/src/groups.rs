use axum::{
    Extension, Form,
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
};
use minijinja::context;
use tracing::{error, info, warn};
use uuid::Uuid;

use parlor_db::models::GroupRow;
use parlor_types::api::CreateGroupForm;
use parlor_types::models::SessionUser;

use crate::error::{AppError, SERVER_ERROR};
use crate::routes::AppState;
use crate::views;

/// Outcome of the membership check that guards group detail, posting and refresh.
pub enum GroupAccess {
    Member(GroupRow),
    NotMember,
    NotFound,
}

/// Look up a group and decide whether `user` may read and post in it.
pub async fn check_access(state: &AppState, group_id: &str, user: &SessionUser) -> Result<GroupAccess, AppError> {
    let gid = group_id.to_owned();
    let uid = user.id.to_string();
    state
        .db(move |db| {
            let Some(group) = db.get_group(&gid)? else {
                return Ok(GroupAccess::NotFound);
            };
            if db.is_member(&gid, &uid)? {
                Ok(GroupAccess::Member(group))
            } else {
                Ok(GroupAccess::NotMember)
            }
        })
        .await
}

/// Render the group page: members plus the full history, oldest first.
pub async fn render_detail(
    state: &AppState,
    user: &SessionUser,
    group: GroupRow,
    error: Option<&str>,
) -> Result<Response, AppError> {
    let gid = group.id.clone();
    let (members, messages) = state
        .db(move |db| Ok((db.list_members(&gid)?, db.get_messages(&gid)?)))
        .await?;

    let html = state.views.render(
        "group_detail.html",
        context! {
            current_user => user,
            group => views::group(group),
            members => views::members(members),
            messages => views::messages(messages),
            error => error,
        },
    )?;
    Ok(html.into_response())
}

// -- Lists --

pub async fn dashboard(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> Result<Response, AppError> {
    let uid = user.id.to_string();
    let rows = state.db(move |db| db.list_groups_for_member(&uid)).await?;
    let html = state.views.render(
        "dashboard.html",
        context! { current_user => &user, groups => views::groups(rows) },
    )?;
    Ok(html.into_response())
}

pub async fn list_groups(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> Result<Response, AppError> {
    let rows = state.db(|db| db.list_groups()).await?;
    let html = state.views.render(
        "groups.html",
        context! { current_user => &user, groups => views::groups(rows) },
    )?;
    Ok(html.into_response())
}

pub async fn my_groups(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
) -> Result<Response, AppError> {
    let uid = user.id.to_string();
    let rows = state.db(move |db| db.list_groups_for_member(&uid)).await?;
    let html = state.views.render(
        "my_groups.html",
        context! { current_user => &user, groups => views::groups(rows) },
    )?;
    Ok(html.into_response())
}

// -- Create --

pub async fn create_page(State(state): State<AppState>, Extension(user): Extension<SessionUser>) -> Response {
    state.views.form("group_create.html", Some(&user), None)
}

pub async fn create_group(
    State(state): State<AppState>,
    Extension(user): Extension<SessionUser>,
    Form(form): Form<CreateGroupForm>,
) -> Response {
    if form.title.is_empty() {
        return state.views.form("group_create.html", Some(&user), Some("Title is required"));
    }

    let group = GroupRow {
        id: Uuid::new_v4().to_string(),
        title: form.title,
        description: Some(form.description).filter(|d| !d.is_empty()),
        owner_id: user.id.to_string(),
        created_at: parlor_db::now_timestamp(),
    };
    let gid = group.id.clone();

    match state.db(move |db| db.create_group(&group)).await {
        Ok(()) => {
            info!("Group {} created by {}", gid, user.login_id);
            Redirect::to(&format!("/groups/{gid}")).into_response()
        }
        Err(e) => {
            error!("Group creation failed: {}", e);
            state.views.form("group_create.html", Some(&user), Some(SERVER_ERROR))
        }
    }
}

// -- Membership --

pub async fn join_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Extension(user): Extension<SessionUser>,
) -> Result<Response, AppError> {
    let gid = group_id.clone();
    let uid = user.id.to_string();
    let joined = state
        .db(move |db| {
            if db.get_group(&gid)?.is_none() {
                return Ok(None);
            }
            db.add_member(&gid, &uid, &parlor_db::now_timestamp()).map(Some)
        })
        .await?;

    match joined {
        None => Ok(Redirect::to("/groups").into_response()),
        Some(added) => {
            if added {
                info!("{} joined group {}", user.login_id, group_id);
            }
            Ok(Redirect::to(&format!("/groups/{group_id}")).into_response())
        }
    }
}

pub async fn leave_group(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Extension(user): Extension<SessionUser>,
) -> Result<Response, AppError> {
    let gid = group_id.clone();
    let uid = user.id.to_string();
    let left = state
        .db(move |db| {
            if db.get_group(&gid)?.is_none() {
                return Ok(None);
            }
            db.remove_member(&gid, &uid).map(Some)
        })
        .await?;

    match left {
        None => Ok(Redirect::to("/groups").into_response()),
        Some(removed) => {
            if removed {
                info!("{} left group {}", user.login_id, group_id);
            }
            Ok(Redirect::to("/dashboard").into_response())
        }
    }
}

// -- Detail --

pub async fn group_detail(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
    Extension(user): Extension<SessionUser>,
) -> Result<Response, AppError> {
    match check_access(&state, &group_id, &user).await? {
        GroupAccess::Member(group) => render_detail(&state, &user, group, None).await,
        GroupAccess::NotMember => {
            warn!("{} is not a member of group {}", user.login_id, group_id);
            Ok(Redirect::to("/groups").into_response())
        }
        GroupAccess::NotFound => Ok(Redirect::to("/groups").into_response()),
    }
}
