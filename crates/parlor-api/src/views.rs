use axum::response::{Html, IntoResponse, Response};
use chrono::{DateTime, Utc};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use parlor_db::models::{GroupRow, MemberRow, MessageRow};
use parlor_types::models::{ChatMessage, Group, Member, SessionUser, display_name};

use crate::error::AppError;

/// Every page template, embedded into the binary.
const TEMPLATES: &[(&str, &str)] = &[
    ("layout.html", include_str!("../templates/layout.html")),
    ("register.html", include_str!("../templates/register.html")),
    ("login.html", include_str!("../templates/login.html")),
    ("dashboard.html", include_str!("../templates/dashboard.html")),
    ("groups.html", include_str!("../templates/groups.html")),
    ("my_groups.html", include_str!("../templates/my_groups.html")),
    ("group_create.html", include_str!("../templates/group_create.html")),
    ("group_detail.html", include_str!("../templates/group_detail.html")),
];

/// Template environment. `.html` templates are auto-escaped.
pub struct Views {
    env: Environment<'static>,
}

impl Views {
    pub fn new() -> Result<Self, AppError> {
        let mut env = Environment::new();
        for &(name, source) in TEMPLATES {
            env.add_template(name, source)?;
        }
        env.add_filter("datetime", format_datetime);
        Ok(Self { env })
    }

    pub fn render<S: Serialize>(&self, name: &str, ctx: S) -> Result<Html<String>, AppError> {
        let html = self.env.get_template(name)?.render(ctx)?;
        Ok(Html(html))
    }

    /// Render a form page with an optional error banner. Rendering failures
    /// fall back to the bare server error page.
    pub fn form(&self, name: &str, current_user: Option<&SessionUser>, error: Option<&str>) -> Response {
        match self.render(name, context! { current_user => current_user, error => error }) {
            Ok(html) => html.into_response(),
            Err(e) => e.into_response(),
        }
    }
}

fn format_datetime(value: String) -> String {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc).format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or(value)
}

// -- Row to view-model conversions --

fn parse_id(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}

/// Parse a stored timestamp; anything unreadable becomes the epoch.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

pub fn group(row: GroupRow) -> Group {
    Group {
        id: parse_id(&row.id, "group id"),
        owner_id: parse_id(&row.owner_id, "owner_id"),
        created_at: parse_timestamp(&row.created_at),
        title: row.title,
        description: row.description.filter(|d| !d.is_empty()),
    }
}

pub fn groups(rows: Vec<GroupRow>) -> Vec<Group> {
    rows.into_iter().map(group).collect()
}

pub fn members(rows: Vec<MemberRow>) -> Vec<Member> {
    rows.into_iter()
        .map(|row| Member {
            id: parse_id(&row.user_id, "member id"),
            login_id: row.login_id,
            nickname: row.nickname,
            profile_image: row.profile_image,
        })
        .collect()
}

pub fn messages(rows: Vec<MessageRow>) -> Vec<ChatMessage> {
    rows.into_iter()
        .map(|row| ChatMessage {
            id: parse_id(&row.id, "message id"),
            group_id: parse_id(&row.group_id, "group_id"),
            sender_id: parse_id(&row.sender_id, "sender_id"),
            sender: display_name(&row.sender_nickname, &row.sender_login_id).to_string(),
            created_at: parse_timestamp(&row.created_at),
            text: row.text.filter(|t| !t.is_empty()),
            image_path: row.image_path,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_templates_compile() {
        let views = Views::new().unwrap();
        let html = views
            .render("login.html", context! { current_user => None::<SessionUser>, error => "Invalid login id or password" })
            .unwrap();
        assert!(html.0.contains("Invalid login id or password"));
    }

    #[test]
    fn test_templates_escape_user_text() {
        let views = Views::new().unwrap();
        let html = views
            .render("login.html", context! { current_user => None::<SessionUser>, error => "<script>" })
            .unwrap();
        assert!(html.0.contains("&lt;script&gt;"));
        assert!(!html.0.contains("<script>"));
    }

    #[test]
    fn test_datetime_filter() {
        assert_eq!(format_datetime("2024-03-01T09:05:00.000000Z".into()), "2024-03-01 09:05 UTC");
        assert_eq!(format_datetime("garbage".into()), "garbage");
    }

    #[test]
    fn test_message_sender_falls_back_to_login_id() {
        let rows = vec![MessageRow {
            id: Uuid::new_v4().to_string(),
            group_id: Uuid::new_v4().to_string(),
            sender_id: Uuid::new_v4().to_string(),
            sender_login_id: "bee".into(),
            sender_nickname: String::new(),
            text: Some(String::new()),
            image_path: Some("/uploads/messages/x.png".into()),
            created_at: "2024-03-01T09:05:00.000000Z".into(),
        }];
        let msgs = messages(rows);
        assert_eq!(msgs[0].sender, "bee");
        assert_eq!(msgs[0].text, None);
    }
}
