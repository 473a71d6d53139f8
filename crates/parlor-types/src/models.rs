use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The small user summary carried by a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub login_id: String,
    pub nickname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: Uuid,
    pub login_id: String,
    pub nickname: String,
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub group_id: Uuid,
    pub sender_id: Uuid,
    /// Nickname when set, login id otherwise.
    pub sender: String,
    pub text: Option<String>,
    pub image_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Display name for a user: nickname when non-blank, login id otherwise.
pub fn display_name<'a>(nickname: &'a str, login_id: &'a str) -> &'a str {
    if nickname.trim().is_empty() { login_id } else { nickname }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_prefers_nickname() {
        assert_eq!(display_name("Bee", "b"), "Bee");
        assert_eq!(display_name("", "b"), "b");
        assert_eq!(display_name("  ", "b"), "b");
    }
}
