use serde::{Deserialize, Serialize};

// -- Auth --

/// Text fields of the registration form. The optional profile image travels
/// in the same multipart body and is handled by the upload storage.
#[derive(Debug, Default, Clone)]
pub struct RegisterForm {
    pub login_id: String,
    pub nickname: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

impl RegisterForm {
    /// Assign a multipart text field by its form name. Unknown names are ignored.
    pub fn set_field(&mut self, name: &str, value: String) {
        match name {
            "loginId" => self.login_id = value,
            "nickname" => self.nickname = value,
            "email" => self.email = value,
            "password" => self.password = value,
            "passwordConfirm" => self.password_confirm = value,
            _ => {}
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoginForm {
    pub login_id: String,
    pub password: String,
    /// Checkbox: present (any value) when ticked.
    pub remember_me: Option<String>,
}

impl LoginForm {
    pub fn remember(&self) -> bool {
        self.remember_me.as_deref().is_some_and(|v| !v.is_empty())
    }
}

// -- Groups --

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateGroupForm {
    pub title: String,
    pub description: String,
}

// -- Refresh --

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub messages: Vec<RefreshMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshMessage {
    /// Nickname, or login id when the nickname is blank.
    pub sender: String,
    pub text: String,
    pub image_path: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}
