/// Database row types. These map directly to SQLite rows.
/// Distinct from parlor-types view models to keep the DB layer independent.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub login_id: String,
    pub nickname: String,
    pub email: String,
    pub profile_image: Option<String>,
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct GroupRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct MemberRow {
    pub user_id: String,
    pub login_id: String,
    pub nickname: String,
    pub profile_image: Option<String>,
    pub joined_at: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub group_id: String,
    pub sender_id: String,
    pub sender_login_id: String,
    pub sender_nickname: String,
    pub text: Option<String>,
    pub image_path: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub token: String,
    pub user_id: String,
    pub login_id: String,
    pub nickname: String,
    pub remember: bool,
    pub created_at: String,
    pub expires_at: String,
}
