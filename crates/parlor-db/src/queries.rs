use crate::Database;
use crate::models::{GroupRow, MemberRow, MessageRow, SessionRow, UserRow};
use anyhow::Result;
use rusqlite::{Connection, ErrorCode, Row};

const USER_COLUMNS: &str = "id, login_id, nickname, email, profile_image, password_hash, created_at";
const GROUP_COLUMNS: &str = "id, title, description, owner_id, created_at";

impl Database {
    // -- Users --

    /// Insert a user. Returns `false` when the login id or email is already taken.
    pub fn create_user(&self, user: &UserRow) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, login_id, nickname, email, profile_image, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    user.id,
                    user.login_id,
                    user.nickname,
                    user.email,
                    user.profile_image,
                    user.password_hash,
                    user.created_at,
                ],
            );
            match inserted {
                Ok(_) => Ok(true),
                Err(e) if is_unique_violation(&e) => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Any user holding either the login id or the email.
    pub fn find_user_by_login_or_email(&self, login_id: &str, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE login_id = ?1 OR email = ?2 LIMIT 1"),
                [login_id, email],
                user_from_row,
            )
            .optional()
        })
    }

    pub fn get_user_by_login_id(&self, login_id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE login_id = ?1"),
                [login_id],
                user_from_row,
            )
            .optional()
        })
    }

    // -- Groups --

    /// Insert a group and make its owner the first member, atomically.
    pub fn create_group(&self, group: &GroupRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO chat_groups (id, title, description, owner_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    group.id,
                    group.title,
                    group.description,
                    group.owner_id,
                    group.created_at,
                ],
            )?;
            tx.execute(
                "INSERT INTO group_members (group_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![group.id, group.owner_id, group.created_at],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_group(&self, id: &str) -> Result<Option<GroupRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {GROUP_COLUMNS} FROM chat_groups WHERE id = ?1"),
                [id],
                group_from_row,
            )
            .optional()
        })
    }

    /// Every group, newest first.
    pub fn list_groups(&self) -> Result<Vec<GroupRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {GROUP_COLUMNS} FROM chat_groups ORDER BY created_at DESC, rowid DESC"
            ))?;
            let rows = stmt
                .query_map([], group_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Groups the user belongs to, newest first.
    pub fn list_groups_for_member(&self, user_id: &str) -> Result<Vec<GroupRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT g.id, g.title, g.description, g.owner_id, g.created_at
                 FROM chat_groups g
                 JOIN group_members m ON m.group_id = g.id
                 WHERE m.user_id = ?1
                 ORDER BY g.created_at DESC, g.rowid DESC",
            )?;
            let rows = stmt
                .query_map([user_id], group_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Membership --

    pub fn is_member(&self, group_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| query_is_member(conn, group_id, user_id))
    }

    /// Add a member. Idempotent: returns `false` when the user was already a member.
    pub fn add_member(&self, group_id: &str, user_id: &str, joined_at: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO group_members (group_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
                [group_id, user_id, joined_at],
            )?;
            Ok(changed > 0)
        })
    }

    /// Remove a member. Returns `false` when the user was not a member.
    pub fn remove_member(&self, group_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                [group_id, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Members in the order they joined.
    pub fn list_members(&self, group_id: &str) -> Result<Vec<MemberRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.login_id, u.nickname, u.profile_image, m.joined_at
                 FROM group_members m
                 JOIN users u ON u.id = m.user_id
                 WHERE m.group_id = ?1
                 ORDER BY m.joined_at ASC, m.rowid ASC",
            )?;
            let rows = stmt
                .query_map([group_id], |row| {
                    Ok(MemberRow {
                        user_id: row.get(0)?,
                        login_id: row.get(1)?,
                        nickname: row.get(2)?,
                        profile_image: row.get(3)?,
                        joined_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: &str,
        group_id: &str,
        sender_id: &str,
        text: Option<&str>,
        image_path: Option<&str>,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, group_id, sender_id, text, image_path, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, group_id, sender_id, text, image_path, created_at],
            )?;
            Ok(())
        })
    }

    /// The full history of a group, oldest first.
    pub fn get_messages(&self, group_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_messages(conn, group_id))
    }

    // -- Sessions --

    pub fn create_session(&self, session: &SessionRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (token, user_id, login_id, nickname, remember, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    session.token,
                    session.user_id,
                    session.login_id,
                    session.nickname,
                    session.remember,
                    session.created_at,
                    session.expires_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Look up a session that has not expired as of `now`.
    pub fn get_session(&self, token: &str, now: &str) -> Result<Option<SessionRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT token, user_id, login_id, nickname, remember, created_at, expires_at
                 FROM sessions WHERE token = ?1 AND expires_at > ?2",
                [token, now],
                |row| {
                    Ok(SessionRow {
                        token: row.get(0)?,
                        user_id: row.get(1)?,
                        login_id: row.get(2)?,
                        nickname: row.get(3)?,
                        remember: row.get(4)?,
                        created_at: row.get(5)?,
                        expires_at: row.get(6)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn delete_session(&self, token: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM sessions WHERE token = ?1", [token])?;
            Ok(())
        })
    }

    /// Drop every session that expired at or before `now`. Returns how many were removed.
    pub fn delete_expired_sessions(&self, now: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", [now])?;
            Ok(removed)
        })
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        login_id: row.get(1)?,
        nickname: row.get(2)?,
        email: row.get(3)?,
        profile_image: row.get(4)?,
        password_hash: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<GroupRow> {
    Ok(GroupRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        owner_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn query_is_member(conn: &Connection, group_id: &str, user_id: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM group_members WHERE group_id = ?1 AND user_id = ?2",
            [group_id, user_id],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn query_messages(conn: &Connection, group_id: &str) -> Result<Vec<MessageRow>> {
    // JOIN users to fetch the sender's names in a single query (eliminates N+1)
    let mut stmt = conn.prepare(
        "SELECT m.id, m.group_id, m.sender_id, u.login_id, u.nickname, m.text, m.image_path, m.created_at
         FROM messages m
         LEFT JOIN users u ON m.sender_id = u.id
         WHERE m.group_id = ?1
         ORDER BY m.created_at ASC, m.rowid ASC",
    )?;

    let rows = stmt
        .query_map([group_id], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                group_id: row.get(1)?,
                sender_id: row.get(2)?,
                sender_login_id: row.get::<_, Option<String>>(3)?.unwrap_or_else(|| "unknown".to_string()),
                sender_nickname: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                text: row.get(5)?,
                image_path: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::now_timestamp;

    fn user(login_id: &str, email: &str) -> UserRow {
        UserRow {
            id: uuid::Uuid::new_v4().to_string(),
            login_id: login_id.to_string(),
            nickname: format!("{login_id}-nick"),
            email: email.to_string(),
            profile_image: None,
            password_hash: "hash".to_string(),
            created_at: now_timestamp(),
        }
    }

    fn group(owner: &UserRow, title: &str, created_at: &str) -> GroupRow {
        GroupRow {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            description: None,
            owner_id: owner.id.clone(),
            created_at: created_at.to_string(),
        }
    }

    #[test]
    fn test_unique_login_and_email() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.create_user(&user("alice", "a@example.com")).unwrap());
        assert!(!db.create_user(&user("alice", "other@example.com")).unwrap());
        assert!(!db.create_user(&user("bob", "a@example.com")).unwrap());

        assert!(db.find_user_by_login_or_email("alice", "x@example.com").unwrap().is_some());
        assert!(db.find_user_by_login_or_email("x", "a@example.com").unwrap().is_some());
        assert!(db.find_user_by_login_or_email("x", "y@example.com").unwrap().is_none());
    }

    #[test]
    fn test_create_group_adds_owner_as_member() {
        let db = Database::open_in_memory().unwrap();
        let alice = user("alice", "a@example.com");
        db.create_user(&alice).unwrap();
        let g = group(&alice, "Book Club", &now_timestamp());
        db.create_group(&g).unwrap();

        let members = db.list_members(&g.id).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].user_id, alice.id);
        assert!(db.is_member(&g.id, &alice.id).unwrap());
    }

    #[test]
    fn test_join_is_idempotent_and_leave_is_noop() {
        let db = Database::open_in_memory().unwrap();
        let alice = user("alice", "a@example.com");
        let bob = user("bob", "b@example.com");
        db.create_user(&alice).unwrap();
        db.create_user(&bob).unwrap();
        let g = group(&alice, "Book Club", &now_timestamp());
        db.create_group(&g).unwrap();

        assert!(db.add_member(&g.id, &bob.id, &now_timestamp()).unwrap());
        assert!(!db.add_member(&g.id, &bob.id, &now_timestamp()).unwrap());
        assert_eq!(db.list_members(&g.id).unwrap().len(), 2);

        assert!(db.remove_member(&g.id, &bob.id).unwrap());
        assert!(!db.remove_member(&g.id, &bob.id).unwrap());
        assert_eq!(db.list_members(&g.id).unwrap().len(), 1);
    }

    #[test]
    fn test_group_lists_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let alice = user("alice", "a@example.com");
        let bob = user("bob", "b@example.com");
        db.create_user(&alice).unwrap();
        db.create_user(&bob).unwrap();
        let old = group(&alice, "old", "2024-01-01T00:00:00.000000Z");
        let new = group(&bob, "new", "2024-06-01T00:00:00.000000Z");
        db.create_group(&old).unwrap();
        db.create_group(&new).unwrap();

        let titles: Vec<_> = db.list_groups().unwrap().into_iter().map(|g| g.title).collect();
        assert_eq!(titles, vec!["new", "old"]);

        let mine: Vec<_> = db
            .list_groups_for_member(&alice.id)
            .unwrap()
            .into_iter()
            .map(|g| g.title)
            .collect();
        assert_eq!(mine, vec!["old"]);
    }

    #[test]
    fn test_messages_oldest_first_with_sender_names() {
        let db = Database::open_in_memory().unwrap();
        let alice = user("alice", "a@example.com");
        db.create_user(&alice).unwrap();
        let g = group(&alice, "Book Club", &now_timestamp());
        db.create_group(&g).unwrap();

        db.insert_message("m2", &g.id, &alice.id, Some("second"), None, "2024-01-01T00:00:02.000000Z")
            .unwrap();
        db.insert_message("m1", &g.id, &alice.id, None, Some("/uploads/messages/a.png"), "2024-01-01T00:00:01.000000Z")
            .unwrap();

        let rows = db.get_messages(&g.id).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "m1");
        assert_eq!(rows[0].text, None);
        assert_eq!(rows[1].text.as_deref(), Some("second"));
        assert_eq!(rows[1].sender_nickname, "alice-nick");
        assert_eq!(rows[1].sender_login_id, "alice");
    }

    #[test]
    fn test_message_requires_text_or_image() {
        let db = Database::open_in_memory().unwrap();
        let alice = user("alice", "a@example.com");
        db.create_user(&alice).unwrap();
        let g = group(&alice, "Book Club", &now_timestamp());
        db.create_group(&g).unwrap();

        assert!(db.insert_message("m1", &g.id, &alice.id, Some(""), None, &now_timestamp()).is_err());
        assert!(db.insert_message("m2", &g.id, &alice.id, None, None, &now_timestamp()).is_err());
    }

    #[test]
    fn test_session_expiry() {
        let db = Database::open_in_memory().unwrap();
        let alice = user("alice", "a@example.com");
        db.create_user(&alice).unwrap();
        let session = SessionRow {
            token: "tok".into(),
            user_id: alice.id.clone(),
            login_id: alice.login_id.clone(),
            nickname: alice.nickname.clone(),
            remember: true,
            created_at: "2024-01-01T00:00:00.000000Z".into(),
            expires_at: "2024-01-15T00:00:00.000000Z".into(),
        };
        db.create_session(&session).unwrap();

        let live = db.get_session("tok", "2024-01-10T00:00:00.000000Z").unwrap().unwrap();
        assert!(live.remember);
        assert_eq!(live.user_id, alice.id);
        assert!(db.get_session("tok", "2024-01-16T00:00:00.000000Z").unwrap().is_none());

        assert_eq!(db.delete_expired_sessions("2024-01-10T00:00:00.000000Z").unwrap(), 0);
        assert_eq!(db.delete_expired_sessions("2024-01-16T00:00:00.000000Z").unwrap(), 1);
        assert!(db.get_session("tok", "2024-01-10T00:00:00.000000Z").unwrap().is_none());
    }

    #[test]
    fn test_delete_session() {
        let db = Database::open_in_memory().unwrap();
        let alice = user("alice", "a@example.com");
        db.create_user(&alice).unwrap();
        let now = now_timestamp();
        db.create_session(&SessionRow {
            token: "tok".into(),
            user_id: alice.id.clone(),
            login_id: alice.login_id.clone(),
            nickname: alice.nickname.clone(),
            remember: false,
            created_at: now.clone(),
            expires_at: "9999-01-01T00:00:00.000000Z".into(),
        })
        .unwrap();
        db.delete_session("tok").unwrap();
        assert!(db.get_session("tok", &now).unwrap().is_none());
    }
}
