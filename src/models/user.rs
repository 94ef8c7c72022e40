use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Access level reported for users without an active role.
pub const NO_ROLE_ACCESS_LEVEL: i32 = 999;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    pub is_active: bool,
    pub email_verified: bool,
    pub company_id: Option<Uuid>,
    pub role_id: Option<Uuid>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user joined with the names of its company and role.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct UserDetail {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub user: User,
    pub full_name: String,
    pub company_name: Option<String>,
    pub role_name: Option<String>,
    /// Level of the user's role while that role is active, otherwise [`NO_ROLE_ACCESS_LEVEL`].
    pub access_level: i32,
}

impl UserDetail {
    pub fn has_active_role(&self) -> bool {
        self.access_level != NO_ROLE_ACCESS_LEVEL
    }
}

/// Response shape for a user, optionally carrying its role's active permission names.
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    #[serde(flatten)]
    pub user: UserDetail,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
}

impl From<UserDetail> for UserView {
    fn from(user: UserDetail) -> Self {
        UserView {
            user,
            permissions: None,
        }
    }
}
