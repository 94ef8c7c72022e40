use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Permission;

pub const MIN_ACCESS_LEVEL: i32 = 1;
pub const MAX_ACCESS_LEVEL: i32 = 10;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub access_level: i32,
    pub is_active: bool,
    pub is_default: bool,
    pub is_system: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Role with active-user and active-permission counts.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct RoleWithCounts {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub role: Role,
    pub users_count: i64,
    pub permissions_count: i64,
}

/// Response shape for a role; counts and permissions appear only when requested.
#[derive(Debug, Clone, Serialize)]
pub struct RoleView {
    #[serde(flatten)]
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<Permission>>,
}

impl RoleView {
    pub fn new(role: RoleWithCounts, include_stats: bool) -> Self {
        RoleView {
            users_count: include_stats.then_some(role.users_count),
            permissions_count: include_stats.then_some(role.permissions_count),
            role: role.role,
            permissions: None,
        }
    }

    pub fn with_permissions(mut self, permissions: Vec<Permission>) -> Self {
        self.permissions = Some(permissions);
        self
    }
}
