use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// The closed set of permission categories.
pub const CATEGORIES: [&str; 9] = [
    "system", "company", "user", "property", "invoice", "booking", "pod", "report", "other",
];

/// Permissions in this category cannot be renamed, re-categorised or deleted.
pub const SYSTEM_CATEGORY: &str = "system";

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,
    pub role_id: Uuid,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub category: String,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    pub fn is_system(&self) -> bool {
        self.category == SYSTEM_CATEGORY
    }
}

/// A permission joined with its owning role.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct PermissionDetail {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub permission: Permission,
    pub role_name: String,
    #[serde(skip_serializing)]
    pub role_display_name: String,
    #[serde(skip_serializing)]
    pub role_access_level: i32,
    #[serde(skip_serializing)]
    pub role_is_system: bool,
}

impl PermissionDetail {
    pub fn role_info(&self) -> serde_json::Value {
        json!({
            "id": self.permission.role_id,
            "name": self.role_name,
            "display_name": self.role_display_name,
            "access_level": self.role_access_level,
            "is_system_role": self.role_is_system,
        })
    }
}
