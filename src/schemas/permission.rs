use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use uuid::Uuid;

use crate::models::permission::CATEGORIES;
use crate::models::Permission;
use crate::validation::{self, double_option, FieldErrors};

static PERMISSION_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_.]*$").unwrap());

pub const MAX_BULK_CREATE: usize = 50;
pub const MAX_BULK_UPDATE: usize = 100;

const NAME_MESSAGE: &str = "Must start with a lowercase letter and contain only lowercase letters, digits, underscores and dots.";

fn check_fields(
    errors: &mut FieldErrors,
    name: Option<&str>,
    display_name: Option<&str>,
    description: Option<&str>,
    category: Option<&str>,
) {
    if let Some(name) = name {
        validation::length(errors, "name", name, 3, 100);
        validation::pattern(errors, "name", name, &PERMISSION_NAME_RE, NAME_MESSAGE);
    }
    if let Some(display_name) = display_name {
        validation::length(errors, "display_name", display_name, 3, 150);
    }
    if let Some(description) = description {
        validation::max_length(errors, "description", description, 500);
    }
    if let Some(category) = category {
        validation::one_of(errors, "category", category, &CATEGORIES);
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePermission {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub role_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NewPermission {
    pub role_id: Uuid,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub category: String,
    pub is_active: bool,
}

impl CreatePermission {
    pub fn validate(self) -> Result<NewPermission, FieldErrors> {
        let mut errors = FieldErrors::new();
        let name = validation::required(&mut errors, "name", self.name);
        let display_name = validation::required(&mut errors, "display_name", self.display_name);
        let category = validation::required(&mut errors, "category", self.category);
        let role_id = validation::required(&mut errors, "role_id", self.role_id);

        check_fields(
            &mut errors,
            name.as_deref(),
            display_name.as_deref(),
            self.description.as_deref(),
            category.as_deref(),
        );

        match (name, display_name, category, role_id) {
            (Some(name), Some(display_name), Some(category), Some(role_id))
                if errors.is_empty() =>
            {
                Ok(NewPermission {
                    role_id,
                    name,
                    display_name,
                    description: self.description,
                    category,
                    is_active: self.is_active.unwrap_or(true),
                })
            }
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePermission {
    pub name: Option<String>,
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub category: Option<String>,
    pub is_active: Option<bool>,
}

impl UpdatePermission {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        check_fields(
            &mut errors,
            self.name.as_deref(),
            self.display_name.as_deref(),
            self.description.as_ref().and_then(|d| d.as_deref()),
            self.category.as_deref(),
        );
        errors.into_result(())
    }

    /// Fields this update would change on a system permission that must stay fixed.
    pub fn protected_changes(&self, permission: &Permission) -> Vec<&'static str> {
        if !permission.is_system() {
            return Vec::new();
        }
        let mut fields = Vec::new();
        if self.name.as_ref().is_some_and(|n| *n != permission.name) {
            fields.push("name");
        }
        if self.category.as_ref().is_some_and(|c| *c != permission.category) {
            fields.push("category");
        }
        fields
    }
}

/// Items stay raw JSON so that one malformed item fails alone.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BulkCreatePermissions {
    pub permissions: Option<Vec<serde_json::Value>>,
}

impl BulkCreatePermissions {
    pub fn validate(self) -> Result<Vec<serde_json::Value>, FieldErrors> {
        let mut errors = FieldErrors::new();
        let Some(items) = validation::required(&mut errors, "permissions", self.permissions) else {
            return Err(errors);
        };
        if items.is_empty() || items.len() > MAX_BULK_CREATE {
            errors.add(
                "permissions",
                format!("Length must be between 1 and {MAX_BULK_CREATE}."),
            );
        }
        errors.into_result(items)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BulkUpdatePermissions {
    pub permission_ids: Option<Vec<Uuid>>,
    pub updates: Option<UpdatePermission>,
}

impl BulkUpdatePermissions {
    pub fn validate(self) -> Result<(Vec<Uuid>, UpdatePermission), FieldErrors> {
        let mut errors = FieldErrors::new();
        let ids = validation::required(&mut errors, "permission_ids", self.permission_ids);
        let updates = validation::required(&mut errors, "updates", self.updates);

        if let Some(ids) = &ids {
            if ids.is_empty() || ids.len() > MAX_BULK_UPDATE {
                errors.add(
                    "permission_ids",
                    format!("Length must be between 1 and {MAX_BULK_UPDATE}."),
                );
            }
        }
        if let Some(updates) = &updates {
            if let Err(nested) = updates.validate() {
                errors.add("updates", nested.to_string());
            }
        }

        match (ids, updates) {
            (Some(mut ids), Some(updates)) if errors.is_empty() => {
                let mut seen = std::collections::HashSet::new();
                ids.retain(|id| seen.insert(*id));
                Ok((ids, updates))
            }
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PermissionListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub search: Option<String>,
    pub category: Option<String>,
    pub role_id: Option<Uuid>,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub include_role_info: bool,
}

impl PermissionListQuery {
    pub fn validate_category(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if let Some(category) = &self.category {
            validation::one_of(&mut errors, "category", category, &CATEGORIES);
        }
        errors.into_result(())
    }
}
