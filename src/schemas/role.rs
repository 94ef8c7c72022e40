use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use uuid::Uuid;

use crate::models::role::{MAX_ACCESS_LEVEL, MIN_ACCESS_LEVEL};
use crate::models::Role;
use crate::validation::{self, double_option, FieldErrors};

static ROLE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").unwrap());

const NAME_MESSAGE: &str =
    "Must start with a lowercase letter and contain only lowercase letters, digits and underscores.";

fn check_name(errors: &mut FieldErrors, name: &str) {
    validation::length(errors, "name", name, 2, 50);
    validation::pattern(errors, "name", name, &ROLE_NAME_RE, NAME_MESSAGE);
}

fn check_common(
    errors: &mut FieldErrors,
    display_name: Option<&str>,
    description: Option<&str>,
    access_level: Option<i32>,
) {
    if let Some(display_name) = display_name {
        validation::length(errors, "display_name", display_name, 2, 100);
    }
    if let Some(description) = description {
        validation::max_length(errors, "description", description, 500);
    }
    if let Some(level) = access_level {
        validation::range(errors, "access_level", level, MIN_ACCESS_LEVEL, MAX_ACCESS_LEVEL);
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRole {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub access_level: Option<i32>,
    pub is_active: Option<bool>,
    pub is_default: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NewRole {
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub access_level: i32,
    pub is_active: bool,
    pub is_default: bool,
}

impl CreateRole {
    pub fn validate(self) -> Result<NewRole, FieldErrors> {
        let mut errors = FieldErrors::new();
        let name = validation::required(&mut errors, "name", self.name);
        let display_name = validation::required(&mut errors, "display_name", self.display_name);
        let access_level = validation::required(&mut errors, "access_level", self.access_level);

        if let Some(name) = &name {
            check_name(&mut errors, name);
        }
        check_common(
            &mut errors,
            display_name.as_deref(),
            self.description.as_deref(),
            access_level,
        );

        match (name, display_name, access_level) {
            (Some(name), Some(display_name), Some(access_level)) if errors.is_empty() => {
                Ok(NewRole {
                    name,
                    display_name,
                    description: self.description,
                    access_level,
                    is_active: self.is_active.unwrap_or(true),
                    is_default: self.is_default.unwrap_or(false),
                })
            }
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateRole {
    pub name: Option<String>,
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub access_level: Option<i32>,
    pub is_active: Option<bool>,
    pub is_default: Option<bool>,
}

impl UpdateRole {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if let Some(name) = &self.name {
            check_name(&mut errors, name);
        }
        check_common(
            &mut errors,
            self.display_name.as_deref(),
            self.description.as_ref().and_then(|d| d.as_deref()),
            self.access_level,
        );
        errors.into_result(())
    }

    /// Fields this update would change on a system role that must stay fixed.
    pub fn protected_changes(&self, role: &Role) -> Vec<&'static str> {
        if !role.is_system {
            return Vec::new();
        }
        let mut fields = Vec::new();
        if self.name.as_ref().is_some_and(|n| *n != role.name) {
            fields.push("name");
        }
        if self.access_level.is_some_and(|l| l != role.access_level) {
            fields.push("access_level");
        }
        fields
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssignPermissions {
    pub permission_ids: Option<Vec<Uuid>>,
}

impl AssignPermissions {
    /// The distinct ids in request order.
    pub fn validate(self) -> Result<Vec<Uuid>, FieldErrors> {
        let mut errors = FieldErrors::new();
        let ids = validation::required(&mut errors, "permission_ids", self.permission_ids);
        match ids {
            Some(ids) if ids.is_empty() => {
                Err(FieldErrors::single("permission_ids", "Shorter than minimum length 1."))
            }
            Some(mut ids) => {
                let mut seen = std::collections::HashSet::new();
                ids.retain(|id| seen.insert(*id));
                Ok(ids)
            }
            None => Err(errors),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RoleListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub search: Option<String>,
    pub access_level: Option<i32>,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub include_stats: bool,
    #[serde(default)]
    pub include_permissions: bool,
}
