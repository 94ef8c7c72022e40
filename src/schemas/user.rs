use serde::Deserialize;
use uuid::Uuid;

use crate::validation::{self, double_option, FieldErrors};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

fn check_email(errors: &mut FieldErrors, email: &str) {
    validation::max_length(errors, "email", email, 120);
    validation::email(errors, "email", email);
}

fn check_username(errors: &mut FieldErrors, username: &str) {
    validation::length(errors, "username", username, 3, 80);
}

fn check_password(errors: &mut FieldErrors, field: &str, password: &str) {
    validation::length(errors, field, password, MIN_PASSWORD_LEN, MAX_PASSWORD_LEN);
}

fn check_profile(
    errors: &mut FieldErrors,
    first_name: Option<&str>,
    last_name: Option<&str>,
    avatar_url: Option<&str>,
) {
    if let Some(first_name) = first_name {
        validation::max_length(errors, "first_name", first_name, 50);
    }
    if let Some(last_name) = last_name {
        validation::max_length(errors, "last_name", last_name, 50);
    }
    if let Some(avatar_url) = avatar_url {
        validation::max_length(errors, "avatar_url", avatar_url, 255);
        validation::url(errors, "avatar_url", avatar_url);
    }
}

fn nested(value: &Option<Option<String>>) -> Option<&str> {
    value.as_ref().and_then(|v| v.as_deref())
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl LoginRequest {
    pub fn validate(self) -> Result<(String, String), FieldErrors> {
        let mut errors = FieldErrors::new();
        let email = validation::required(&mut errors, "email", self.email);
        let password = validation::required(&mut errors, "password", self.password);
        match (email, password) {
            (Some(email), Some(password)) => Ok((email.trim().to_lowercase(), password)),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateUser {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    pub company_id: Option<Uuid>,
    pub role_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub email_verified: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    pub company_id: Option<Uuid>,
    pub role_id: Option<Uuid>,
    pub is_active: bool,
    pub email_verified: bool,
}

impl CreateUser {
    pub fn validate(self) -> Result<NewUser, FieldErrors> {
        let mut errors = FieldErrors::new();
        let email = validation::required(&mut errors, "email", self.email);
        let username = validation::required(&mut errors, "username", self.username);
        let password = validation::required(&mut errors, "password", self.password);

        if let Some(email) = &email {
            check_email(&mut errors, email);
        }
        if let Some(username) = &username {
            check_username(&mut errors, username);
        }
        if let Some(password) = &password {
            check_password(&mut errors, "password", password);
        }
        check_profile(
            &mut errors,
            self.first_name.as_deref(),
            self.last_name.as_deref(),
            self.avatar_url.as_deref(),
        );

        match (email, username, password) {
            (Some(email), Some(username), Some(password)) if errors.is_empty() => Ok(NewUser {
                email: email.to_lowercase(),
                username,
                password,
                first_name: self.first_name,
                last_name: self.last_name,
                avatar_url: self.avatar_url,
                company_id: self.company_id,
                role_id: self.role_id,
                is_active: self.is_active.unwrap_or(true),
                email_verified: self.email_verified.unwrap_or(false),
            }),
            _ => Err(errors),
        }
    }
}

/// Administrative update of another user.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub username: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub first_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub last_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub avatar_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub company_id: Option<Option<Uuid>>,
    #[serde(default, deserialize_with = "double_option")]
    pub role_id: Option<Option<Uuid>>,
    pub is_active: Option<bool>,
    pub email_verified: Option<bool>,
}

impl UpdateUser {
    pub fn validate(&mut self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        if let Some(email) = &mut self.email {
            check_email(&mut errors, email);
            *email = email.to_lowercase();
        }
        if let Some(username) = &self.username {
            check_username(&mut errors, username);
        }
        check_profile(
            &mut errors,
            nested(&self.first_name),
            nested(&self.last_name),
            nested(&self.avatar_url),
        );
        errors.into_result(())
    }

    pub fn changed_fields(&self) -> Vec<&'static str> {
        [
            ("email", self.email.is_some()),
            ("username", self.username.is_some()),
            ("first_name", self.first_name.is_some()),
            ("last_name", self.last_name.is_some()),
            ("avatar_url", self.avatar_url.is_some()),
            ("company_id", self.company_id.is_some()),
            ("role_id", self.role_id.is_some()),
            ("is_active", self.is_active.is_some()),
            ("email_verified", self.email_verified.is_some()),
        ]
        .into_iter()
        .filter_map(|(field, set)| set.then_some(field))
        .collect()
    }
}

/// Self-service profile update. Anything beyond these fields is rejected.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfile {
    #[serde(default, deserialize_with = "double_option")]
    pub first_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub last_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub avatar_url: Option<Option<String>>,
}

impl UpdateProfile {
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::new();
        check_profile(
            &mut errors,
            nested(&self.first_name),
            nested(&self.last_name),
            nested(&self.avatar_url),
        );
        errors.into_result(())
    }

    pub fn into_update(self) -> UpdateUser {
        UpdateUser {
            first_name: self.first_name,
            last_name: self.last_name,
            avatar_url: self.avatar_url,
            ..UpdateUser::default()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangePassword {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

impl ChangePassword {
    pub fn validate(self) -> Result<(String, String), FieldErrors> {
        let mut errors = FieldErrors::new();
        let current = validation::required(&mut errors, "current_password", self.current_password);
        let new = validation::required(&mut errors, "new_password", self.new_password);
        if let Some(new) = &new {
            check_password(&mut errors, "new_password", new);
        }
        match (current, new) {
            (Some(current), Some(new)) if errors.is_empty() => Ok((current, new)),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetPassword {
    pub new_password: Option<String>,
}

impl ResetPassword {
    pub fn validate(self) -> Result<String, FieldErrors> {
        let mut errors = FieldErrors::new();
        let new = validation::required(&mut errors, "new_password", self.new_password);
        if let Some(new) = &new {
            check_password(&mut errors, "new_password", new);
        }
        match new {
            Some(new) if errors.is_empty() => Ok(new),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssignCompanyRole {
    pub company_id: Option<Uuid>,
    pub role_id: Option<Uuid>,
}

impl AssignCompanyRole {
    /// `(company_id, role_id)`; a missing role means the default role.
    pub fn validate(self) -> Result<(Uuid, Option<Uuid>), FieldErrors> {
        let mut errors = FieldErrors::new();
        match validation::required(&mut errors, "company_id", self.company_id) {
            Some(company_id) => Ok((company_id, self.role_id)),
            None => Err(errors),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub search: Option<String>,
    pub company_id: Option<Uuid>,
    pub role_id: Option<Uuid>,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub include_stats: bool,
}
