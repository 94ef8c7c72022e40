//! Role policy: decides whether a caller may perform an action on a target.
//!
//! The caller's tier comes from the numeric access level of its active role
//! and nothing else. Level 1 is the Rohirrim tier, level 2 the Lord tier, and
//! any other level (or no active role) the Dunedain tier. Role names are
//! never consulted here.

use serde::Serialize;
use uuid::Uuid;

use crate::auth::extractor::AuthUser;
use crate::error::AppError;

pub const ROHIRRIM_LEVEL: i32 = 1;
pub const LORD_LEVEL: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Unrestricted administration.
    Rohirrim,
    /// Administration of the users of one company.
    Lord,
    /// Own profile only.
    Dunedain,
}

impl Tier {
    pub fn from_access_level(level: Option<i32>) -> Tier {
        match level {
            Some(l) if l <= ROHIRRIM_LEVEL => Tier::Rohirrim,
            Some(LORD_LEVEL) => Tier::Lord,
            _ => Tier::Dunedain,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
    Activate,
    ResetPassword,
    AssignCompanyRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// An existing user record, with the access level of its active role.
    User {
        id: Uuid,
        company_id: Option<Uuid>,
        access_level: i32,
    },
    /// The user collection of a company (None: users without a company).
    Users { company_id: Option<Uuid> },
    Company(Uuid),
    Companies,
    Roles,
    Permissions,
    AuditLog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(&'static str),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn into_result(self) -> Result<(), AppError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(AppError::Forbidden(reason.to_string())),
        }
    }
}

pub fn decide(caller: &AuthUser, action: Action, target: Target) -> Decision {
    if let (Action::Delete, Target::User { id, .. }) = (action, target) {
        if id == caller.user_id {
            return Decision::Deny("You cannot delete your own account");
        }
    }

    match caller.tier {
        Tier::Rohirrim => Decision::Allow,
        Tier::Lord => decide_lord(caller, action, target),
        Tier::Dunedain => decide_dunedain(caller, action, target),
    }
}

fn decide_lord(caller: &AuthUser, action: Action, target: Target) -> Decision {
    match target {
        Target::User { id, .. } if id == caller.user_id => {
            if matches!(action, Action::Read | Action::Update) {
                Decision::Allow
            } else {
                Decision::Deny("Access denied")
            }
        }
        Target::User {
            company_id,
            access_level,
            ..
        } => {
            if !in_own_company(caller, company_id) {
                return Decision::Deny("Access denied to users of other companies");
            }
            if action != Action::Read && access_level < caller.access_level {
                return Decision::Deny("Cannot manage a user with higher privileges than your own");
            }
            match action {
                Action::Read
                | Action::Update
                | Action::Delete
                | Action::Activate
                | Action::ResetPassword => Decision::Allow,
                Action::Create | Action::AssignCompanyRole => {
                    Decision::Deny("Only Rohirrim can assign companies")
                }
            }
        }
        Target::Users { company_id } => {
            if action == Action::Create && in_own_company(caller, company_id) {
                Decision::Allow
            } else {
                Decision::Deny("Users can only be created in your own company")
            }
        }
        Target::Company(id) => {
            if action == Action::Read && caller.company_id == Some(id) {
                Decision::Allow
            } else {
                Decision::Deny("Access denied to this company")
            }
        }
        Target::Companies => {
            if action == Action::Read {
                Decision::Allow
            } else {
                Decision::Deny("Only Rohirrim can manage companies")
            }
        }
        Target::Roles | Target::Permissions | Target::AuditLog => {
            Decision::Deny("Only Rohirrim can access this resource")
        }
    }
}

fn decide_dunedain(caller: &AuthUser, action: Action, target: Target) -> Decision {
    match target {
        Target::User { id, .. }
            if id == caller.user_id && matches!(action, Action::Read | Action::Update) =>
        {
            Decision::Allow
        }
        Target::Roles | Target::Permissions | Target::AuditLog => {
            Decision::Deny("Only Rohirrim can access this resource")
        }
        _ => Decision::Deny("Access denied"),
    }
}

fn in_own_company(caller: &AuthUser, company_id: Option<Uuid>) -> bool {
    caller.company_id.is_some() && caller.company_id == company_id
}

/// Which update schema applies when `caller` edits user `target_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateScope {
    /// Administrative fields (email, role, company, status).
    Admin,
    /// Profile fields only.
    Profile,
}

pub fn update_scope(caller: &AuthUser, target_id: Uuid) -> UpdateScope {
    match caller.tier {
        Tier::Rohirrim => UpdateScope::Admin,
        Tier::Lord if target_id != caller.user_id => UpdateScope::Admin,
        _ => UpdateScope::Profile,
    }
}

/// A caller may hand out roles at its own privilege or below, never above.
pub fn may_assign_role(caller: &AuthUser, role_access_level: i32) -> bool {
    caller.tier == Tier::Rohirrim || role_access_level >= caller.access_level
}

/// Whether `caller` may place a user into `company_id`.
pub fn may_place_in_company(caller: &AuthUser, company_id: Option<Uuid>) -> bool {
    caller.tier == Tier::Rohirrim || in_own_company(caller, company_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserScope {
    All,
    Company(Uuid),
    OnlySelf(Uuid),
}

pub fn user_scope(caller: &AuthUser) -> UserScope {
    match (caller.tier, caller.company_id) {
        (Tier::Rohirrim, _) => UserScope::All,
        (Tier::Lord, Some(company_id)) => UserScope::Company(company_id),
        _ => UserScope::OnlySelf(caller.user_id),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanyScope {
    All,
    Own(Uuid),
    /// A Lord without a company sees an empty list.
    Nothing,
}

pub fn company_scope(caller: &AuthUser) -> Result<CompanyScope, AppError> {
    decide(caller, Action::Read, Target::Companies).into_result()?;
    Ok(match (caller.tier, caller.company_id) {
        (Tier::Rohirrim, _) => CompanyScope::All,
        (_, Some(company_id)) => CompanyScope::Own(company_id),
        (_, None) => CompanyScope::Nothing,
    })
}
