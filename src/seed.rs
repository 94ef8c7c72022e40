//! Idempotent startup data: the default permission catalogue of the three
//! system roles, and an optional first Rohirrim account.

use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::auth::password;
use crate::config::BootstrapAdmin;
use crate::db;
use crate::models::User;
use crate::schemas::user::CreateUser;

/// `(name, display_name, description, category)`
pub type PermissionSeed = (&'static str, &'static str, &'static str, &'static str);

const ROHIRRIM_PERMISSIONS: &[PermissionSeed] = &[
    ("system.admin", "System administration", "Full system administration access", "system"),
    ("system.debug", "System debug", "Access to debug and development tooling", "system"),
    ("system.logs", "System logs", "View and manage logs", "system"),
    ("system.backup", "System backup", "Manage backups and restores", "system"),
    ("company.create", "Create companies", "Create new companies", "company"),
    ("company.read.all", "View all companies", "View the data of every company", "company"),
    ("company.update.all", "Edit all companies", "Edit the data of every company", "company"),
    ("company.delete", "Delete companies", "Delete companies", "company"),
    ("user.create", "Create users", "Create new users", "user"),
    ("user.read.all", "View all users", "View the data of every user", "user"),
    ("user.update.all", "Edit all users", "Edit the data of every user", "user"),
    ("user.delete", "Delete users", "Delete users", "user"),
    ("user.roles.manage", "Manage roles", "Assign and edit roles", "user"),
    ("property.create", "Create properties", "Create property units", "property"),
    ("property.read.all", "View all properties", "View every property", "property"),
    ("property.update.all", "Edit all properties", "Edit every property", "property"),
    ("property.delete", "Delete properties", "Delete properties", "property"),
    ("invoice.create", "Create invoices", "Create invoices", "invoice"),
    ("invoice.read.all", "View all invoices", "View every invoice", "invoice"),
    ("invoice.update.all", "Edit all invoices", "Edit every invoice", "invoice"),
    ("invoice.delete", "Delete invoices", "Delete invoices", "invoice"),
    ("booking.create", "Create bookings", "Create bookings", "booking"),
    ("booking.read.all", "View all bookings", "View every booking", "booking"),
    ("booking.update.all", "Edit all bookings", "Edit every booking", "booking"),
    ("booking.delete", "Delete bookings", "Delete bookings", "booking"),
    ("pod.create", "Create PODs", "Create PODs", "pod"),
    ("pod.read.all", "View all PODs", "View every POD", "pod"),
    ("pod.update.all", "Edit all PODs", "Edit every POD", "pod"),
    ("pod.delete", "Delete PODs", "Delete PODs", "pod"),
];

const LORD_PERMISSIONS: &[PermissionSeed] = &[
    ("company.read.own", "View own company", "View the data of the own company", "company"),
    ("company.update.own", "Edit own company", "Edit the data of the own company", "company"),
    ("user.create.company", "Create company users", "Create users in the own company", "user"),
    ("user.read.company", "View company users", "View users of the own company", "user"),
    ("user.update.company", "Edit company users", "Edit users of the own company", "user"),
    ("user.deactivate.company", "Deactivate company users", "Deactivate users of the own company", "user"),
    ("property.create", "Create properties", "Create property units", "property"),
    ("property.read.company", "View company properties", "View properties of the own company", "property"),
    ("property.update.company", "Edit company properties", "Edit properties of the own company", "property"),
    ("property.delete.company", "Delete company properties", "Delete properties of the own company", "property"),
    ("invoice.create", "Create invoices", "Create invoices", "invoice"),
    ("invoice.read.company", "View company invoices", "View invoices of the own company", "invoice"),
    ("invoice.update.company", "Edit company invoices", "Edit invoices of the own company", "invoice"),
    ("invoice.delete.company", "Delete company invoices", "Delete invoices of the own company", "invoice"),
    ("booking.create", "Create bookings", "Create bookings", "booking"),
    ("booking.read.company", "View company bookings", "View bookings of the own company", "booking"),
    ("booking.update.company", "Edit company bookings", "Edit bookings of the own company", "booking"),
    ("booking.delete.company", "Delete company bookings", "Delete bookings of the own company", "booking"),
    ("pod.create", "Create PODs", "Create PODs", "pod"),
    ("pod.read.company", "View company PODs", "View PODs of the own company", "pod"),
    ("pod.update.company", "Edit company PODs", "Edit PODs of the own company", "pod"),
    ("pod.delete.company", "Delete company PODs", "Delete PODs of the own company", "pod"),
];

const DUNEDAIN_PERMISSIONS: &[PermissionSeed] = &[
    ("company.read.own", "View own company", "View the data of the own company", "company"),
    ("user.read.company", "View company users", "View users of the own company", "user"),
    ("property.read.company", "View company properties", "View properties of the own company", "property"),
    ("invoice.read.company", "View company invoices", "View invoices of the own company", "invoice"),
    ("booking.read.company", "View company bookings", "View bookings of the own company", "booking"),
    ("pod.read.company", "View company PODs", "View PODs of the own company", "pod"),
];

pub const CATALOGUE: [(&str, &[PermissionSeed]); 3] = [
    ("rohirrim", ROHIRRIM_PERMISSIONS),
    ("lord", LORD_PERMISSIONS),
    ("dunedain", DUNEDAIN_PERMISSIONS),
];

/// Inserts any catalogue entry that is missing; existing rows are left untouched.
/// Returns the number of permissions created.
pub async fn seed_permissions(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let mut created = 0;
    for (role_name, permissions) in CATALOGUE {
        let Some(role) = db::roles::find_by_name(pool, role_name).await? else {
            tracing::warn!(role = role_name, "System role missing, skipping its permissions");
            continue;
        };

        let mut qb = QueryBuilder::<Postgres>::new(
            "INSERT INTO permissions (role_id, name, display_name, description, category) ",
        );
        qb.push_values(permissions.iter(), |mut row, (name, display_name, description, category)| {
            row.push_bind(role.id)
                .push_bind(*name)
                .push_bind(*display_name)
                .push_bind(*description)
                .push_bind(*category);
        });
        qb.push(" ON CONFLICT (role_id, name) DO NOTHING");
        created += qb.build().execute(pool).await?.rows_affected();
    }
    Ok(created)
}

/// Creates the configured Rohirrim account, but only while no user exists.
pub async fn bootstrap_admin(
    pool: &PgPool,
    admin: &BootstrapAdmin,
) -> Result<Option<User>, String> {
    let existing = db::users::count_all(pool)
        .await
        .map_err(|e| format!("Failed to count users: {e}"))?;
    if existing > 0 {
        return Ok(None);
    }

    let role = db::roles::find_by_name(pool, "rohirrim")
        .await
        .map_err(|e| format!("Failed to load rohirrim role: {e}"))?
        .ok_or("The rohirrim role is missing")?;

    let new = CreateUser {
        email: Some(admin.email.clone()),
        username: Some(admin.username.clone()),
        password: Some(admin.password.clone()),
        role_id: Some(role.id),
        email_verified: Some(true),
        ..Default::default()
    }
    .validate()
    .map_err(|errors| format!("Invalid bootstrap account: {errors}"))?;

    let hash = password::hash(&new.password)?;
    let user = db::users::create(pool, &new, &hash)
        .await
        .map_err(|e| format!("Failed to create bootstrap account: {e}"))?;
    Ok(Some(user))
}
