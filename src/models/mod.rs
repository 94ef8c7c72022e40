pub mod audit_event;
pub mod company;
pub mod permission;
pub mod refresh_token;
pub mod role;
pub mod user;

pub use audit_event::AuditEvent;
pub use company::{Company, CompanyView};
pub use permission::{Permission, PermissionDetail};
pub use refresh_token::RefreshToken;
pub use role::{Role, RoleView, RoleWithCounts};
pub use user::{User, UserDetail, UserView};
