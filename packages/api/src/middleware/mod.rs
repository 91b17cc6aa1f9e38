pub mod auth;

pub use auth::{AuthContext, AuthGate, RoleGuard, RoleSet, require_roles};
