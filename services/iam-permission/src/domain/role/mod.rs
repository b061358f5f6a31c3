//! 角色与权限

#![allow(clippy::module_inception)]

pub mod permission;
pub mod role;

pub use permission::{Effect, Permission, PermissionId};
pub use role::{Role, RoleId, RoleType};
