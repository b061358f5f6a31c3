//! iam-permission - 权限决策引擎
//!
//! 根据用户的角色权限、资源级授权、资源继承关系和策略，判定一次访问是否被允许。
//! 无法判定时一律拒绝。

pub mod application;
pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use application::DefaultPermissionService;
pub use bootstrap::{PermissionRuntime, PermissionService, bootstrap, build_service};
pub use config::PermissionServiceConfig;
pub use domain::{CheckMode, Effect, PermissionCheckRequest, PermissionCheckResponse};
pub use error::PermissionError;
