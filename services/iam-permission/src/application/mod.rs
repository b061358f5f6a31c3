//! 应用层：权限决策服务与管理接口

pub mod admin;
pub mod commands;
pub mod policy;
pub mod resolver;
pub mod service;

pub use commands::{
    CreatePermissionCommand, CreatePolicyCommand, CreateRoleCommand, GrantResourcePermissionCommand,
    SetInheritanceCommand, UpdatePermissionCommand, UpdatePolicyCommand, UpdateRoleCommand,
};
pub use resolver::EffectivePermissionResolver;
pub use service::DefaultPermissionService;
