//! 权限决策领域层

pub mod audit;
pub mod cache;
pub mod check;
pub mod matcher;
pub mod policy;
pub mod repository;
pub mod resource;
pub mod role;

use std::collections::HashMap;

/// 属性表：权限条件与请求上下文共用
pub type Attributes = HashMap<String, serde_json::Value>;

/// 定义基于 UUID v7 的实体 ID
macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            serde::Serialize,
            serde::Deserialize,
            derive_more::Display,
            derive_more::From,
        )]
        #[display("{_0}")]
        #[serde(transparent)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(cuba_common::utils::new_id())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(uuid::Uuid::parse_str(s)?))
            }
        }
    };
}

pub(crate) use entity_id;

pub use audit::{AuditLogId, PermissionAuditFilter, PermissionAuditLog};
pub use cache::PermissionCache;
pub use check::{CheckMode, PermissionCheckRequest, PermissionCheckResponse};
pub use policy::{
    Policy, PolicyEvaluationRequest, PolicyEvaluationResponse, PolicyEvaluator,
    PolicyEvaluatorRegistry, PolicyId, PolicyRule, PolicyType,
};
pub use repository::{PermissionFilter, PermissionRepository, PolicyFilter, RoleFilter};
pub use resource::{
    InheritanceId, PermissionInheritance, ResourceGrantKey, ResourcePermission,
    ResourcePermissionId, SubjectType,
};
pub use role::{Effect, Permission, PermissionId, Role, RoleId, RoleType};
