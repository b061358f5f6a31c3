//! 资源级授权与权限继承

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::role::{Effect, Permission, PermissionId};
use super::{Attributes, entity_id};

entity_id!(
    /// 资源授权 ID
    ResourcePermissionId
);

entity_id!(
    /// 继承关系 ID
    InheritanceId
);

/// 授权主体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    User,
    Role,
    /// 用户组授权可以保存，但检查时不会被解析
    Group,
}

impl std::fmt::Display for SubjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SubjectType::User => "user",
            SubjectType::Role => "role",
            SubjectType::Group => "group",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for SubjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(SubjectType::User),
            "role" => Ok(SubjectType::Role),
            "group" => Ok(SubjectType::Group),
            _ => Err(format!("Unknown subject type: {}", s)),
        }
    }
}

/// 资源授权：把一个权限授予某个主体，仅作用于一个具体资源实例
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourcePermission {
    pub id: ResourcePermissionId,
    pub resource_id: String,
    pub resource_type: String,
    pub subject_id: String,
    pub subject_type: SubjectType,
    pub permission_id: PermissionId,
    /// 仓储可以预先加载，缺失时按 `permission_id` 查询
    #[serde(default)]
    pub permission: Option<Permission>,
    pub effect: Effect,
    #[serde(default)]
    pub conditions: Attributes,
    pub expires_at: Option<DateTime<Utc>>,
    pub tenant_id: String,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
}

impl ResourcePermission {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }

    /// 把授权自身的效果与条件叠加到底层权限上
    ///
    /// 授权的效果总是覆盖权限自身的效果，而不是原样返回底层权限；条件只在授权带有条件时才覆盖。
    pub fn apply_to(&self, mut permission: Permission) -> Permission {
        permission.effect = self.effect;
        if !self.conditions.is_empty() {
            permission.conditions = self.conditions.clone();
        }
        permission
    }

    /// 授权唯一键
    pub fn key(&self) -> ResourceGrantKey {
        ResourceGrantKey {
            resource_id: self.resource_id.clone(),
            resource_type: self.resource_type.clone(),
            subject_id: self.subject_id.clone(),
            subject_type: self.subject_type,
            permission_id: self.permission_id,
        }
    }
}

/// 定位一条资源授权
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceGrantKey {
    pub resource_id: String,
    pub resource_type: String,
    pub subject_id: String,
    pub subject_type: SubjectType,
    pub permission_id: PermissionId,
}

/// 继承边：`(resource_id, resource_type)` 指向父资源 `(parent_id, parent_type)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionInheritance {
    pub id: InheritanceId,
    pub resource_id: String,
    pub resource_type: String,
    pub parent_id: String,
    pub parent_type: String,
    pub inherit_type: String,
    pub is_active: bool,
    pub tenant_id: String,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
}

impl PermissionInheritance {
    pub fn new(
        tenant_id: impl Into<String>,
        resource: (&str, &str),
        parent: (&str, &str),
        inherit_type: impl Into<String>,
    ) -> Self {
        Self {
            id: InheritanceId::new(),
            resource_id: resource.0.to_string(),
            resource_type: resource.1.to_string(),
            parent_id: parent.0.to_string(),
            parent_type: parent.1.to_string(),
            inherit_type: inherit_type.into(),
            is_active: true,
            tenant_id: tenant_id.into(),
            created_at: Utc::now(),
            created_by: None,
        }
    }
}
