//! 角色实体

use cuba_common::AuditInfo;
use serde::{Deserialize, Serialize};

use super::permission::{Permission, PermissionId};
use crate::domain::{Attributes, entity_id};

entity_id!(
    /// 角色 ID
    RoleId
);

/// 角色类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleType {
    System,
    #[default]
    Custom,
    Functional,
    Data,
}

impl std::fmt::Display for RoleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RoleType::System => "system",
            RoleType::Custom => "custom",
            RoleType::Functional => "functional",
            RoleType::Data => "data",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for RoleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(RoleType::System),
            "custom" => Ok(RoleType::Custom),
            "functional" => Ok(RoleType::Functional),
            "data" => Ok(RoleType::Data),
            _ => Err(format!("Unknown role type: {}", s)),
        }
    }
}

/// 角色实体
///
/// `parent_id` 构成单亲层级；`is_system` 的角色不可删除。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub tenant_id: String,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub role_type: RoleType,
    pub level: i32,
    pub parent_id: Option<RoleId>,
    pub is_system: bool,
    pub is_active: bool,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub metadata: Attributes,
    pub audit_info: AuditInfo,
}

impl Role {
    pub fn new(
        tenant_id: impl Into<String>,
        code: impl Into<String>,
        name: impl Into<String>,
        role_type: RoleType,
    ) -> Self {
        Self {
            id: RoleId::new(),
            tenant_id: tenant_id.into(),
            code: code.into(),
            name: name.into(),
            description: None,
            role_type,
            level: 0,
            parent_id: None,
            is_system: false,
            is_active: true,
            permissions: Vec::new(),
            metadata: Attributes::new(),
            audit_info: AuditInfo::default(),
        }
    }

    /// 创建系统角色
    pub fn system_role(
        tenant_id: impl Into<String>,
        code: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let mut role = Self::new(tenant_id, code, name, RoleType::System);
        role.is_system = true;
        role
    }

    pub fn with_parent(mut self, parent_id: RoleId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    /// 添加权限（按 ID 去重）
    pub fn add_permission(&mut self, permission: Permission) {
        if !self.permissions.iter().any(|p| p.id == permission.id) {
            self.permissions.push(permission);
        }
    }

    /// 移除权限
    pub fn remove_permission(&mut self, permission_id: &PermissionId) {
        self.permissions.retain(|p| &p.id != permission_id);
    }

    pub fn activate(&mut self) {
        self.is_active = true;
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
    }
}
