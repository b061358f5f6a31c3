//! 管理命令定义
//!
//! 类型字段（角色类型、主体类型、策略类型、效果）在反序列化时就已经校验，
//! `validate` 只检查必填项。

use chrono::{DateTime, Utc};
use cuba_common::AuditInfo;
use serde::Deserialize;

use crate::domain::{
    Attributes, Effect, Permission, PermissionId, PermissionInheritance, Policy, PolicyRule,
    PolicyType, ResourcePermission, ResourcePermissionId, Role, RoleId, RoleType, SubjectType,
};

fn require(value: &str, field: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{} is required", field));
    }
    Ok(())
}

/// 创建角色命令
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoleCommand {
    pub tenant_id: String,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub role_type: RoleType,
    #[serde(default)]
    pub level: i32,
    #[serde(default)]
    pub parent_id: Option<RoleId>,
    /// 创建后立即分配的权限
    #[serde(default)]
    pub permissions: Vec<PermissionId>,
    #[serde(default)]
    pub metadata: Attributes,
    #[serde(default)]
    pub performed_by: Option<String>,
}

impl CreateRoleCommand {
    pub fn new(tenant_id: impl Into<String>, code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            code: code.into(),
            name: name.into(),
            description: None,
            role_type: RoleType::Custom,
            level: 0,
            parent_id: None,
            permissions: Vec::new(),
            metadata: Attributes::new(),
            performed_by: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        require(&self.name, "name")?;
        require(&self.code, "code")?;
        require(&self.tenant_id, "tenant_id")?;
        Ok(())
    }

    /// 通过管理接口创建的角色一律不是系统角色
    pub fn into_role(self) -> Role {
        let mut role = Role::new(self.tenant_id, self.code, self.name, self.role_type);
        role.description = self.description;
        role.level = self.level;
        role.parent_id = self.parent_id;
        role.metadata = self.metadata;
        role.audit_info = AuditInfo::new(self.performed_by);
        role
    }
}

/// 更新角色命令，`None` 表示不修改
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdateRoleCommand {
    pub name: Option<String>,
    pub description: Option<String>,
    pub role_type: Option<RoleType>,
    pub level: Option<i32>,
    pub parent_id: Option<RoleId>,
    pub is_active: Option<bool>,
    pub metadata: Option<Attributes>,
    pub performed_by: Option<String>,
}

impl UpdateRoleCommand {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            require(name, "name")?;
        }
        Ok(())
    }

    /// `is_system` 不受更新影响
    pub fn apply_to(self, role: &mut Role) {
        if let Some(name) = self.name {
            role.name = name;
        }
        if let Some(description) = self.description {
            role.description = Some(description);
        }
        if let Some(role_type) = self.role_type {
            role.role_type = role_type;
        }
        if let Some(level) = self.level {
            role.level = level;
        }
        if let Some(parent_id) = self.parent_id {
            role.parent_id = Some(parent_id);
        }
        if let Some(is_active) = self.is_active {
            role.is_active = is_active;
        }
        if let Some(metadata) = self.metadata {
            role.metadata = metadata;
        }
        role.audit_info.touch(self.performed_by);
    }
}

/// 创建权限命令
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePermissionCommand {
    pub tenant_id: String,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub resource: String,
    pub action: String,
    pub effect: Effect,
    #[serde(default)]
    pub conditions: Attributes,
    #[serde(default)]
    pub metadata: Attributes,
    #[serde(default)]
    pub performed_by: Option<String>,
}

impl CreatePermissionCommand {
    pub fn new(
        tenant_id: impl Into<String>,
        code: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
        effect: Effect,
    ) -> Self {
        let code = code.into();
        Self {
            tenant_id: tenant_id.into(),
            name: code.clone(),
            code,
            description: None,
            category: None,
            resource: resource.into(),
            action: action.into(),
            effect,
            conditions: Attributes::new(),
            metadata: Attributes::new(),
            performed_by: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        require(&self.name, "name")?;
        require(&self.code, "code")?;
        require(&self.resource, "resource")?;
        require(&self.action, "action")?;
        require(&self.tenant_id, "tenant_id")?;
        Ok(())
    }

    pub fn into_permission(self) -> Permission {
        let mut permission = Permission::new(
            self.tenant_id,
            self.code,
            self.name,
            self.resource,
            self.action,
            self.effect,
        );
        permission.description = self.description;
        permission.category = self.category;
        permission.conditions = self.conditions;
        permission.metadata = self.metadata;
        permission.audit_info = AuditInfo::new(self.performed_by);
        permission
    }
}

/// 更新权限命令
///
/// 资源与操作模式不可修改，需要时新建权限。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdatePermissionCommand {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub effect: Option<Effect>,
    pub conditions: Option<Attributes>,
    pub metadata: Option<Attributes>,
    pub performed_by: Option<String>,
}

impl UpdatePermissionCommand {
    pub fn apply_to(self, permission: &mut Permission) {
        if let Some(name) = self.name {
            permission.name = name;
        }
        if let Some(description) = self.description {
            permission.description = Some(description);
        }
        if let Some(category) = self.category {
            permission.category = Some(category);
        }
        if let Some(effect) = self.effect {
            permission.effect = effect;
        }
        if let Some(conditions) = self.conditions {
            permission.conditions = conditions;
        }
        if let Some(metadata) = self.metadata {
            permission.metadata = metadata;
        }
        permission.audit_info.touch(self.performed_by);
    }
}

/// 资源授权命令
#[derive(Debug, Clone, Deserialize)]
pub struct GrantResourcePermissionCommand {
    pub tenant_id: String,
    pub resource_id: String,
    pub resource_type: String,
    pub subject_id: String,
    pub subject_type: SubjectType,
    pub permission_id: PermissionId,
    pub effect: Effect,
    #[serde(default)]
    pub conditions: Attributes,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub performed_by: Option<String>,
}

impl GrantResourcePermissionCommand {
    pub fn new(
        tenant_id: impl Into<String>,
        resource: (&str, &str),
        subject: (&str, SubjectType),
        permission_id: PermissionId,
        effect: Effect,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            resource_id: resource.0.to_string(),
            resource_type: resource.1.to_string(),
            subject_id: subject.0.to_string(),
            subject_type: subject.1,
            permission_id,
            effect,
            conditions: Attributes::new(),
            expires_at: None,
            performed_by: None,
        }
    }

    pub fn with_expiry(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        require(&self.resource_id, "resource_id")?;
        require(&self.resource_type, "resource_type")?;
        require(&self.subject_id, "subject_id")?;
        require(&self.tenant_id, "tenant_id")?;
        Ok(())
    }

    pub fn into_grant(self) -> ResourcePermission {
        ResourcePermission {
            id: ResourcePermissionId::new(),
            resource_id: self.resource_id,
            resource_type: self.resource_type,
            subject_id: self.subject_id,
            subject_type: self.subject_type,
            permission_id: self.permission_id,
            permission: None,
            effect: self.effect,
            conditions: self.conditions,
            expires_at: self.expires_at,
            tenant_id: self.tenant_id,
            created_at: Utc::now(),
            created_by: self.performed_by,
        }
    }
}

/// 设置继承关系命令
#[derive(Debug, Clone, Deserialize)]
pub struct SetInheritanceCommand {
    pub tenant_id: String,
    pub resource_id: String,
    pub resource_type: String,
    pub parent_id: String,
    pub parent_type: String,
    pub inherit_type: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub performed_by: Option<String>,
}

fn default_true() -> bool {
    true
}

impl SetInheritanceCommand {
    pub fn new(tenant_id: impl Into<String>, resource: (&str, &str), parent: (&str, &str)) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            resource_id: resource.0.to_string(),
            resource_type: resource.1.to_string(),
            parent_id: parent.0.to_string(),
            parent_type: parent.1.to_string(),
            inherit_type: "full".to_string(),
            is_active: true,
            performed_by: None,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        require(&self.resource_id, "resource_id")?;
        require(&self.resource_type, "resource_type")?;
        require(&self.parent_id, "parent_id")?;
        require(&self.parent_type, "parent_type")?;
        require(&self.inherit_type, "inherit_type")?;
        require(&self.tenant_id, "tenant_id")?;
        Ok(())
    }

    pub fn into_inheritance(self) -> PermissionInheritance {
        let mut inheritance = PermissionInheritance::new(
            self.tenant_id,
            (self.resource_id.as_str(), self.resource_type.as_str()),
            (self.parent_id.as_str(), self.parent_type.as_str()),
            self.inherit_type,
        );
        inheritance.is_active = self.is_active;
        inheritance.created_by = self.performed_by;
        inheritance
    }
}

/// 创建策略命令
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePolicyCommand {
    pub tenant_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub policy_type: PolicyType,
    pub rules: Vec<PolicyRule>,
    pub effect: Effect,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub metadata: Attributes,
    #[serde(default)]
    pub performed_by: Option<String>,
}

impl CreatePolicyCommand {
    pub fn new(
        tenant_id: impl Into<String>,
        name: impl Into<String>,
        policy_type: PolicyType,
        rules: Vec<PolicyRule>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            name: name.into(),
            description: None,
            policy_type,
            rules,
            effect: Effect::Allow,
            priority: 0,
            is_active: true,
            metadata: Attributes::new(),
            performed_by: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        require(&self.name, "name")?;
        if self.rules.is_empty() {
            return Err("rules are required".to_string());
        }
        require(&self.tenant_id, "tenant_id")?;
        Ok(())
    }

    pub fn into_policy(self) -> Policy {
        let mut policy = Policy::new(self.tenant_id, self.name, self.policy_type, self.rules)
            .with_priority(self.priority);
        policy.description = self.description;
        policy.effect = self.effect;
        policy.is_active = self.is_active;
        policy.metadata = self.metadata;
        policy.audit_info = AuditInfo::new(self.performed_by);
        policy
    }
}

/// 更新策略命令
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdatePolicyCommand {
    pub name: Option<String>,
    pub description: Option<String>,
    pub rules: Option<Vec<PolicyRule>>,
    pub effect: Option<Effect>,
    pub priority: Option<i32>,
    pub is_active: Option<bool>,
    pub metadata: Option<Attributes>,
    pub performed_by: Option<String>,
}

impl UpdatePolicyCommand {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            require(name, "name")?;
        }
        if self.rules.as_ref().is_some_and(Vec::is_empty) {
            return Err("rules are required".to_string());
        }
        Ok(())
    }

    pub fn apply_to(self, policy: &mut Policy) {
        if let Some(name) = self.name {
            policy.name = name;
        }
        if let Some(description) = self.description {
            policy.description = Some(description);
        }
        if let Some(rules) = self.rules {
            policy.rules = rules;
        }
        if let Some(effect) = self.effect {
            policy.effect = effect;
        }
        if let Some(priority) = self.priority {
            policy.priority = priority;
        }
        if let Some(is_active) = self.is_active {
            policy.is_active = is_active;
        }
        if let Some(metadata) = self.metadata {
            policy.metadata = metadata;
        }
        policy.audit_info.touch(self.performed_by);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_role_validation() {
        let cmd = CreateRoleCommand::new("t1", "editor", "");
        assert_eq!(cmd.validate().unwrap_err(), "name is required");

        let cmd = CreateRoleCommand::new("", "editor", "Editor");
        assert_eq!(cmd.validate().unwrap_err(), "tenant_id is required");

        let role = CreateRoleCommand::new("t1", "editor", "Editor").into_role();
        assert!(!role.is_system);
        assert!(role.is_active);
    }

    #[test]
    fn test_update_role_keeps_system_flag() {
        let mut role = Role::system_role("t1", "admin", "Admin");
        UpdateRoleCommand {
            name: Some("Administrator".into()),
            is_active: Some(false),
            ..Default::default()
        }
        .apply_to(&mut role);

        assert_eq!(role.name, "Administrator");
        assert!(!role.is_active);
        assert!(role.is_system);
    }

    #[test]
    fn test_invalid_role_type_rejected_at_parse_time() {
        let result: Result<CreateRoleCommand, _> = serde_json::from_value(json!({
            "tenant_id": "t1",
            "code": "x",
            "name": "X",
            "role_type": "superuser"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_policy_requires_rules() {
        let cmd = CreatePolicyCommand::new("t1", "p", PolicyType::Rbac, vec![]);
        assert_eq!(cmd.validate().unwrap_err(), "rules are required");

        let update = UpdatePolicyCommand {
            rules: Some(vec![]),
            ..Default::default()
        };
        assert!(update.validate().is_err());
    }

    #[test]
    fn test_grant_and_inheritance_validation() {
        let grant = GrantResourcePermissionCommand::new(
            "t1",
            ("", "doc"),
            ("u1", SubjectType::User),
            PermissionId::new(),
            Effect::Allow,
        );
        assert_eq!(grant.validate().unwrap_err(), "resource_id is required");

        let mut inherit = SetInheritanceCommand::new("t1", ("doc-1", "doc"), ("folder-1", "folder"));
        assert!(inherit.validate().is_ok());
        inherit.inherit_type.clear();
        assert_eq!(inherit.validate().unwrap_err(), "inherit_type is required");
    }

    #[test]
    fn test_permission_command_conversion() {
        let mut cmd = CreatePermissionCommand::new("t1", "doc.read", "doc", "read", Effect::Allow);
        cmd.conditions.insert("env".into(), json!("prod"));
        let perm = cmd.into_permission();
        assert_eq!(perm.code, "doc.read");
        assert_eq!(perm.name, "doc.read");
        assert_eq!(perm.conditions.len(), 1);
    }
}
