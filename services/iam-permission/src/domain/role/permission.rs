//! 权限实体

use cuba_common::AuditInfo;
use serde::{Deserialize, Serialize};

use crate::domain::matcher::{evaluate_conditions, matches_action, matches_resource};
use crate::domain::{Attributes, entity_id};

entity_id!(
    /// 权限 ID
    PermissionId
);

/// 权限效果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    /// 允许
    Allow,
    /// 拒绝
    #[default]
    Deny,
}

impl Effect {
    pub fn is_allow(self) -> bool {
        self == Effect::Allow
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Allow => write!(f, "allow"),
            Effect::Deny => write!(f, "deny"),
        }
    }
}

impl std::str::FromStr for Effect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "allow" => Ok(Effect::Allow),
            "deny" => Ok(Effect::Deny),
            _ => Err(format!("Unknown effect: {}", s)),
        }
    }
}

/// 权限实体
///
/// 对 `resource` / `action` 模式授予 `effect`，模式支持 `*` 与前缀通配 `doc*`。
/// `conditions` 中的每个键都必须在请求上下文中以相同的值出现。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    /// 权限代码 (如 "doc:read")
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub resource: String,
    pub action: String,
    pub effect: Effect,
    #[serde(default)]
    pub conditions: Attributes,
    #[serde(default)]
    pub metadata: Attributes,
    pub tenant_id: String,
    pub audit_info: AuditInfo,
}

impl Permission {
    pub fn new(
        tenant_id: impl Into<String>,
        code: impl Into<String>,
        name: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
        effect: Effect,
    ) -> Self {
        Self {
            id: PermissionId::new(),
            code: code.into(),
            name: name.into(),
            description: None,
            category: None,
            resource: resource.into(),
            action: action.into(),
            effect,
            conditions: Attributes::new(),
            metadata: Attributes::new(),
            tenant_id: tenant_id.into(),
            audit_info: AuditInfo::default(),
        }
    }

    /// 以 "resource:action" 为代码快速创建允许权限
    pub fn allow(tenant_id: impl Into<String>, resource: &str, action: &str) -> Self {
        let code = format!("{}:{}", resource, action);
        Self::new(tenant_id, code.clone(), code, resource, action, Effect::Allow)
    }

    /// 以 "resource:action" 为代码快速创建拒绝权限
    pub fn deny(tenant_id: impl Into<String>, resource: &str, action: &str) -> Self {
        let mut permission = Self::allow(tenant_id, resource, action);
        permission.effect = Effect::Deny;
        permission
    }

    pub fn with_condition(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.conditions.insert(key.into(), value);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// 资源与操作是否都匹配
    pub fn matches(&self, resource: &str, action: &str) -> bool {
        matches_resource(&self.resource, resource) && matches_action(&self.action, action)
    }

    /// 条件是否在给定上下文中成立
    pub fn conditions_hold(&self, context: &Attributes) -> bool {
        evaluate_conditions(&self.conditions, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quick_create() {
        let perm = Permission::allow("t1", "doc", "read");
        assert_eq!(perm.code, "doc:read");
        assert_eq!(perm.effect, Effect::Allow);
        assert!(perm.conditions.is_empty());
    }

    #[test]
    fn test_matches() {
        let perm = Permission::allow("t1", "doc", "read");
        assert!(perm.matches("doc", "read"));
        assert!(!perm.matches("doc", "delete"));
        assert!(!perm.matches("task", "read"));
    }

    #[test]
    fn test_prefix_wildcard_matches() {
        let perm = Permission::allow("t1", "task*", "*");
        assert!(perm.matches("task.create", "write"));
        assert!(!perm.matches("project.create", "write"));
    }

    #[test]
    fn test_conditions_hold() {
        let perm = Permission::allow("t1", "doc", "read").with_condition("env", json!("prod"));
        let mut ctx = Attributes::new();
        assert!(!perm.conditions_hold(&ctx));
        ctx.insert("env".into(), json!("staging"));
        assert!(!perm.conditions_hold(&ctx));
        ctx.insert("env".into(), json!("prod"));
        assert!(perm.conditions_hold(&ctx));
    }

    #[test]
    fn test_effect_parse_and_display() {
        assert_eq!("ALLOW".parse::<Effect>().unwrap(), Effect::Allow);
        assert_eq!(Effect::Deny.to_string(), "deny");
        assert!("maybe".parse::<Effect>().is_err());
        assert_eq!(serde_json::to_value(Effect::Allow).unwrap(), json!("allow"));
    }
}
