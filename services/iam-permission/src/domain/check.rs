//! 权限检查请求与响应

use serde::{Deserialize, Serialize};

use super::Attributes;
use super::policy::Policy;
use super::role::{Effect, Permission};

/// 检查模式，随请求透传，不影响判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckMode {
    #[default]
    Strict,
    Loose,
}

impl std::fmt::Display for CheckMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckMode::Strict => write!(f, "strict"),
            CheckMode::Loose => write!(f, "loose"),
        }
    }
}

/// 权限检查请求
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PermissionCheckRequest {
    pub user_id: String,
    pub tenant_id: String,
    pub resource: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub context: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_mode: Option<CheckMode>,
}

impl PermissionCheckRequest {
    pub fn new(
        user_id: impl Into<String>,
        tenant_id: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            tenant_id: tenant_id.into(),
            resource: resource.into(),
            action: action.into(),
            ..Default::default()
        }
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn with_check_mode(mut self, mode: CheckMode) -> Self {
        self.check_mode = Some(mode);
        self
    }

    /// 校验必填字段
    pub fn validate(&self) -> Result<(), String> {
        if self.user_id.is_empty() {
            return Err("user_id is required".to_string());
        }
        if self.tenant_id.is_empty() {
            return Err("tenant_id is required".to_string());
        }
        if self.resource.is_empty() {
            return Err("resource is required".to_string());
        }
        if self.action.is_empty() {
            return Err("action is required".to_string());
        }
        Ok(())
    }

    /// 决策缓存键：`perm_check:{user}:{tenant}:{resource}:{action}[:{resource_id}]`
    pub fn cache_key(&self) -> String {
        let mut key = format!(
            "perm_check:{}:{}:{}:{}",
            self.user_id, self.tenant_id, self.resource, self.action
        );
        if let Some(resource_id) = &self.resource_id {
            key.push(':');
            key.push_str(resource_id);
        }
        key
    }

    /// 某个用户在某个租户下所有决策缓存键的公共前缀
    pub fn user_cache_prefix(user_id: &str, tenant_id: &str) -> String {
        format!("perm_check:{}:{}:", user_id, tenant_id)
    }
}

/// 权限检查响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionCheckResponse {
    pub allowed: bool,
    pub reason: String,
    pub effect: Effect,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<Permission>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<Policy>,
}

impl PermissionCheckResponse {
    /// 拒绝响应
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            effect: Effect::Deny,
            permissions: Vec::new(),
            policies: Vec::new(),
        }
    }

    /// 由命中的权限决定
    pub fn from_permission(permission: Permission) -> Self {
        Self {
            allowed: permission.effect.is_allow(),
            reason: format!("Permission {} matched", permission.code),
            effect: permission.effect,
            permissions: vec![permission],
            policies: Vec::new(),
        }
    }

    /// 由策略评估放行
    pub fn from_policy(effect: Effect, policy: Option<Policy>) -> Self {
        Self {
            allowed: true,
            reason: "Policy evaluation allowed".to_string(),
            effect,
            permissions: Vec::new(),
            policies: policy.into_iter().collect(),
        }
    }

    /// 默认拒绝
    pub fn default_deny() -> Self {
        Self::deny("No matching permission found")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_key_format() {
        let req = PermissionCheckRequest::new("u1", "t1", "doc", "read");
        assert_eq!(req.cache_key(), "perm_check:u1:t1:doc:read");

        let req = req.with_resource_id("doc-42");
        assert_eq!(req.cache_key(), "perm_check:u1:t1:doc:read:doc-42");
        assert!(
            req.cache_key()
                .starts_with(&PermissionCheckRequest::user_cache_prefix("u1", "t1"))
        );
    }

    #[test]
    fn test_cache_key_ignores_context() {
        let a = PermissionCheckRequest::new("u1", "t1", "doc", "read");
        let b = a.clone().with_context("env", json!("prod"));
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_validate_reports_first_missing_field() {
        let req = PermissionCheckRequest::new("", "", "doc", "read");
        assert_eq!(req.validate().unwrap_err(), "user_id is required");

        let req = PermissionCheckRequest::new("u1", "t1", "doc", "");
        assert_eq!(req.validate().unwrap_err(), "action is required");

        assert!(PermissionCheckRequest::new("u1", "t1", "doc", "read").validate().is_ok());
    }

    #[test]
    fn test_response_constructors() {
        let deny = PermissionCheckResponse::default_deny();
        assert!(!deny.allowed);
        assert_eq!(deny.effect, Effect::Deny);
        assert_eq!(deny.reason, "No matching permission found");

        let perm = Permission::deny("t1", "doc", "delete");
        let resp = PermissionCheckResponse::from_permission(perm);
        assert!(!resp.allowed);
        assert_eq!(resp.reason, "Permission doc:delete matched");
        assert_eq!(resp.permissions.len(), 1);
    }

    #[test]
    fn test_request_deserializes_with_optional_fields_missing() {
        let req: PermissionCheckRequest = serde_json::from_value(json!({
            "user_id": "u1",
            "tenant_id": "t1",
            "resource": "doc",
            "action": "read",
            "check_mode": "loose"
        }))
        .unwrap();
        assert_eq!(req.check_mode, Some(CheckMode::Loose));
        assert!(req.resource_id.is_none());
        assert!(req.context.is_empty());
    }
}
