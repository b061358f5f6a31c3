//! 仓储接口
//!
//! 权限、角色、策略、关联关系、资源授权、继承边与审计日志的持久化。
//! `get_*` 在记录不存在时返回 `Ok(None)`。

use async_trait::async_trait;
use cuba_common::{PagedResult, Pagination};
use cuba_errors::AppResult;
use serde::{Deserialize, Serialize};

use super::audit::{PermissionAuditFilter, PermissionAuditLog};
use super::policy::{Policy, PolicyId, PolicyType};
use super::resource::{PermissionInheritance, ResourceGrantKey, ResourcePermission};
use super::role::{Effect, Permission, PermissionId, Role, RoleId, RoleType};

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// 角色查询条件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleFilter {
    pub tenant_id: Option<String>,
    pub name: Option<String>,
    /// 名称或代码的模糊匹配
    pub search: Option<String>,
    pub role_type: Option<RoleType>,
    pub parent_id: Option<RoleId>,
    pub is_system: Option<bool>,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl RoleFilter {
    pub fn matches(&self, role: &Role) -> bool {
        self.tenant_id.as_ref().is_none_or(|t| t == &role.tenant_id)
            && self.name.as_ref().is_none_or(|n| n == &role.name)
            && self
                .search
                .as_ref()
                .is_none_or(|s| contains_ci(&role.name, s) || contains_ci(&role.code, s))
            && self.role_type.is_none_or(|t| t == role.role_type)
            && self.parent_id.is_none_or(|p| role.parent_id == Some(p))
            && self.is_system.is_none_or(|v| v == role.is_system)
            && self.is_active.is_none_or(|v| v == role.is_active)
    }
}

/// 权限查询条件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionFilter {
    pub tenant_id: Option<String>,
    pub name: Option<String>,
    pub search: Option<String>,
    pub category: Option<String>,
    pub resource: Option<String>,
    pub action: Option<String>,
    pub effect: Option<Effect>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl PermissionFilter {
    pub fn matches(&self, permission: &Permission) -> bool {
        self.tenant_id.as_ref().is_none_or(|t| t == &permission.tenant_id)
            && self.name.as_ref().is_none_or(|n| n == &permission.name)
            && self.search.as_ref().is_none_or(|s| {
                contains_ci(&permission.name, s) || contains_ci(&permission.code, s)
            })
            && self
                .category
                .as_ref()
                .is_none_or(|c| permission.category.as_ref() == Some(c))
            && self.resource.as_ref().is_none_or(|r| r == &permission.resource)
            && self.action.as_ref().is_none_or(|a| a == &permission.action)
            && self.effect.is_none_or(|e| e == permission.effect)
    }
}

/// 策略查询条件
///
/// `list_policies` 按优先级从高到低返回，同优先级按创建先后；策略评估按这个顺序取第一个可用策略。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyFilter {
    pub tenant_id: Option<String>,
    pub name: Option<String>,
    pub policy_type: Option<PolicyType>,
    pub effect: Option<Effect>,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl PolicyFilter {
    /// 租户下启用的策略
    pub fn active_for_tenant(tenant_id: impl Into<String>, page_size: u32) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            is_active: Some(true),
            pagination: Pagination::new(1, page_size),
            ..Default::default()
        }
    }

    pub fn matches(&self, policy: &Policy) -> bool {
        self.tenant_id.as_ref().is_none_or(|t| t == &policy.tenant_id)
            && self.name.as_ref().is_none_or(|n| n == &policy.name)
            && self.policy_type.is_none_or(|t| t == policy.policy_type)
            && self.effect.is_none_or(|e| e == policy.effect)
            && self.is_active.is_none_or(|v| v == policy.is_active)
    }
}

/// 权限仓储
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PermissionRepository: Send + Sync {
    // 权限
    async fn create_permission(&self, permission: &Permission) -> AppResult<()>;
    async fn get_permission(&self, id: &PermissionId) -> AppResult<Option<Permission>>;
    async fn update_permission(&self, permission: &Permission) -> AppResult<()>;
    async fn delete_permission(&self, id: &PermissionId) -> AppResult<()>;
    async fn list_permissions(&self, filter: &PermissionFilter) -> AppResult<PagedResult<Permission>>;

    // 角色
    async fn create_role(&self, role: &Role) -> AppResult<()>;
    async fn get_role(&self, id: &RoleId) -> AppResult<Option<Role>>;
    async fn get_role_by_name(&self, name: &str, tenant_id: &str) -> AppResult<Option<Role>>;
    async fn update_role(&self, role: &Role) -> AppResult<()>;
    async fn delete_role(&self, id: &RoleId) -> AppResult<()>;
    async fn list_roles(&self, filter: &RoleFilter) -> AppResult<PagedResult<Role>>;

    // 角色-权限
    async fn assign_permission_to_role(&self, role_id: &RoleId, permission_id: &PermissionId) -> AppResult<()>;
    async fn revoke_permission_from_role(&self, role_id: &RoleId, permission_id: &PermissionId) -> AppResult<()>;
    async fn get_role_permissions(&self, role_id: &RoleId) -> AppResult<Vec<Permission>>;

    // 用户-角色
    async fn assign_role_to_user(&self, user_id: &str, role_id: &RoleId, tenant_id: &str) -> AppResult<()>;
    async fn revoke_role_from_user(&self, user_id: &str, role_id: &RoleId, tenant_id: &str) -> AppResult<()>;
    async fn get_user_roles(&self, user_id: &str, tenant_id: &str) -> AppResult<Vec<Role>>;

    // 资源授权
    async fn create_resource_permission(&self, grant: &ResourcePermission) -> AppResult<()>;
    async fn delete_resource_permission(&self, key: &ResourceGrantKey) -> AppResult<()>;
    async fn get_resource_permissions(&self, resource_id: &str, resource_type: &str) -> AppResult<Vec<ResourcePermission>>;

    // 继承关系
    async fn create_permission_inheritance(&self, inheritance: &PermissionInheritance) -> AppResult<()>;
    async fn get_permission_inheritance(&self, resource_id: &str, resource_type: &str) -> AppResult<Option<PermissionInheritance>>;
    async fn update_permission_inheritance(&self, inheritance: &PermissionInheritance) -> AppResult<()>;
    async fn delete_permission_inheritance(&self, resource_id: &str, resource_type: &str) -> AppResult<()>;

    // 策略
    async fn create_policy(&self, policy: &Policy) -> AppResult<()>;
    async fn get_policy(&self, id: &PolicyId) -> AppResult<Option<Policy>>;
    async fn update_policy(&self, policy: &Policy) -> AppResult<()>;
    async fn delete_policy(&self, id: &PolicyId) -> AppResult<()>;
    /// 按 `priority` 降序，同优先级按创建先后
    async fn list_policies(&self, filter: &PolicyFilter) -> AppResult<PagedResult<Policy>>;

    // 审计日志
    async fn create_permission_audit_log(&self, log: &PermissionAuditLog) -> AppResult<()>;
    async fn get_permission_audit_logs(&self, filter: &PermissionAuditFilter) -> AppResult<PagedResult<PermissionAuditLog>>;

    /// 健康检查
    async fn health_check(&self) -> AppResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::PolicyRule;

    #[test]
    fn test_role_filter() {
        let parent = Role::new("t1", "base", "Base", RoleType::Custom);
        let role = Role::new("t1", "doc_editor", "Document Editor", RoleType::Functional)
            .with_parent(parent.id);

        let filter = RoleFilter {
            search: Some("EDITOR".into()),
            parent_id: Some(parent.id),
            ..Default::default()
        };
        assert!(filter.matches(&role));

        let filter = RoleFilter {
            is_system: Some(true),
            ..Default::default()
        };
        assert!(!filter.matches(&role));
    }

    #[test]
    fn test_permission_filter() {
        let mut perm = Permission::allow("t1", "doc", "read");
        perm.category = Some("docs".into());

        let filter = PermissionFilter {
            category: Some("docs".into()),
            effect: Some(Effect::Allow),
            ..Default::default()
        };
        assert!(filter.matches(&perm));

        let filter = PermissionFilter {
            resource: Some("task".into()),
            ..Default::default()
        };
        assert!(!filter.matches(&perm));
    }

    #[test]
    fn test_active_policy_filter() {
        let rules = vec![PolicyRule::new("r1", "*", "read", Effect::Allow)];
        let active = Policy::new("t1", "p1", PolicyType::Rbac, rules.clone());
        let inactive = Policy::new("t1", "p2", PolicyType::Rbac, rules.clone()).inactive();
        let other = Policy::new("t2", "p3", PolicyType::Rbac, rules);

        let filter = PolicyFilter::active_for_tenant("t1", 1000);
        assert_eq!(filter.pagination.page_size, 1000);
        assert!(filter.matches(&active));
        assert!(!filter.matches(&inactive));
        assert!(!filter.matches(&other));
    }
}
