//! 内存仓储
//!
//! 单节点部署与测试使用。所有数据放在一把读写锁下，列表按创建顺序返回
//! （策略按优先级降序）。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use cuba_common::{PagedResult, Pagination};
use cuba_errors::{AppError, AppResult};
use parking_lot::RwLock;

use crate::domain::{
    Permission, PermissionAuditFilter, PermissionAuditLog, PermissionFilter, PermissionId,
    PermissionInheritance, PermissionRepository, Policy, PolicyFilter, PolicyId, ResourceGrantKey,
    ResourcePermission, Role, RoleFilter, RoleId,
};

type UserKey = (String, String);
type ResourceKey = (String, String);

#[derive(Default)]
struct Store {
    permissions: HashMap<PermissionId, Permission>,
    roles: HashMap<RoleId, Role>,
    role_permissions: HashMap<RoleId, Vec<PermissionId>>,
    user_roles: HashMap<UserKey, Vec<RoleId>>,
    grants: Vec<ResourcePermission>,
    inheritance: HashMap<ResourceKey, PermissionInheritance>,
    policies: HashMap<PolicyId, Policy>,
    audit_logs: Vec<PermissionAuditLog>,
}

#[derive(Default)]
pub struct InMemoryPermissionRepository {
    store: RwLock<Store>,
    user_role_lookups: AtomicUsize,
    failing_users: RwLock<HashSet<String>>,
}

fn paged<T: Clone>(mut items: Vec<T>, pagination: &Pagination) -> PagedResult<T> {
    let total = items.len() as u64;
    items = pagination.slice(&items);
    PagedResult::new(items, total, pagination)
}

impl InMemoryPermissionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// `get_user_roles` 被调用的次数
    pub fn user_role_lookups(&self) -> usize {
        self.user_role_lookups.load(Ordering::SeqCst)
    }

    /// 让该用户的角色查询返回错误，模拟存储故障
    pub fn fail_user_roles_for(&self, user_id: impl Into<String>) {
        self.failing_users.write().insert(user_id.into());
    }

    /// 已写入的审计日志条数
    pub fn audit_log_count(&self) -> usize {
        self.store.read().audit_logs.len()
    }
}

#[async_trait]
impl PermissionRepository for InMemoryPermissionRepository {
    async fn create_permission(&self, permission: &Permission) -> AppResult<()> {
        let mut store = self.store.write();
        let duplicate = store
            .permissions
            .values()
            .any(|p| p.tenant_id == permission.tenant_id && p.code == permission.code);
        if duplicate {
            return Err(AppError::conflict(format!(
                "Permission code already exists: {}",
                permission.code
            )));
        }
        store.permissions.insert(permission.id, permission.clone());
        Ok(())
    }

    async fn get_permission(&self, id: &PermissionId) -> AppResult<Option<Permission>> {
        Ok(self.store.read().permissions.get(id).cloned())
    }

    async fn update_permission(&self, permission: &Permission) -> AppResult<()> {
        let mut store = self.store.write();
        match store.permissions.get_mut(&permission.id) {
            Some(existing) => {
                *existing = permission.clone();
                Ok(())
            }
            None => Err(AppError::not_found(format!("Permission {}", permission.id))),
        }
    }

    async fn delete_permission(&self, id: &PermissionId) -> AppResult<()> {
        let mut store = self.store.write();
        if store.permissions.remove(id).is_none() {
            return Err(AppError::not_found(format!("Permission {}", id)));
        }
        for ids in store.role_permissions.values_mut() {
            ids.retain(|p| p != id);
        }
        store.grants.retain(|g| &g.permission_id != id);
        Ok(())
    }

    async fn list_permissions(&self, filter: &PermissionFilter) -> AppResult<PagedResult<Permission>> {
        let store = self.store.read();
        let mut items: Vec<Permission> = store
            .permissions
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        items.sort_by_key(|p| p.id);
        Ok(paged(items, &filter.pagination))
    }

    async fn create_role(&self, role: &Role) -> AppResult<()> {
        let mut store = self.store.write();
        let duplicate = store
            .roles
            .values()
            .any(|r| r.tenant_id == role.tenant_id && (r.code == role.code || r.name == role.name));
        if duplicate {
            return Err(AppError::conflict(format!("Role already exists: {}", role.name)));
        }
        store.roles.insert(role.id, role.clone());
        Ok(())
    }

    async fn get_role(&self, id: &RoleId) -> AppResult<Option<Role>> {
        Ok(self.store.read().roles.get(id).cloned())
    }

    async fn get_role_by_name(&self, name: &str, tenant_id: &str) -> AppResult<Option<Role>> {
        Ok(self
            .store
            .read()
            .roles
            .values()
            .find(|r| r.tenant_id == tenant_id && r.name == name)
            .cloned())
    }

    async fn update_role(&self, role: &Role) -> AppResult<()> {
        let mut store = self.store.write();
        match store.roles.get_mut(&role.id) {
            Some(existing) => {
                *existing = role.clone();
                Ok(())
            }
            None => Err(AppError::not_found(format!("Role {}", role.id))),
        }
    }

    async fn delete_role(&self, id: &RoleId) -> AppResult<()> {
        let mut store = self.store.write();
        if store.roles.remove(id).is_none() {
            return Err(AppError::not_found(format!("Role {}", id)));
        }
        store.role_permissions.remove(id);
        for roles in store.user_roles.values_mut() {
            roles.retain(|r| r != id);
        }
        Ok(())
    }

    async fn list_roles(&self, filter: &RoleFilter) -> AppResult<PagedResult<Role>> {
        let store = self.store.read();
        let mut items: Vec<Role> = store
            .roles
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        items.sort_by_key(|r| r.id);
        Ok(paged(items, &filter.pagination))
    }

    async fn assign_permission_to_role(&self, role_id: &RoleId, permission_id: &PermissionId) -> AppResult<()> {
        let mut store = self.store.write();
        if !store.roles.contains_key(role_id) {
            return Err(AppError::not_found(format!("Role {}", role_id)));
        }
        if !store.permissions.contains_key(permission_id) {
            return Err(AppError::not_found(format!("Permission {}", permission_id)));
        }
        let ids = store.role_permissions.entry(*role_id).or_default();
        if !ids.contains(permission_id) {
            ids.push(*permission_id);
        }
        Ok(())
    }

    async fn revoke_permission_from_role(&self, role_id: &RoleId, permission_id: &PermissionId) -> AppResult<()> {
        if let Some(ids) = self.store.write().role_permissions.get_mut(role_id) {
            ids.retain(|p| p != permission_id);
        }
        Ok(())
    }

    async fn get_role_permissions(&self, role_id: &RoleId) -> AppResult<Vec<Permission>> {
        let store = self.store.read();
        Ok(store
            .role_permissions
            .get(role_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| store.permissions.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn assign_role_to_user(&self, user_id: &str, role_id: &RoleId, tenant_id: &str) -> AppResult<()> {
        let mut store = self.store.write();
        if !store.roles.contains_key(role_id) {
            return Err(AppError::not_found(format!("Role {}", role_id)));
        }
        let roles = store
            .user_roles
            .entry((user_id.to_string(), tenant_id.to_string()))
            .or_default();
        if !roles.contains(role_id) {
            roles.push(*role_id);
        }
        Ok(())
    }

    async fn revoke_role_from_user(&self, user_id: &str, role_id: &RoleId, tenant_id: &str) -> AppResult<()> {
        let key = (user_id.to_string(), tenant_id.to_string());
        if let Some(roles) = self.store.write().user_roles.get_mut(&key) {
            roles.retain(|r| r != role_id);
        }
        Ok(())
    }

    async fn get_user_roles(&self, user_id: &str, tenant_id: &str) -> AppResult<Vec<Role>> {
        self.user_role_lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing_users.read().contains(user_id) {
            return Err(AppError::database(format!(
                "user role lookup failed for {}",
                user_id
            )));
        }

        let store = self.store.read();
        let key = (user_id.to_string(), tenant_id.to_string());
        Ok(store
            .user_roles
            .get(&key)
            .map(|ids| ids.iter().filter_map(|id| store.roles.get(id).cloned()).collect())
            .unwrap_or_default())
    }

    async fn create_resource_permission(&self, grant: &ResourcePermission) -> AppResult<()> {
        let mut store = self.store.write();
        let key = grant.key();
        store.grants.retain(|g| g.key() != key);
        store.grants.push(grant.clone());
        Ok(())
    }

    async fn delete_resource_permission(&self, key: &ResourceGrantKey) -> AppResult<()> {
        self.store.write().grants.retain(|g| &g.key() != key);
        Ok(())
    }

    async fn get_resource_permissions(&self, resource_id: &str, resource_type: &str) -> AppResult<Vec<ResourcePermission>> {
        Ok(self
            .store
            .read()
            .grants
            .iter()
            .filter(|g| g.resource_id == resource_id && g.resource_type == resource_type)
            .cloned()
            .collect())
    }

    async fn create_permission_inheritance(&self, inheritance: &PermissionInheritance) -> AppResult<()> {
        let mut store = self.store.write();
        let key = (inheritance.resource_id.clone(), inheritance.resource_type.clone());
        if store.inheritance.contains_key(&key) {
            return Err(AppError::conflict(format!(
                "Inheritance already exists for {}:{}",
                key.1, key.0
            )));
        }
        store.inheritance.insert(key, inheritance.clone());
        Ok(())
    }

    async fn get_permission_inheritance(&self, resource_id: &str, resource_type: &str) -> AppResult<Option<PermissionInheritance>> {
        let key = (resource_id.to_string(), resource_type.to_string());
        Ok(self.store.read().inheritance.get(&key).cloned())
    }

    async fn update_permission_inheritance(&self, inheritance: &PermissionInheritance) -> AppResult<()> {
        let mut store = self.store.write();
        let key = (inheritance.resource_id.clone(), inheritance.resource_type.clone());
        match store.inheritance.get_mut(&key) {
            Some(existing) => {
                *existing = inheritance.clone();
                Ok(())
            }
            None => Err(AppError::not_found(format!(
                "Inheritance for {}:{}",
                key.1, key.0
            ))),
        }
    }

    async fn delete_permission_inheritance(&self, resource_id: &str, resource_type: &str) -> AppResult<()> {
        let key = (resource_id.to_string(), resource_type.to_string());
        self.store.write().inheritance.remove(&key);
        Ok(())
    }

    async fn create_policy(&self, policy: &Policy) -> AppResult<()> {
        self.store.write().policies.insert(policy.id, policy.clone());
        Ok(())
    }

    async fn get_policy(&self, id: &PolicyId) -> AppResult<Option<Policy>> {
        Ok(self.store.read().policies.get(id).cloned())
    }

    async fn update_policy(&self, policy: &Policy) -> AppResult<()> {
        let mut store = self.store.write();
        match store.policies.get_mut(&policy.id) {
            Some(existing) => {
                *existing = policy.clone();
                Ok(())
            }
            None => Err(AppError::not_found(format!("Policy {}", policy.id))),
        }
    }

    async fn delete_policy(&self, id: &PolicyId) -> AppResult<()> {
        match self.store.write().policies.remove(id) {
            Some(_) => Ok(()),
            None => Err(AppError::not_found(format!("Policy {}", id))),
        }
    }

    async fn list_policies(&self, filter: &PolicyFilter) -> AppResult<PagedResult<Policy>> {
        let store = self.store.read();
        let mut items: Vec<Policy> = store
            .policies
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        items.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        Ok(paged(items, &filter.pagination))
    }

    async fn create_permission_audit_log(&self, log: &PermissionAuditLog) -> AppResult<()> {
        self.store.write().audit_logs.push(log.clone());
        Ok(())
    }

    async fn get_permission_audit_logs(&self, filter: &PermissionAuditFilter) -> AppResult<PagedResult<PermissionAuditLog>> {
        let store = self.store.read();
        let mut items: Vec<PermissionAuditLog> = store
            .audit_logs
            .iter()
            .filter(|log| filter.matches(log))
            .cloned()
            .collect();
        // 最新的在前
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(paged(items, &filter.pagination))
    }

    async fn health_check(&self) -> AppResult<()> {
        Ok(())
    }
}
