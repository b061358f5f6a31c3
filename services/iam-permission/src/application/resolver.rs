//! 有效权限解析
//!
//! 依次收集三类来源：角色授予的权限、资源级授权、沿继承边得到的父资源授权。
//! 返回顺序就是检查时的匹配顺序。

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use cuba_errors::AppResult;
use tracing::{debug, warn};

use crate::config::PermissionServiceConfig;
use crate::domain::{
    Permission, PermissionCache, PermissionRepository, ResourcePermission, Role, RoleId,
    SubjectType,
};

pub struct EffectivePermissionResolver<R: ?Sized> {
    repo: Arc<R>,
    cache: Option<Arc<dyn PermissionCache>>,
    config: Arc<PermissionServiceConfig>,
}

impl<R> EffectivePermissionResolver<R>
where
    R: PermissionRepository + ?Sized,
{
    pub fn new(
        repo: Arc<R>,
        cache: Option<Arc<dyn PermissionCache>>,
        config: Arc<PermissionServiceConfig>,
    ) -> Self {
        Self { repo, cache, config }
    }

    fn external_cache(&self) -> Option<&Arc<dyn PermissionCache>> {
        self.cache.as_ref().filter(|_| self.config.cache_enabled)
    }

    /// 用户在租户下的角色，经外部缓存读取
    pub async fn user_roles(&self, user_id: &str, tenant_id: &str) -> AppResult<Vec<Role>> {
        if let Some(cache) = self.external_cache() {
            match cache.get_user_roles(user_id, tenant_id).await {
                Ok(Some(roles)) => return Ok(roles),
                Ok(None) => {}
                Err(e) => warn!(user_id, tenant_id, error = %e, "Failed to read user roles from cache"),
            }
        }

        let roles = self.repo.get_user_roles(user_id, tenant_id).await?;

        if let Some(cache) = self.external_cache()
            && let Err(e) = cache
                .set_user_roles(user_id, tenant_id, &roles, self.config.user_roles_ttl())
                .await
        {
            warn!(user_id, tenant_id, error = %e, "Failed to cache user roles");
        }
        Ok(roles)
    }

    /// 角色授予的权限并集（按 ID 去重，保持首次出现的顺序），经外部缓存读取
    ///
    /// 只统计启用的角色；开启角色层级时还包含祖先角色的权限。
    pub async fn user_permissions(&self, user_id: &str, tenant_id: &str) -> AppResult<Vec<Permission>> {
        if let Some(cache) = self.external_cache() {
            match cache.get_user_permissions(user_id, tenant_id).await {
                Ok(Some(permissions)) => return Ok(permissions),
                Ok(None) => {}
                Err(e) => warn!(user_id, tenant_id, error = %e, "Failed to read user permissions from cache"),
            }
        }

        let roles = self.user_roles(user_id, tenant_id).await?;
        let role_ids = self.expand_roles(&roles).await;

        let mut seen = HashSet::new();
        let mut permissions = Vec::new();
        for role_id in role_ids {
            let role_permissions = match self.repo.get_role_permissions(&role_id).await {
                Ok(p) => p,
                Err(e) => {
                    warn!(role_id = %role_id, error = %e, "Failed to get role permissions");
                    continue;
                }
            };
            for permission in role_permissions {
                if seen.insert(permission.id) {
                    permissions.push(permission);
                }
            }
        }

        if let Some(cache) = self.external_cache()
            && let Err(e) = cache
                .set_user_permissions(user_id, tenant_id, &permissions, self.config.user_permissions_ttl())
                .await
        {
            warn!(user_id, tenant_id, error = %e, "Failed to cache user permissions");
        }
        Ok(permissions)
    }

    /// 启用的角色，按需追加其祖先
    async fn expand_roles(&self, roles: &[Role]) -> Vec<RoleId> {
        let mut visited = HashSet::new();
        let mut ordered = Vec::new();

        for role in roles.iter().filter(|r| r.is_active) {
            if !visited.insert(role.id) {
                continue;
            }
            ordered.push(role.id);

            if !self.config.enable_role_hierarchy {
                continue;
            }

            let mut parent = role.parent_id;
            for _ in 0..self.config.max_role_depth {
                let Some(parent_id) = parent else { break };
                if !visited.insert(parent_id) {
                    break;
                }
                match self.repo.get_role(&parent_id).await {
                    Ok(Some(ancestor)) if ancestor.is_active => {
                        ordered.push(ancestor.id);
                        parent = ancestor.parent_id;
                    }
                    Ok(_) => break,
                    Err(e) => {
                        warn!(role_id = %parent_id, error = %e, "Failed to load parent role");
                        break;
                    }
                }
            }
        }
        ordered
    }

    /// 有效权限
    ///
    /// 角色权限读取失败会返回错误；资源级与继承来源失败只记录日志并跳过。
    pub async fn effective_permissions(
        &self,
        user_id: &str,
        tenant_id: &str,
        resource_id: Option<&str>,
        resource_type: &str,
    ) -> AppResult<Vec<Permission>> {
        let mut permissions = self.user_permissions(user_id, tenant_id).await?;

        let Some(resource_id) = resource_id else {
            return Ok(permissions);
        };

        let role_ids: HashSet<String> = match self.user_roles(user_id, tenant_id).await {
            Ok(roles) => roles
                .into_iter()
                .filter(|r| r.is_active)
                .map(|r| r.id.to_string())
                .collect(),
            Err(e) => {
                warn!(user_id, tenant_id, error = %e, "Failed to get user roles for resource grants");
                HashSet::new()
            }
        };
        let subject = Subject {
            user_id,
            tenant_id,
            role_ids: &role_ids,
        };

        match self.resource_permissions(resource_id, resource_type, &subject).await {
            Ok(granted) => permissions.extend(granted),
            Err(e) => warn!(resource_id, resource_type, error = %e, "Failed to get resource specific permissions"),
        }

        if self.config.enable_inheritance {
            permissions.extend(self.inherited_permissions(resource_id, resource_type, &subject).await);
        }

        Ok(permissions)
    }

    /// 某个资源上对该主体有效的授权
    async fn resource_permissions(
        &self,
        resource_id: &str,
        resource_type: &str,
        subject: &Subject<'_>,
    ) -> AppResult<Vec<Permission>> {
        let grants = self
            .repo
            .get_resource_permissions(resource_id, resource_type)
            .await?;

        let mut permissions = Vec::new();
        for grant in grants.iter().filter(|g| subject.is_applicable(g)) {
            let permission = match &grant.permission {
                Some(p) => p.clone(),
                None => match self.repo.get_permission(&grant.permission_id).await {
                    Ok(Some(p)) => p,
                    Ok(None) => {
                        warn!(permission_id = %grant.permission_id, "Granted permission not found");
                        continue;
                    }
                    Err(e) => {
                        warn!(permission_id = %grant.permission_id, error = %e, "Failed to load permission");
                        continue;
                    }
                },
            };
            permissions.push(grant.apply_to(permission));
        }
        Ok(permissions)
    }

    /// 沿继承边向上收集父资源上的授权
    ///
    /// 遇到缺失或停用的边、读取失败、回到已访问过的资源，或达到最大深度时停止。
    async fn inherited_permissions(
        &self,
        resource_id: &str,
        resource_type: &str,
        subject: &Subject<'_>,
    ) -> Vec<Permission> {
        let mut permissions = Vec::new();
        let mut visited = HashSet::from([(resource_id.to_string(), resource_type.to_string())]);
        let mut current = (resource_id.to_string(), resource_type.to_string());

        for depth in 0..self.config.max_inheritance_depth {
            let edge = match self
                .repo
                .get_permission_inheritance(&current.0, &current.1)
                .await
            {
                Ok(Some(edge)) if edge.is_active => edge,
                Ok(_) => break,
                Err(e) => {
                    debug!(resource_id = %current.0, error = %e, "Inheritance lookup failed, stopping walk");
                    break;
                }
            };

            let parent = (edge.parent_id, edge.parent_type);
            if !visited.insert(parent.clone()) {
                warn!(
                    resource_id,
                    resource_type,
                    parent_id = %parent.0,
                    depth,
                    "Inheritance cycle detected"
                );
                break;
            }

            match self.resource_permissions(&parent.0, &parent.1, subject).await {
                Ok(granted) => permissions.extend(granted),
                Err(e) => {
                    warn!(parent_id = %parent.0, error = %e, "Failed to get inherited permissions");
                    break;
                }
            }
            current = parent;
        }
        permissions
    }
}

/// 检查请求的主体：用户本身和其持有的启用角色
struct Subject<'a> {
    user_id: &'a str,
    tenant_id: &'a str,
    role_ids: &'a HashSet<String>,
}

impl Subject<'_> {
    /// 用户组授权不会被解析
    fn is_applicable(&self, grant: &ResourcePermission) -> bool {
        if grant.tenant_id != self.tenant_id || grant.is_expired(Utc::now()) {
            return false;
        }
        match grant.subject_type {
            SubjectType::User => grant.subject_id == self.user_id,
            SubjectType::Role => self.role_ids.contains(&grant.subject_id),
            SubjectType::Group => false,
        }
    }
}
