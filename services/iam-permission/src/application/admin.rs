//! 管理接口
//!
//! 角色、权限、授权、继承边与策略的增删改查。所有会改变决策结果的写操作都会失效相关缓存：
//! 只影响单个用户的操作按用户前缀失效，其余操作清空全部决策缓存。

use cuba_common::PagedResult;
use cuba_errors::AppResult;
use cuba_telemetry::HealthStatus;
use tracing::{info, warn};

use super::commands::{
    CreatePermissionCommand, CreatePolicyCommand, CreateRoleCommand, GrantResourcePermissionCommand,
    SetInheritanceCommand, UpdatePermissionCommand, UpdatePolicyCommand, UpdateRoleCommand,
};
use super::service::DefaultPermissionService;
use crate::domain::{
    Permission, PermissionAuditFilter, PermissionAuditLog, PermissionCheckRequest, PermissionFilter,
    PermissionId, PermissionInheritance, PermissionRepository, Policy, PolicyFilter, PolicyId,
    ResourceGrantKey, ResourcePermission, Role, RoleFilter, RoleId,
};
use crate::error::PermissionError;

impl<R> DefaultPermissionService<R>
where
    R: PermissionRepository + ?Sized + 'static,
{
    // ---------------------------------------------------------------- 角色

    /// 创建角色，并分配命令中列出的初始权限
    ///
    /// 同租户下名称重复时返回冲突。初始权限分配失败只记录日志。
    pub async fn create_role(&self, cmd: CreateRoleCommand) -> AppResult<Role> {
        cmd.validate().map_err(PermissionError::InvalidRequest)?;

        if self.repo.get_role_by_name(&cmd.name, &cmd.tenant_id).await?.is_some() {
            return Err(PermissionError::RoleAlreadyExists(cmd.name).into());
        }

        let permission_ids = cmd.permissions.clone();
        let role = cmd.into_role();
        self.repo.create_role(&role).await?;

        for permission_id in &permission_ids {
            if let Err(e) = self.repo.assign_permission_to_role(&role.id, permission_id).await {
                warn!(role_id = %role.id, permission_id = %permission_id, error = %e, "Failed to assign initial permission");
            }
        }

        info!(role_id = %role.id, tenant_id = %role.tenant_id, code = %role.code, "Role created");
        self.invalidate_shared_cache().await;
        self.get_role(&role.id).await
    }

    /// 读取角色及其权限
    pub async fn get_role(&self, id: &RoleId) -> AppResult<Role> {
        let mut role = self
            .repo
            .get_role(id)
            .await?
            .ok_or(PermissionError::RoleNotFound)?;

        match self.repo.get_role_permissions(id).await {
            Ok(permissions) => role.permissions = permissions,
            Err(e) => warn!(role_id = %id, error = %e, "Failed to load role permissions"),
        }
        Ok(role)
    }

    pub async fn get_role_by_name(&self, name: &str, tenant_id: &str) -> AppResult<Role> {
        self.repo
            .get_role_by_name(name, tenant_id)
            .await?
            .ok_or_else(|| PermissionError::RoleNotFound.into())
    }

    pub async fn update_role(&self, id: &RoleId, cmd: UpdateRoleCommand) -> AppResult<Role> {
        cmd.validate().map_err(PermissionError::InvalidRequest)?;

        let mut role = self.repo.get_role(id).await?.ok_or(PermissionError::RoleNotFound)?;
        cmd.apply_to(&mut role);
        self.repo.update_role(&role).await?;

        info!(role_id = %id, "Role updated");
        self.invalidate_shared_cache().await;
        Ok(role)
    }

    /// 删除角色，系统角色直接拒绝
    pub async fn delete_role(&self, id: &RoleId) -> AppResult<()> {
        let role = self.repo.get_role(id).await?.ok_or(PermissionError::RoleNotFound)?;
        if role.is_system {
            return Err(PermissionError::SystemRoleProtected.into());
        }

        self.repo.delete_role(id).await?;
        info!(role_id = %id, tenant_id = %role.tenant_id, "Role deleted");
        self.invalidate_shared_cache().await;
        Ok(())
    }

    pub async fn list_roles(&self, filter: &RoleFilter) -> AppResult<PagedResult<Role>> {
        self.repo.list_roles(filter).await
    }

    // ---------------------------------------------------------------- 权限

    pub async fn create_permission(&self, cmd: CreatePermissionCommand) -> AppResult<Permission> {
        cmd.validate().map_err(PermissionError::InvalidRequest)?;

        let permission = cmd.into_permission();
        self.repo.create_permission(&permission).await?;
        info!(permission_id = %permission.id, code = %permission.code, "Permission created");
        Ok(permission)
    }

    pub async fn get_permission(&self, id: &PermissionId) -> AppResult<Permission> {
        self.repo
            .get_permission(id)
            .await?
            .ok_or_else(|| PermissionError::PermissionNotFound.into())
    }

    pub async fn update_permission(&self, id: &PermissionId, cmd: UpdatePermissionCommand) -> AppResult<Permission> {
        let mut permission = self
            .repo
            .get_permission(id)
            .await?
            .ok_or(PermissionError::PermissionNotFound)?;
        cmd.apply_to(&mut permission);
        self.repo.update_permission(&permission).await?;

        info!(permission_id = %id, "Permission updated");
        self.invalidate_shared_cache().await;
        Ok(permission)
    }

    pub async fn delete_permission(&self, id: &PermissionId) -> AppResult<()> {
        self.repo.delete_permission(id).await?;
        info!(permission_id = %id, "Permission deleted");
        self.invalidate_shared_cache().await;
        Ok(())
    }

    pub async fn list_permissions(&self, filter: &PermissionFilter) -> AppResult<PagedResult<Permission>> {
        self.repo.list_permissions(filter).await
    }

    // ---------------------------------------------------------------- 角色与权限

    pub async fn assign_permission_to_role(&self, role_id: &RoleId, permission_id: &PermissionId) -> AppResult<()> {
        self.repo.assign_permission_to_role(role_id, permission_id).await?;
        info!(role_id = %role_id, permission_id = %permission_id, "Permission assigned to role");
        self.invalidate_shared_cache().await;
        Ok(())
    }

    pub async fn revoke_permission_from_role(&self, role_id: &RoleId, permission_id: &PermissionId) -> AppResult<()> {
        self.repo.revoke_permission_from_role(role_id, permission_id).await?;
        info!(role_id = %role_id, permission_id = %permission_id, "Permission revoked from role");
        self.invalidate_shared_cache().await;
        Ok(())
    }

    pub async fn get_role_permissions(&self, role_id: &RoleId) -> AppResult<Vec<Permission>> {
        self.repo.get_role_permissions(role_id).await
    }

    // ---------------------------------------------------------------- 用户与角色

    pub async fn assign_role_to_user(&self, user_id: &str, role_id: &RoleId, tenant_id: &str) -> AppResult<()> {
        self.repo.assign_role_to_user(user_id, role_id, tenant_id).await?;
        info!(user_id, tenant_id, role_id = %role_id, "Role assigned to user");
        self.invalidate_user_cache(user_id, tenant_id).await;
        Ok(())
    }

    pub async fn revoke_role_from_user(&self, user_id: &str, role_id: &RoleId, tenant_id: &str) -> AppResult<()> {
        self.repo.revoke_role_from_user(user_id, role_id, tenant_id).await?;
        info!(user_id, tenant_id, role_id = %role_id, "Role revoked from user");
        self.invalidate_user_cache(user_id, tenant_id).await;
        Ok(())
    }

    pub async fn get_user_roles(&self, user_id: &str, tenant_id: &str) -> AppResult<Vec<Role>> {
        self.resolver.user_roles(user_id, tenant_id).await
    }

    /// 用户通过角色获得的权限（不含资源级授权）
    pub async fn get_user_permissions(&self, user_id: &str, tenant_id: &str) -> AppResult<Vec<Permission>> {
        self.resolver.user_permissions(user_id, tenant_id).await
    }

    // ---------------------------------------------------------------- 资源授权

    pub async fn grant_resource_permission(&self, cmd: GrantResourcePermissionCommand) -> AppResult<ResourcePermission> {
        cmd.validate().map_err(PermissionError::InvalidRequest)?;

        if self.repo.get_permission(&cmd.permission_id).await?.is_none() {
            return Err(PermissionError::PermissionNotFound.into());
        }

        let grant = cmd.into_grant();
        self.repo.create_resource_permission(&grant).await?;
        info!(
            resource_id = %grant.resource_id,
            resource_type = %grant.resource_type,
            subject_id = %grant.subject_id,
            permission_id = %grant.permission_id,
            "Resource permission granted"
        );
        self.invalidate_shared_cache().await;
        Ok(grant)
    }

    pub async fn revoke_resource_permission(&self, key: &ResourceGrantKey) -> AppResult<()> {
        self.repo.delete_resource_permission(key).await?;
        info!(
            resource_id = %key.resource_id,
            resource_type = %key.resource_type,
            subject_id = %key.subject_id,
            "Resource permission revoked"
        );
        self.invalidate_shared_cache().await;
        Ok(())
    }

    pub async fn get_resource_permissions(&self, resource_id: &str, resource_type: &str) -> AppResult<Vec<ResourcePermission>> {
        self.repo.get_resource_permissions(resource_id, resource_type).await
    }

    // ---------------------------------------------------------------- 继承

    /// 设置资源的父资源，已存在的继承边被覆盖
    pub async fn set_permission_inheritance(&self, cmd: SetInheritanceCommand) -> AppResult<PermissionInheritance> {
        cmd.validate().map_err(PermissionError::InvalidRequest)?;

        let mut inheritance = cmd.into_inheritance();
        match self
            .repo
            .get_permission_inheritance(&inheritance.resource_id, &inheritance.resource_type)
            .await?
        {
            Some(existing) => {
                inheritance.id = existing.id;
                inheritance.created_at = existing.created_at;
                self.repo.update_permission_inheritance(&inheritance).await?;
            }
            None => self.repo.create_permission_inheritance(&inheritance).await?,
        }

        info!(
            resource_id = %inheritance.resource_id,
            resource_type = %inheritance.resource_type,
            parent_id = %inheritance.parent_id,
            parent_type = %inheritance.parent_type,
            "Permission inheritance set"
        );
        self.invalidate_shared_cache().await;
        Ok(inheritance)
    }

    pub async fn get_permission_inheritance(
        &self,
        resource_id: &str,
        resource_type: &str,
    ) -> AppResult<Option<PermissionInheritance>> {
        self.repo.get_permission_inheritance(resource_id, resource_type).await
    }

    // ---------------------------------------------------------------- 策略

    pub async fn create_policy(&self, cmd: CreatePolicyCommand) -> AppResult<Policy> {
        cmd.validate().map_err(PermissionError::InvalidRequest)?;

        let policy = cmd.into_policy();
        self.repo.create_policy(&policy).await?;
        info!(policy_id = %policy.id, policy_type = %policy.policy_type, "Policy created");
        self.invalidate_shared_cache().await;
        Ok(policy)
    }

    pub async fn get_policy(&self, id: &PolicyId) -> AppResult<Policy> {
        self.repo
            .get_policy(id)
            .await?
            .ok_or_else(|| PermissionError::PolicyNotFound.into())
    }

    pub async fn update_policy(&self, id: &PolicyId, cmd: UpdatePolicyCommand) -> AppResult<Policy> {
        cmd.validate().map_err(PermissionError::InvalidRequest)?;

        let mut policy = self.repo.get_policy(id).await?.ok_or(PermissionError::PolicyNotFound)?;
        cmd.apply_to(&mut policy);
        self.repo.update_policy(&policy).await?;

        info!(policy_id = %id, "Policy updated");
        self.invalidate_shared_cache().await;
        Ok(policy)
    }

    pub async fn delete_policy(&self, id: &PolicyId) -> AppResult<()> {
        self.repo.delete_policy(id).await?;
        info!(policy_id = %id, "Policy deleted");
        self.invalidate_shared_cache().await;
        Ok(())
    }

    pub async fn list_policies(&self, filter: &PolicyFilter) -> AppResult<PagedResult<Policy>> {
        self.repo.list_policies(filter).await
    }

    // ---------------------------------------------------------------- 缓存

    /// 失效单个用户在租户下的所有缓存
    pub async fn invalidate_cache(&self, user_id: &str, tenant_id: &str) -> AppResult<()> {
        let removed = self
            .decisions
            .invalidate_prefix(&PermissionCheckRequest::user_cache_prefix(user_id, tenant_id));
        info!(user_id, tenant_id, removed, "User permission cache invalidated");

        if let Some(cache) = self.external_cache() {
            cache.clear_user_cache(user_id, tenant_id).await?;
        }
        Ok(())
    }

    /// 清空所有缓存
    pub async fn invalidate_all_cache(&self) -> AppResult<()> {
        self.decisions.clear();
        info!("All permission caches invalidated");

        if let Some(cache) = self.external_cache() {
            cache.clear().await?;
        }
        Ok(())
    }

    /// 用户角色变更之后的失效，外部缓存失败只记录日志
    async fn invalidate_user_cache(&self, user_id: &str, tenant_id: &str) {
        if let Err(e) = self.invalidate_cache(user_id, tenant_id).await {
            warn!(user_id, tenant_id, error = %e, "Failed to invalidate user permission cache");
        }
    }

    /// 写操作之后的失效，外部缓存失败只记录日志
    async fn invalidate_shared_cache(&self) {
        if let Err(e) = self.invalidate_all_cache().await {
            warn!(error = %e, "Failed to invalidate permission cache");
        }
    }

    // ---------------------------------------------------------------- 审计与健康检查

    pub async fn get_permission_audit_log(
        &self,
        filter: &PermissionAuditFilter,
    ) -> AppResult<PagedResult<PermissionAuditLog>> {
        self.repo.get_permission_audit_logs(filter).await
    }

    pub async fn health_check(&self) -> HealthStatus {
        let mut status = HealthStatus::new();

        match self.repo.health_check().await {
            Ok(()) => status.add_check("database", true, None),
            Err(e) => status.add_check("database", false, Some(e.to_string())),
        }

        if let Some(cache) = &self.cache {
            match cache.health_check().await {
                Ok(()) => status.add_check("cache", true, None),
                Err(e) => status.add_check("cache", false, Some(e.to_string())),
            }
        }
        status
    }
}
