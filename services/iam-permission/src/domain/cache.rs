//! 外部缓存契约
//!
//! 生产部署由分布式缓存实现，读取失败或未命中时调用方回落到仓储。

use std::time::Duration;

use async_trait::async_trait;
use cuba_errors::AppResult;

use super::check::PermissionCheckResponse;
use super::role::{Permission, Role};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PermissionCache: Send + Sync {
    // 用户权限
    async fn set_user_permissions(
        &self,
        user_id: &str,
        tenant_id: &str,
        permissions: &[Permission],
        ttl: Duration,
    ) -> AppResult<()>;
    async fn get_user_permissions(&self, user_id: &str, tenant_id: &str) -> AppResult<Option<Vec<Permission>>>;
    async fn delete_user_permissions(&self, user_id: &str, tenant_id: &str) -> AppResult<()>;

    // 用户角色
    async fn set_user_roles(&self, user_id: &str, tenant_id: &str, roles: &[Role], ttl: Duration) -> AppResult<()>;
    async fn get_user_roles(&self, user_id: &str, tenant_id: &str) -> AppResult<Option<Vec<Role>>>;
    async fn delete_user_roles(&self, user_id: &str, tenant_id: &str) -> AppResult<()>;

    // 检查结果
    async fn set_permission_check(
        &self,
        key: &str,
        response: &PermissionCheckResponse,
        ttl: Duration,
    ) -> AppResult<()>;
    async fn get_permission_check(&self, key: &str) -> AppResult<Option<PermissionCheckResponse>>;
    async fn delete_permission_check(&self, key: &str) -> AppResult<()>;

    /// 清除全部权限缓存
    async fn clear(&self) -> AppResult<()>;

    /// 清除某个用户在某个租户下的全部缓存
    async fn clear_user_cache(&self, user_id: &str, tenant_id: &str) -> AppResult<()>;

    async fn health_check(&self) -> AppResult<()>;
}
