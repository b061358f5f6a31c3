//! 基于 `CachePort` 的分布式权限缓存
//!
//! 键统一以 `perm:` 开头，值为 JSON。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cuba_errors::{AppError, AppResult};
use cuba_ports::CachePort;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::{Permission, PermissionCache, PermissionCheckResponse, PermissionCheckRequest, Role};

const KEY_PREFIX: &str = "perm:";

pub struct DistributedPermissionCache {
    cache: Arc<dyn CachePort>,
}

impl DistributedPermissionCache {
    pub fn new(cache: Arc<dyn CachePort>) -> Self {
        Self { cache }
    }

    fn user_permissions_key(user_id: &str, tenant_id: &str) -> String {
        format!("{}user_permissions:{}:{}", KEY_PREFIX, user_id, tenant_id)
    }

    fn user_roles_key(user_id: &str, tenant_id: &str) -> String {
        format!("{}user_roles:{}:{}", KEY_PREFIX, user_id, tenant_id)
    }

    fn check_key(key: &str) -> String {
        format!("{}check_result:{}", KEY_PREFIX, key)
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        match self.cache.get(key).await? {
            Some(json) => {
                let value = serde_json::from_str(&json).map_err(|e| {
                    AppError::internal(format!("Failed to deserialize cache entry {}: {}", key, e))
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> AppResult<()> {
        let json = serde_json::to_string(value).map_err(|e| {
            AppError::internal(format!("Failed to serialize cache entry {}: {}", key, e))
        })?;
        self.cache.set(key, &json, Some(ttl)).await
    }
}

#[async_trait]
impl PermissionCache for DistributedPermissionCache {
    async fn set_user_permissions(
        &self,
        user_id: &str,
        tenant_id: &str,
        permissions: &[Permission],
        ttl: Duration,
    ) -> AppResult<()> {
        self.set_json(&Self::user_permissions_key(user_id, tenant_id), permissions, ttl)
            .await
    }

    async fn get_user_permissions(&self, user_id: &str, tenant_id: &str) -> AppResult<Option<Vec<Permission>>> {
        self.get_json(&Self::user_permissions_key(user_id, tenant_id)).await
    }

    async fn delete_user_permissions(&self, user_id: &str, tenant_id: &str) -> AppResult<()> {
        self.cache
            .delete(&Self::user_permissions_key(user_id, tenant_id))
            .await
    }

    async fn set_user_roles(&self, user_id: &str, tenant_id: &str, roles: &[Role], ttl: Duration) -> AppResult<()> {
        self.set_json(&Self::user_roles_key(user_id, tenant_id), roles, ttl)
            .await
    }

    async fn get_user_roles(&self, user_id: &str, tenant_id: &str) -> AppResult<Option<Vec<Role>>> {
        self.get_json(&Self::user_roles_key(user_id, tenant_id)).await
    }

    async fn delete_user_roles(&self, user_id: &str, tenant_id: &str) -> AppResult<()> {
        self.cache.delete(&Self::user_roles_key(user_id, tenant_id)).await
    }

    async fn set_permission_check(
        &self,
        key: &str,
        response: &PermissionCheckResponse,
        ttl: Duration,
    ) -> AppResult<()> {
        self.set_json(&Self::check_key(key), response, ttl).await
    }

    async fn get_permission_check(&self, key: &str) -> AppResult<Option<PermissionCheckResponse>> {
        self.get_json(&Self::check_key(key)).await
    }

    async fn delete_permission_check(&self, key: &str) -> AppResult<()> {
        self.cache.delete(&Self::check_key(key)).await
    }

    async fn clear(&self) -> AppResult<()> {
        let deleted = self.cache.delete_pattern(&format!("{}*", KEY_PREFIX)).await?;
        tracing::debug!(deleted, "Cleared distributed permission cache");
        Ok(())
    }

    async fn clear_user_cache(&self, user_id: &str, tenant_id: &str) -> AppResult<()> {
        self.delete_user_permissions(user_id, tenant_id).await?;
        self.delete_user_roles(user_id, tenant_id).await?;

        let pattern = format!(
            "{}*",
            Self::check_key(&PermissionCheckRequest::user_cache_prefix(user_id, tenant_id))
        );
        self.cache.delete_pattern(&pattern).await?;
        Ok(())
    }

    async fn health_check(&self) -> AppResult<()> {
        self.cache.ping().await
    }
}
