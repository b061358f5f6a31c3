//! 服务配置

use std::time::Duration;

use cuba_config::{ConfigError, load_section};
use serde::{Deserialize, Serialize};

use crate::domain::CheckMode;

const DEFAULT_CHECK_TTL_SECS: u64 = 300;
const DEFAULT_USER_CACHE_TTL_SECS: u64 = 1800;
const DEFAULT_MAX_DEPTH: u32 = 10;
const DEFAULT_MAX_CONCURRENT_CHECKS: usize = 10;
const DEFAULT_AUDIT_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_POLICY_PAGE_SIZE: u32 = 1000;

/// 权限服务配置
///
/// 所有字段都有默认值，配置文件中的 `[permission]` 段只需写需要覆盖的项。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionServiceConfig {
    pub cache_enabled: bool,
    pub permission_check_ttl_secs: u64,
    pub user_permissions_ttl_secs: u64,
    pub user_roles_ttl_secs: u64,
    pub default_check_mode: CheckMode,

    pub enable_inheritance: bool,
    pub enable_policy_engine: bool,
    pub max_inheritance_depth: u32,
    pub max_concurrent_checks: usize,

    pub enable_audit_log: bool,
    pub audit_all_checks: bool,
    pub audit_failed_checks: bool,
    /// 这些资源上的检查总是写审计
    pub sensitive_resources: Vec<String>,
    pub audit_queue_capacity: usize,

    pub enable_role_hierarchy: bool,
    pub max_role_depth: u32,
    pub policy_page_size: u32,
}

impl Default for PermissionServiceConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            permission_check_ttl_secs: DEFAULT_CHECK_TTL_SECS,
            user_permissions_ttl_secs: DEFAULT_USER_CACHE_TTL_SECS,
            user_roles_ttl_secs: DEFAULT_USER_CACHE_TTL_SECS,
            default_check_mode: CheckMode::Strict,
            enable_inheritance: true,
            enable_policy_engine: true,
            max_inheritance_depth: DEFAULT_MAX_DEPTH,
            max_concurrent_checks: DEFAULT_MAX_CONCURRENT_CHECKS,
            enable_audit_log: true,
            audit_all_checks: false,
            audit_failed_checks: true,
            sensitive_resources: Vec::new(),
            audit_queue_capacity: DEFAULT_AUDIT_QUEUE_CAPACITY,
            enable_role_hierarchy: false,
            max_role_depth: DEFAULT_MAX_DEPTH,
            policy_page_size: DEFAULT_POLICY_PAGE_SIZE,
        }
    }
}

impl PermissionServiceConfig {
    /// 从配置目录加载 `[permission]` 段
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        Ok(load_section::<Self>(config_dir, "permission")?.normalize())
    }

    /// 零值回落为默认值
    pub fn normalize(mut self) -> Self {
        fn or_default<T: PartialEq + Default>(value: &mut T, default: T) {
            if *value == T::default() {
                *value = default;
            }
        }

        or_default(&mut self.permission_check_ttl_secs, DEFAULT_CHECK_TTL_SECS);
        or_default(&mut self.user_permissions_ttl_secs, DEFAULT_USER_CACHE_TTL_SECS);
        or_default(&mut self.user_roles_ttl_secs, DEFAULT_USER_CACHE_TTL_SECS);
        or_default(&mut self.max_inheritance_depth, DEFAULT_MAX_DEPTH);
        or_default(&mut self.max_role_depth, DEFAULT_MAX_DEPTH);
        or_default(&mut self.max_concurrent_checks, DEFAULT_MAX_CONCURRENT_CHECKS);
        or_default(&mut self.audit_queue_capacity, DEFAULT_AUDIT_QUEUE_CAPACITY);
        or_default(&mut self.policy_page_size, DEFAULT_POLICY_PAGE_SIZE);
        self
    }

    pub fn permission_check_ttl(&self) -> Duration {
        Duration::from_secs(self.permission_check_ttl_secs)
    }

    pub fn user_permissions_ttl(&self) -> Duration {
        Duration::from_secs(self.user_permissions_ttl_secs)
    }

    pub fn user_roles_ttl(&self) -> Duration {
        Duration::from_secs(self.user_roles_ttl_secs)
    }

    pub fn is_sensitive(&self, resource: &str) -> bool {
        self.sensitive_resources.iter().any(|r| r == resource)
    }
}
