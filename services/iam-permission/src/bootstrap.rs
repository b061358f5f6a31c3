//! 服务装配
//!
//! 读取配置、初始化日志，按配置接入 Redis 或本地缓存，组装出权限服务。

use std::sync::Arc;

use cuba_adapter_redis::{RedisCache, create_connection_manager};
use cuba_common::{RetryConfig, with_retry};
use cuba_config::AppConfig;
use cuba_errors::{AppError, AppResult};
use cuba_ports::CachePort;
use cuba_telemetry::{PrometheusHandle, init_metrics, init_tracing, init_tracing_json};
use secrecy::ExposeSecret;
use tracing::{info, warn};

use crate::application::DefaultPermissionService;
use crate::config::PermissionServiceConfig;
use crate::domain::{PermissionCache, PermissionRepository};
use crate::infrastructure::{DistributedPermissionCache, InMemoryPermissionRepository, MemoryCache};

/// 本地缓存的最大条目数
const LOCAL_CACHE_CAPACITY: u64 = 100_000;

/// 装配完成的服务类型
pub type PermissionService = DefaultPermissionService<dyn PermissionRepository>;

/// 初始化 tracing，`telemetry.json` 打开时输出 JSON
pub fn init_telemetry(config: &AppConfig) {
    if config.telemetry.json {
        init_tracing_json(&config.telemetry.log_level);
    } else {
        init_tracing(&config.telemetry.log_level);
    }

    info!(
        app_name = %config.app_name,
        app_env = %config.app_env,
        "Telemetry initialized"
    );
}

/// 选择外部缓存后端
///
/// 缓存关闭时返回 `None`。配置了 Redis 但连接失败时退回本地缓存，不阻止启动。
pub async fn connect_cache(
    app: &AppConfig,
    config: &PermissionServiceConfig,
) -> Option<Arc<dyn PermissionCache>> {
    if !config.cache_enabled {
        info!("Permission cache disabled");
        return None;
    }

    let backend: Arc<dyn CachePort> = match &app.redis {
        Some(redis) => {
            let url = redis.url.expose_secret().clone();
            let connected = with_retry(&RetryConfig::default(), "Redis connection", || {
                let url = url.clone();
                async move { create_connection_manager(&url).await }
            })
            .await;

            match connected {
                Ok(conn) => {
                    info!("Using Redis permission cache");
                    Arc::new(RedisCache::new(conn))
                }
                Err(e) => {
                    warn!(error = %e, "Redis unavailable, falling back to local permission cache");
                    Arc::new(MemoryCache::new(LOCAL_CACHE_CAPACITY))
                }
            }
        }
        None => {
            info!("Redis not configured, using local permission cache");
            Arc::new(MemoryCache::new(LOCAL_CACHE_CAPACITY))
        }
    };

    Some(Arc::new(DistributedPermissionCache::new(backend)))
}

/// 用给定的仓储组装服务
pub async fn build_service(
    app: &AppConfig,
    config: PermissionServiceConfig,
    repo: Arc<dyn PermissionRepository>,
) -> PermissionService {
    let cache = connect_cache(app, &config).await;
    let service = DefaultPermissionService::new(repo, config);

    let service = match cache {
        Some(cache) => service.with_cache(cache),
        None => service,
    };

    let config = service.config();
    info!(
        cache_enabled = config.cache_enabled,
        enable_inheritance = config.enable_inheritance,
        enable_policy_engine = config.enable_policy_engine,
        enable_audit_log = config.enable_audit_log,
        max_concurrent_checks = config.max_concurrent_checks,
        "Permission service initialized"
    );
    service
}

/// 启动结果
pub struct PermissionRuntime {
    pub service: PermissionService,
    /// 全局 recorder 已被安装过时为 `None`
    pub metrics: Option<PrometheusHandle>,
}

/// 从配置目录启动一个使用内存仓储的服务
pub async fn bootstrap(config_dir: &str) -> AppResult<PermissionRuntime> {
    let app = AppConfig::load(config_dir).map_err(|e| AppError::internal(e.to_string()))?;
    init_telemetry(&app);

    let metrics = match init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Prometheus recorder not installed");
            None
        }
    };

    let config = PermissionServiceConfig::load(config_dir).map_err(|e| AppError::internal(e.to_string()))?;
    let repo: Arc<dyn PermissionRepository> = Arc::new(InMemoryPermissionRepository::new());
    let service = build_service(&app, config, repo).await;
    Ok(PermissionRuntime { service, metrics })
}
