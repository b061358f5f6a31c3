//! 权限决策服务
//!
//! 检查流程：参数校验 → 决策缓存 → 有效权限匹配 → 策略评估 → 默认拒绝。
//! 检查接口不返回错误，任何失败都转成带原因的拒绝响应。

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, warn};

use super::resolver::EffectivePermissionResolver;
use crate::config::PermissionServiceConfig;
use crate::domain::{
    PermissionAuditLog, PermissionCache, PermissionCheckRequest, PermissionCheckResponse,
    PermissionRepository, PolicyEvaluationRequest, PolicyEvaluatorRegistry,
};
use crate::infrastructure::{
    AuditLogger, CheckMetrics, CheckStatistics, CheckTimer, DecisionCache, DecisionSource,
};

pub struct DefaultPermissionService<R: ?Sized> {
    pub(super) repo: Arc<R>,
    pub(super) cache: Option<Arc<dyn PermissionCache>>,
    pub(super) config: Arc<PermissionServiceConfig>,
    pub(super) resolver: EffectivePermissionResolver<R>,
    pub(super) evaluators: PolicyEvaluatorRegistry,
    pub(super) decisions: DecisionCache,
    audit: Option<AuditLogger>,
}

impl<R> DefaultPermissionService<R>
where
    R: PermissionRepository + ?Sized + 'static,
{
    /// 创建服务
    ///
    /// 开启审计时会启动后台写入任务，需要在 tokio 运行时内调用。
    pub fn new(repo: Arc<R>, config: PermissionServiceConfig) -> Self {
        let config = Arc::new(config.normalize());
        let audit = config
            .enable_audit_log
            .then(|| AuditLogger::start(repo.clone(), config.audit_queue_capacity));

        Self {
            resolver: EffectivePermissionResolver::new(repo.clone(), None, config.clone()),
            repo,
            cache: None,
            config,
            evaluators: PolicyEvaluatorRegistry::with_defaults(),
            decisions: DecisionCache::new(),
            audit,
        }
    }

    /// 接入外部缓存
    pub fn with_cache(mut self, cache: Arc<dyn PermissionCache>) -> Self {
        self.resolver =
            EffectivePermissionResolver::new(self.repo.clone(), Some(cache.clone()), self.config.clone());
        self.cache = Some(cache);
        self
    }

    /// 替换策略评估器
    pub fn with_evaluators(mut self, evaluators: PolicyEvaluatorRegistry) -> Self {
        self.evaluators = evaluators;
        self
    }

    pub fn config(&self) -> &PermissionServiceConfig {
        &self.config
    }

    pub(super) fn external_cache(&self) -> Option<&Arc<dyn PermissionCache>> {
        self.cache.as_ref().filter(|_| self.config.cache_enabled)
    }

    /// 检查单个请求
    pub async fn check_permission(&self, request: &PermissionCheckRequest) -> PermissionCheckResponse {
        let timer = CheckTimer::start();
        let (response, source) = self.check_internal(request).await;

        self.decisions.record_decision(response.allowed);
        timer.finish(response.allowed, source);
        response
    }

    async fn check_internal(&self, request: &PermissionCheckRequest) -> (PermissionCheckResponse, DecisionSource) {
        if let Err(e) = request.validate() {
            return (
                PermissionCheckResponse::deny(format!("Invalid request: {}", e)),
                DecisionSource::Invalid,
            );
        }

        let cache_key = self.config.cache_enabled.then(|| request.cache_key());
        if let Some(key) = &cache_key
            && let Some(cached) = self.cached_decision(key).await
        {
            return (cached, DecisionSource::Cache);
        }

        let (response, source) = match self.decide(request).await {
            Ok(decision) => decision,
            Err(e) => {
                error!(
                    user_id = %request.user_id,
                    tenant_id = %request.tenant_id,
                    resource = %request.resource,
                    action = %request.action,
                    error = %e,
                    "Permission check failed"
                );
                self.decisions.record_resolution_error();
                return (
                    PermissionCheckResponse::deny(format!("Check failed: {}", e)),
                    DecisionSource::Error,
                );
            }
        };

        if let Some(key) = cache_key {
            self.store_decision(key, &response).await;
        }
        if self.should_audit(request, &response) {
            self.record_audit(request, &response);
        }
        (response, source)
    }

    /// 先查本地，再查外部缓存
    ///
    /// 外部命中不回填本地，条目寿命以外部缓存为准。
    async fn cached_decision(&self, key: &str) -> Option<PermissionCheckResponse> {
        if let Some(response) = self.decisions.get(key) {
            debug!(cache_key = %key, "Permission check cache hit");
            CheckMetrics::record_cache_hit("local");
            return Some(response);
        }

        if let Some(cache) = self.external_cache() {
            match cache.get_permission_check(key).await {
                Ok(Some(response)) => {
                    debug!(cache_key = %key, "Permission check external cache hit");
                    CheckMetrics::record_cache_hit("external");
                    return Some(response);
                }
                Ok(None) => {}
                Err(e) => warn!(cache_key = %key, error = %e, "Failed to read check result from cache"),
            }
        }

        debug!(cache_key = %key, "Permission check cache miss");
        CheckMetrics::record_cache_miss();
        None
    }

    async fn store_decision(&self, key: String, response: &PermissionCheckResponse) {
        let ttl = self.config.permission_check_ttl();
        if let Some(cache) = self.external_cache()
            && let Err(e) = cache.set_permission_check(&key, response, ttl).await
        {
            warn!(cache_key = %key, error = %e, "Failed to cache check result");
        }
        self.decisions.insert(key, response.clone(), ttl);
    }

    /// 首个资源与操作都匹配且条件成立的权限决定结果
    async fn decide(
        &self,
        request: &PermissionCheckRequest,
    ) -> cuba_errors::AppResult<(PermissionCheckResponse, DecisionSource)> {
        let permissions = self
            .resolver
            .effective_permissions(
                &request.user_id,
                &request.tenant_id,
                request.resource_id.as_deref(),
                &request.resource,
            )
            .await?;

        if let Some(permission) = permissions.into_iter().find(|p| {
            p.matches(&request.resource, &request.action) && p.conditions_hold(&request.context)
        }) {
            return Ok((
                PermissionCheckResponse::from_permission(permission),
                DecisionSource::Permission,
            ));
        }

        if self.config.enable_policy_engine {
            self.decisions.record_policy_evaluation();
            match self.evaluate_policy(&PolicyEvaluationRequest::from(request)).await {
                Ok(evaluation) if evaluation.allowed => {
                    return Ok((
                        PermissionCheckResponse::from_policy(evaluation.effect, evaluation.policy),
                        DecisionSource::Policy,
                    ));
                }
                Ok(_) => {}
                Err(e) => warn!(
                    user_id = %request.user_id,
                    tenant_id = %request.tenant_id,
                    error = %e,
                    "Policy evaluation failed"
                ),
            }
        }

        Ok((PermissionCheckResponse::default_deny(), DecisionSource::DefaultDeny))
    }

    fn should_audit(&self, request: &PermissionCheckRequest, response: &PermissionCheckResponse) -> bool {
        self.config.enable_audit_log
            && (self.config.audit_all_checks
                || (self.config.audit_failed_checks && !response.allowed)
                || self.config.is_sensitive(&request.resource))
    }

    fn record_audit(&self, request: &PermissionCheckRequest, response: &PermissionCheckResponse) {
        if let Some(audit) = &self.audit {
            audit.record(PermissionAuditLog::from_check(
                request,
                response,
                self.config.default_check_mode,
            ));
        }
    }

    /// 批量检查，结果顺序与请求顺序一致
    ///
    /// 多于一个请求且并发上限大于 1 时并发执行，同时在途的检查不超过上限。
    pub async fn check_permissions(&self, requests: &[PermissionCheckRequest]) -> Vec<PermissionCheckResponse> {
        if requests.is_empty() {
            return Vec::new();
        }

        let limit = self.config.max_concurrent_checks;
        if requests.len() > 1 && limit > 1 {
            return stream::iter(requests)
                .map(|request| self.check_permission(request))
                .buffered(limit)
                .collect()
                .await;
        }

        let mut responses = Vec::with_capacity(requests.len());
        for request in requests {
            responses.push(self.check_permission(request).await);
        }
        responses
    }

    /// 检查统计快照
    pub fn statistics(&self) -> CheckStatistics {
        self.decisions.statistics()
    }

    pub fn reset_statistics(&self) {
        self.decisions.reset_statistics();
    }

    /// 清理本地决策缓存中的过期条目
    pub fn purge_expired(&self) -> usize {
        let purged = self.decisions.purge_expired();
        if purged > 0 {
            debug!(purged, "Purged expired permission decisions");
        }
        purged
    }

    /// 停止审计任务并写完剩余记录
    pub async fn shutdown(&self) {
        if let Some(audit) = &self.audit {
            audit.shutdown().await;
        }
    }
}
