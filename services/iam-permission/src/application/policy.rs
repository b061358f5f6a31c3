//! 策略评估
//!
//! 只有当没有任何权限能决定请求时才会走到这里。按枚举顺序取第一个有评估器的策略，
//! 由它给出结果，不合并多个策略。

use cuba_errors::AppResult;
use tracing::{debug, warn};

use super::service::DefaultPermissionService;
use crate::domain::{
    Policy, PolicyEvaluationRequest, PolicyEvaluationResponse, PolicyFilter, PermissionRepository,
};

impl<R> DefaultPermissionService<R>
where
    R: PermissionRepository + ?Sized + 'static,
{
    /// 评估策略
    ///
    /// 指定了 `policy_ids` 时只加载这些策略（读取失败或已停用的跳过），
    /// 否则加载租户下全部启用的策略。单个策略评估出错时记录日志并继续下一个。
    pub async fn evaluate_policy(&self, request: &PolicyEvaluationRequest) -> AppResult<PolicyEvaluationResponse> {
        let policies = self.load_policies(request).await?;

        for policy in &policies {
            let Some(evaluator) = self.evaluators.get(policy.policy_type) else {
                continue;
            };

            match evaluator.evaluate(request, policy).await {
                Ok(response) => {
                    debug!(
                        policy_id = %policy.id,
                        policy_type = %policy.policy_type,
                        allowed = response.allowed,
                        "Policy evaluated"
                    );
                    return Ok(response);
                }
                Err(e) => warn!(policy_id = %policy.id, error = %e, "Policy evaluation error, skipping"),
            }
        }

        Ok(PolicyEvaluationResponse::deny("No applicable policy found"))
    }

    async fn load_policies(&self, request: &PolicyEvaluationRequest) -> AppResult<Vec<Policy>> {
        if request.policy_ids.is_empty() {
            let filter = PolicyFilter::active_for_tenant(&request.tenant_id, self.config.policy_page_size);
            return Ok(self.repo.list_policies(&filter).await?.items);
        }

        let mut policies = Vec::with_capacity(request.policy_ids.len());
        for policy_id in &request.policy_ids {
            match self.repo.get_policy(policy_id).await {
                Ok(Some(policy)) if policy.is_active => policies.push(policy),
                Ok(Some(_)) => debug!(policy_id = %policy_id, "Skipping inactive policy"),
                Ok(None) => warn!(policy_id = %policy_id, "Policy not found"),
                Err(e) => warn!(policy_id = %policy_id, error = %e, "Failed to get policy"),
            }
        }
        Ok(policies)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use cuba_errors::AppError;

    use crate::config::PermissionServiceConfig;
    use crate::domain::{
        Effect, PermissionCheckRequest, PolicyEvaluator, PolicyEvaluatorRegistry, PolicyRule,
        PolicyType,
    };
    use crate::infrastructure::InMemoryPermissionRepository;

    use super::*;

    struct FailingEvaluator;

    #[async_trait]
    impl PolicyEvaluator for FailingEvaluator {
        fn policy_type(&self) -> PolicyType {
            PolicyType::Abac
        }

        async fn evaluate(&self, _: &PolicyEvaluationRequest, _: &Policy) -> AppResult<PolicyEvaluationResponse> {
            Err(AppError::internal("attribute source unavailable"))
        }
    }

    fn service(repo: Arc<InMemoryPermissionRepository>) -> DefaultPermissionService<InMemoryPermissionRepository> {
        let config = PermissionServiceConfig {
            enable_audit_log: false,
            ..Default::default()
        };
        DefaultPermissionService::new(repo, config)
    }

    fn request() -> PolicyEvaluationRequest {
        PolicyEvaluationRequest::from(&PermissionCheckRequest::new("u1", "t1", "report.q1", "export"))
    }

    fn allow_reports() -> Vec<PolicyRule> {
        vec![PolicyRule::new("reports", "report*", "export", Effect::Allow)]
    }

    #[tokio::test]
    async fn test_no_policies_denies() {
        let svc = service(Arc::new(InMemoryPermissionRepository::new()));
        let resp = svc.evaluate_policy(&request()).await.unwrap();
        assert!(!resp.allowed);
        assert_eq!(resp.evaluation_log, ["No applicable policy found"]);
    }

    #[tokio::test]
    async fn test_first_policy_with_evaluator_decides() {
        let repo = Arc::new(InMemoryPermissionRepository::new());
        // 优先级高的 ABAC 策略先被枚举，其评估器总是拒绝，RBAC 策略不会被看到
        let abac = Policy::new("t1", "abac", PolicyType::Abac, allow_reports()).with_priority(10);
        let rbac = Policy::new("t1", "rbac", PolicyType::Rbac, allow_reports());
        repo.create_policy(&abac).await.unwrap();
        repo.create_policy(&rbac).await.unwrap();

        let svc = service(repo);
        let resp = svc.evaluate_policy(&request()).await.unwrap();
        assert!(!resp.allowed);
        assert_eq!(resp.policy.map(|p| p.id), Some(abac.id));
    }

    #[tokio::test]
    async fn test_unregistered_type_is_skipped() {
        let repo = Arc::new(InMemoryPermissionRepository::new());
        let abac = Policy::new("t1", "abac", PolicyType::Abac, allow_reports()).with_priority(10);
        let rbac = Policy::new("t1", "rbac", PolicyType::Rbac, allow_reports());
        repo.create_policy(&abac).await.unwrap();
        repo.create_policy(&rbac).await.unwrap();

        let registry = PolicyEvaluatorRegistry::empty().with(Arc::new(crate::domain::policy::RbacPolicyEvaluator));
        let svc = service(repo).with_evaluators(registry);
        let resp = svc.evaluate_policy(&request()).await.unwrap();
        assert!(resp.allowed);
        assert_eq!(resp.matched_rules[0].id, "reports");
    }

    #[tokio::test]
    async fn test_evaluator_error_skips_to_next_policy() {
        let repo = Arc::new(InMemoryPermissionRepository::new());
        let abac = Policy::new("t1", "abac", PolicyType::Abac, allow_reports()).with_priority(10);
        let rbac = Policy::new("t1", "rbac", PolicyType::Rbac, allow_reports());
        repo.create_policy(&abac).await.unwrap();
        repo.create_policy(&rbac).await.unwrap();

        let registry = PolicyEvaluatorRegistry::with_defaults().with(Arc::new(FailingEvaluator));
        let svc = service(repo).with_evaluators(registry);
        let resp = svc.evaluate_policy(&request()).await.unwrap();
        assert!(resp.allowed);
        assert_eq!(resp.policy.map(|p| p.id), Some(rbac.id));
    }

    #[tokio::test]
    async fn test_explicit_ids_skip_inactive_and_missing() {
        let repo = Arc::new(InMemoryPermissionRepository::new());
        let inactive = Policy::new("t1", "off", PolicyType::Rbac, allow_reports()).inactive();
        let active = Policy::new("t1", "on", PolicyType::Rbac, vec![
            PolicyRule::new("deny", "*", "*", Effect::Deny),
        ]);
        repo.create_policy(&inactive).await.unwrap();
        repo.create_policy(&active).await.unwrap();

        let svc = service(repo);
        let mut req = request();
        req.policy_ids = vec![crate::domain::PolicyId::new(), inactive.id, active.id];
        let resp = svc.evaluate_policy(&req).await.unwrap();
        assert!(!resp.allowed);
        assert_eq!(resp.policy.map(|p| p.name), Some("on".to_string()));
    }

    #[tokio::test]
    async fn test_check_falls_back_to_policy() {
        let repo = Arc::new(InMemoryPermissionRepository::new());
        repo.create_policy(&Policy::new("t1", "rbac", PolicyType::Rbac, allow_reports()))
            .await
            .unwrap();
        let svc = service(repo);

        let resp = svc
            .check_permission(&PermissionCheckRequest::new("u1", "t1", "report.q1", "export"))
            .await;
        assert!(resp.allowed);
        assert_eq!(resp.reason, "Policy evaluation allowed");
        assert_eq!(resp.policies.len(), 1);

        let config = PermissionServiceConfig {
            enable_policy_engine: false,
            enable_audit_log: false,
            ..Default::default()
        };
        let repo = Arc::new(InMemoryPermissionRepository::new());
        repo.create_policy(&Policy::new("t1", "rbac", PolicyType::Rbac, allow_reports()))
            .await
            .unwrap();
        let svc = DefaultPermissionService::new(repo, config);
        let resp = svc
            .check_permission(&PermissionCheckRequest::new("u1", "t1", "report.q1", "export"))
            .await;
        assert!(!resp.allowed);
    }
}
