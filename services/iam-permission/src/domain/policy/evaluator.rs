//! 策略评估器
//!
//! 每种策略类型注册一个评估器。RBAC 按规则顺序取第一条匹配规则；
//! ABAC 与 ACL 目前只是扩展点，总是拒绝。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cuba_errors::AppResult;
use serde::{Deserialize, Serialize};

use super::policy::{Policy, PolicyId, PolicyRule, PolicyType};
use crate::domain::Attributes;
use crate::domain::check::PermissionCheckRequest;
use crate::domain::role::Effect;

/// 策略评估请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyEvaluationRequest {
    pub user_id: String,
    pub tenant_id: String,
    pub resource: String,
    pub action: String,
    pub resource_id: Option<String>,
    #[serde(default)]
    pub context: Attributes,
    /// 为空时评估租户下所有启用的策略
    #[serde(default)]
    pub policy_ids: Vec<PolicyId>,
}

impl From<&PermissionCheckRequest> for PolicyEvaluationRequest {
    fn from(request: &PermissionCheckRequest) -> Self {
        Self {
            user_id: request.user_id.clone(),
            tenant_id: request.tenant_id.clone(),
            resource: request.resource.clone(),
            action: request.action.clone(),
            resource_id: request.resource_id.clone(),
            context: request.context.clone(),
            policy_ids: Vec::new(),
        }
    }
}

/// 策略评估结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyEvaluationResponse {
    pub allowed: bool,
    pub effect: Effect,
    #[serde(default)]
    pub matched_rules: Vec<PolicyRule>,
    #[serde(default)]
    pub failed_rules: Vec<PolicyRule>,
    #[serde(default)]
    pub evaluation_log: Vec<String>,
    /// 作出判定的策略
    pub policy: Option<Policy>,
}

impl PolicyEvaluationResponse {
    pub fn deny(log: impl Into<String>) -> Self {
        Self {
            allowed: false,
            effect: Effect::Deny,
            matched_rules: Vec::new(),
            failed_rules: Vec::new(),
            evaluation_log: vec![log.into()],
            policy: None,
        }
    }

    pub fn with_policy(mut self, policy: &Policy) -> Self {
        self.policy = Some(policy.clone());
        self
    }
}

/// 策略评估器
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    /// 负责的策略类型
    fn policy_type(&self) -> PolicyType;

    /// 评估单个策略
    async fn evaluate(
        &self,
        request: &PolicyEvaluationRequest,
        policy: &Policy,
    ) -> AppResult<PolicyEvaluationResponse>;
}

/// RBAC 评估器：第一条匹配的规则决定结果
#[derive(Debug, Default, Clone, Copy)]
pub struct RbacPolicyEvaluator;

#[async_trait]
impl PolicyEvaluator for RbacPolicyEvaluator {
    fn policy_type(&self) -> PolicyType {
        PolicyType::Rbac
    }

    async fn evaluate(
        &self,
        request: &PolicyEvaluationRequest,
        policy: &Policy,
    ) -> AppResult<PolicyEvaluationResponse> {
        let mut failed_rules = Vec::new();

        for rule in &policy.rules {
            if rule.matches(&request.resource, &request.action, &request.context) {
                return Ok(PolicyEvaluationResponse {
                    allowed: rule.effect.is_allow(),
                    effect: rule.effect,
                    matched_rules: vec![rule.clone()],
                    failed_rules,
                    evaluation_log: vec![format!("RBAC rule matched: {}", rule.id)],
                    policy: Some(policy.clone()),
                });
            }
            failed_rules.push(rule.clone());
        }

        let mut response = PolicyEvaluationResponse::deny("No RBAC rule matched").with_policy(policy);
        response.failed_rules = failed_rules;
        Ok(response)
    }
}

/// ABAC 评估器（未实现）
#[derive(Debug, Default, Clone, Copy)]
pub struct AbacPolicyEvaluator;

#[async_trait]
impl PolicyEvaluator for AbacPolicyEvaluator {
    fn policy_type(&self) -> PolicyType {
        PolicyType::Abac
    }

    async fn evaluate(
        &self,
        _request: &PolicyEvaluationRequest,
        policy: &Policy,
    ) -> AppResult<PolicyEvaluationResponse> {
        Ok(PolicyEvaluationResponse::deny("ABAC evaluation not implemented").with_policy(policy))
    }
}

/// ACL 评估器（未实现）
#[derive(Debug, Default, Clone, Copy)]
pub struct AclPolicyEvaluator;

#[async_trait]
impl PolicyEvaluator for AclPolicyEvaluator {
    fn policy_type(&self) -> PolicyType {
        PolicyType::Acl
    }

    async fn evaluate(
        &self,
        _request: &PolicyEvaluationRequest,
        policy: &Policy,
    ) -> AppResult<PolicyEvaluationResponse> {
        Ok(PolicyEvaluationResponse::deny("ACL evaluation not implemented").with_policy(policy))
    }
}

/// 评估器注册表，每种策略类型至多一个
#[derive(Clone, Default)]
pub struct PolicyEvaluatorRegistry {
    evaluators: HashMap<PolicyType, Arc<dyn PolicyEvaluator>>,
}

impl PolicyEvaluatorRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// 注册内置的 RBAC / ABAC / ACL 评估器
    pub fn with_defaults() -> Self {
        Self::empty()
            .with(Arc::new(RbacPolicyEvaluator))
            .with(Arc::new(AbacPolicyEvaluator))
            .with(Arc::new(AclPolicyEvaluator))
    }

    /// 注册评估器，同类型的旧评估器被替换
    pub fn with(mut self, evaluator: Arc<dyn PolicyEvaluator>) -> Self {
        self.register(evaluator);
        self
    }

    pub fn register(&mut self, evaluator: Arc<dyn PolicyEvaluator>) {
        self.evaluators.insert(evaluator.policy_type(), evaluator);
    }

    pub fn get(&self, policy_type: PolicyType) -> Option<&Arc<dyn PolicyEvaluator>> {
        self.evaluators.get(&policy_type)
    }

    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }
}

impl std::fmt::Debug for PolicyEvaluatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.evaluators.keys().map(|t| t.to_string()).collect();
        types.sort();
        f.debug_struct("PolicyEvaluatorRegistry")
            .field("types", &types)
            .finish()
    }
}
