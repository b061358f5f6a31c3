//! 策略实体

use cuba_common::AuditInfo;
use serde::{Deserialize, Serialize};

use crate::domain::matcher::{evaluate_conditions, matches_action, matches_resource};
use crate::domain::role::Effect;
use crate::domain::{Attributes, entity_id};

entity_id!(
    /// 策略 ID
    PolicyId
);

/// 策略类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyType {
    Rbac,
    Abac,
    Acl,
}

impl std::fmt::Display for PolicyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyType::Rbac => write!(f, "rbac"),
            PolicyType::Abac => write!(f, "abac"),
            PolicyType::Acl => write!(f, "acl"),
        }
    }
}

impl std::str::FromStr for PolicyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rbac" => Ok(PolicyType::Rbac),
            "abac" => Ok(PolicyType::Abac),
            "acl" => Ok(PolicyType::Acl),
            _ => Err(format!("Unknown policy type: {}", s)),
        }
    }
}

/// 策略规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    pub resource: String,
    pub action: String,
    pub effect: Effect,
    #[serde(default)]
    pub conditions: Attributes,
}

impl PolicyRule {
    pub fn new(
        id: impl Into<String>,
        resource: impl Into<String>,
        action: impl Into<String>,
        effect: Effect,
    ) -> Self {
        Self {
            id: id.into(),
            resource: resource.into(),
            action: action.into(),
            effect,
            conditions: Attributes::new(),
        }
    }

    pub fn with_condition(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.conditions.insert(key.into(), value);
        self
    }

    /// 资源、操作和条件是否全部匹配
    pub fn matches(&self, resource: &str, action: &str, context: &Attributes) -> bool {
        matches_resource(&self.resource, resource)
            && matches_action(&self.action, action)
            && evaluate_conditions(&self.conditions, context)
    }
}

/// 策略实体
///
/// 仅在没有任何权限能决定请求时才参与评估。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: PolicyId,
    pub tenant_id: String,
    pub name: String,
    pub description: Option<String>,
    pub policy_type: PolicyType,
    pub rules: Vec<PolicyRule>,
    pub effect: Effect,
    /// 数字越大优先级越高
    pub priority: i32,
    pub is_active: bool,
    #[serde(default)]
    pub metadata: Attributes,
    pub audit_info: AuditInfo,
}

impl Policy {
    pub fn new(
        tenant_id: impl Into<String>,
        name: impl Into<String>,
        policy_type: PolicyType,
        rules: Vec<PolicyRule>,
    ) -> Self {
        Self {
            id: PolicyId::new(),
            tenant_id: tenant_id.into(),
            name: name.into(),
            description: None,
            policy_type,
            rules,
            effect: Effect::Allow,
            priority: 0,
            is_active: true,
            metadata: Attributes::new(),
            audit_info: AuditInfo::default(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}
