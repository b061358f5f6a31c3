//! 权限审计日志

use chrono::{DateTime, Utc};
use cuba_common::Pagination;
use serde::{Deserialize, Serialize};

use super::check::{CheckMode, PermissionCheckRequest, PermissionCheckResponse};
use super::role::Effect;
use super::{Attributes, entity_id};

entity_id!(
    /// 审计日志 ID
    AuditLogId
);

/// 审计日志，写入后不可修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionAuditLog {
    pub id: AuditLogId,
    pub user_id: String,
    pub tenant_id: String,
    pub resource: String,
    pub action: String,
    pub resource_id: Option<String>,
    pub effect: Effect,
    pub allowed: bool,
    pub reason: String,
    #[serde(default)]
    pub context: Attributes,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn context_string(context: &Attributes, key: &str) -> Option<String> {
    context
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

impl PermissionAuditLog {
    /// 由一次检查构建审计记录
    ///
    /// 请求未指定检查模式时记录 `default_mode`。
    pub fn from_check(
        request: &PermissionCheckRequest,
        response: &PermissionCheckResponse,
        default_mode: CheckMode,
    ) -> Self {
        let mut context = request.context.clone();
        let mode = request.check_mode.unwrap_or(default_mode);
        context
            .entry("check_mode".to_string())
            .or_insert_with(|| serde_json::Value::String(mode.to_string()));

        Self {
            id: AuditLogId::new(),
            user_id: request.user_id.clone(),
            tenant_id: request.tenant_id.clone(),
            resource: request.resource.clone(),
            action: request.action.clone(),
            resource_id: request.resource_id.clone(),
            effect: response.effect,
            allowed: response.allowed,
            reason: response.reason.clone(),
            ip_address: context_string(&request.context, "ip_address"),
            user_agent: context_string(&request.context, "user_agent"),
            context,
            created_at: Utc::now(),
        }
    }
}

/// 审计日志查询条件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionAuditFilter {
    pub user_id: Option<String>,
    pub tenant_id: Option<String>,
    pub resource: Option<String>,
    pub action: Option<String>,
    pub effect: Option<Effect>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl PermissionAuditFilter {
    pub fn matches(&self, log: &PermissionAuditLog) -> bool {
        self.user_id.as_ref().is_none_or(|v| v == &log.user_id)
            && self.tenant_id.as_ref().is_none_or(|v| v == &log.tenant_id)
            && self.resource.as_ref().is_none_or(|v| v == &log.resource)
            && self.action.as_ref().is_none_or(|v| v == &log.action)
            && self.effect.is_none_or(|v| v == log.effect)
            && self.start_time.is_none_or(|t| log.created_at >= t)
            && self.end_time.is_none_or(|t| log.created_at <= t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_check_extracts_client_info() {
        let request = PermissionCheckRequest::new("u1", "t1", "doc", "read")
            .with_resource_id("doc-1")
            .with_context("ip_address", json!("10.0.0.1"))
            .with_context("user_agent", json!("curl/8.0"))
            .with_check_mode(CheckMode::Loose);
        let response = PermissionCheckResponse::default_deny();

        let log = PermissionAuditLog::from_check(&request, &response, CheckMode::Strict);
        assert_eq!(log.ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(log.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(log.resource_id.as_deref(), Some("doc-1"));
        assert_eq!(log.context["check_mode"], json!("loose"));
        assert!(!log.allowed);
    }

    #[test]
    fn test_default_check_mode_recorded_when_unset() {
        let request = PermissionCheckRequest::new("u1", "t1", "doc", "read");
        let log = PermissionAuditLog::from_check(&request, &PermissionCheckResponse::default_deny(), CheckMode::Loose);
        assert_eq!(log.context["check_mode"], json!("loose"));

        let request = request.with_check_mode(CheckMode::Strict);
        let log = PermissionAuditLog::from_check(&request, &PermissionCheckResponse::default_deny(), CheckMode::Loose);
        assert_eq!(log.context["check_mode"], json!("strict"));
    }

    #[test]
    fn test_non_string_client_info_is_ignored() {
        let request =
            PermissionCheckRequest::new("u1", "t1", "doc", "read").with_context("ip_address", json!(42));
        let log = PermissionAuditLog::from_check(&request, &PermissionCheckResponse::default_deny(), CheckMode::Strict);
        assert!(log.ip_address.is_none());
    }

    #[test]
    fn test_filter_matches() {
        let request = PermissionCheckRequest::new("u1", "t1", "doc", "read");
        let log = PermissionAuditLog::from_check(&request, &PermissionCheckResponse::default_deny(), CheckMode::Strict);

        let filter = PermissionAuditFilter {
            user_id: Some("u1".into()),
            effect: Some(Effect::Deny),
            ..Default::default()
        };
        assert!(filter.matches(&log));

        let filter = PermissionAuditFilter {
            tenant_id: Some("t2".into()),
            ..Default::default()
        };
        assert!(!filter.matches(&log));
    }
}
