use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use iam_permission::application::{
    CreatePermissionCommand, CreatePolicyCommand, CreateRoleCommand, GrantResourcePermissionCommand,
    SetInheritanceCommand,
};
use iam_permission::domain::{
    Effect, Permission, PermissionAuditFilter, PermissionCheckRequest, PermissionRepository,
    PolicyRule, PolicyType,
    Role, SubjectType,
};
use iam_permission::infrastructure::{DistributedPermissionCache, InMemoryPermissionRepository, MemoryCache};
use iam_permission::{DefaultPermissionService, PermissionServiceConfig};
use serde_json::json;

type Service = DefaultPermissionService<InMemoryPermissionRepository>;

fn config() -> PermissionServiceConfig {
    PermissionServiceConfig {
        enable_audit_log: false,
        ..Default::default()
    }
}

fn service_with(config: PermissionServiceConfig) -> (Arc<InMemoryPermissionRepository>, Service) {
    let repo = Arc::new(InMemoryPermissionRepository::new());
    (repo.clone(), DefaultPermissionService::new(repo, config))
}

/// 给用户建一个持有 `permissions` 的角色
async fn grant_role(service: &Service, user_id: &str, permissions: Vec<Permission>) -> Role {
    let mut cmd = CreateRoleCommand::new("t1", format!("role-{}", user_id), format!("Role {}", user_id));
    for permission in permissions {
        let created = service
            .create_permission(CreatePermissionCommand::new(
                "t1",
                permission.code,
                permission.resource,
                permission.action,
                permission.effect,
            ))
            .await
            .unwrap();
        cmd.permissions.push(created.id);
    }
    let role = service.create_role(cmd).await.unwrap();
    service.assign_role_to_user(user_id, &role.id, "t1").await.unwrap();
    role
}

fn check(user_id: &str, resource: &str, action: &str) -> PermissionCheckRequest {
    PermissionCheckRequest::new(user_id, "t1", resource, action)
}

#[tokio::test]
async fn test_role_grant_allows_only_granted_action() {
    let (_, service) = service_with(config());
    grant_role(&service, "u1", vec![Permission::allow("t1", "doc", "read")]).await;

    let allowed = service.check_permission(&check("u1", "doc", "read")).await;
    assert!(allowed.allowed);
    assert_eq!(allowed.effect, Effect::Allow);

    let denied = service.check_permission(&check("u1", "doc", "delete")).await;
    assert!(!denied.allowed);
    assert_eq!(denied.effect, Effect::Deny);
    assert_eq!(denied.reason, "No matching permission found");
}

#[tokio::test]
async fn test_wildcard_permissions() {
    let (_, service) = service_with(config());
    grant_role(&service, "u1", vec![Permission::allow("t1", "task*", "*")]).await;

    assert!(service.check_permission(&check("u1", "task.create", "write")).await.allowed);
    assert!(!service.check_permission(&check("u1", "project.create", "write")).await.allowed);
}

#[tokio::test]
async fn test_tenant_isolation() {
    let (_, service) = service_with(config());
    grant_role(&service, "u1", vec![Permission::allow("t1", "doc", "read")]).await;

    let other_tenant = PermissionCheckRequest::new("u1", "t2", "doc", "read");
    assert!(!service.check_permission(&other_tenant).await.allowed);
}

#[tokio::test]
async fn test_expired_resource_grant_is_ignored() {
    let (repo, service) = service_with(config());
    let read = Permission::allow("t1", "document", "read");
    repo.create_permission(&read).await.unwrap();

    let cmd = GrantResourcePermissionCommand::new(
        "t1",
        ("doc-1", "document"),
        ("u1", SubjectType::User),
        read.id,
        Effect::Allow,
    )
    .with_expiry(Utc::now() - chrono::Duration::minutes(5));
    service.grant_resource_permission(cmd).await.unwrap();

    let resp = service
        .check_permission(&check("u1", "document", "read").with_resource_id("doc-1"))
        .await;
    assert!(!resp.allowed);
    assert_eq!(resp.reason, "No matching permission found");
}

#[tokio::test]
async fn test_role_subject_grant() {
    let (repo, service) = service_with(config());
    let role = grant_role(&service, "u1", vec![]).await;
    let read = Permission::allow("t1", "document", "read");
    repo.create_permission(&read).await.unwrap();

    let cmd = GrantResourcePermissionCommand::new(
        "t1",
        ("doc-1", "document"),
        (role.id.to_string().as_str(), SubjectType::Role),
        read.id,
        Effect::Allow,
    );
    service.grant_resource_permission(cmd).await.unwrap();

    let on_doc = check("u1", "document", "read").with_resource_id("doc-1");
    assert!(service.check_permission(&on_doc).await.allowed);
    let other_doc = check("u1", "document", "read").with_resource_id("doc-2");
    assert!(!service.check_permission(&other_doc).await.allowed);
}

#[tokio::test]
async fn test_group_grants_are_not_resolved() {
    let (repo, service) = service_with(config());
    let read = Permission::allow("t1", "document", "read");
    repo.create_permission(&read).await.unwrap();

    let cmd = GrantResourcePermissionCommand::new(
        "t1",
        ("doc-1", "document"),
        ("u1", SubjectType::Group),
        read.id,
        Effect::Allow,
    );
    service.grant_resource_permission(cmd).await.unwrap();

    let resp = service
        .check_permission(&check("u1", "document", "read").with_resource_id("doc-1"))
        .await;
    assert!(!resp.allowed);
}

#[tokio::test]
async fn test_identical_checks_hit_cache() {
    let (repo, service) = service_with(config());
    grant_role(&service, "u1", vec![Permission::allow("t1", "doc", "read")]).await;

    let request = check("u1", "doc", "read").with_resource_id("doc-1");
    let first = service.check_permission(&request).await;
    let lookups = repo.user_role_lookups();
    let second = service.check_permission(&request).await;

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&second).unwrap()
    );
    assert_eq!(repo.user_role_lookups(), lookups);
}

#[tokio::test(start_paused = true)]
async fn test_cached_decision_expires_after_ttl() {
    let (repo, service) = service_with(config());
    grant_role(&service, "u1", vec![Permission::allow("t1", "doc", "read")]).await;

    let request = check("u1", "doc", "read");
    service.check_permission(&request).await;
    let lookups = repo.user_role_lookups();

    tokio::time::advance(Duration::from_secs(299)).await;
    service.check_permission(&request).await;
    assert_eq!(repo.user_role_lookups(), lookups);

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(service.check_permission(&request).await.allowed);
    assert_eq!(repo.user_role_lookups(), lookups + 1);
}

#[tokio::test]
async fn test_external_cache_shared_between_instances() {
    let backend = Arc::new(MemoryCache::new(1_000));
    let repo = Arc::new(InMemoryPermissionRepository::new());

    let first = DefaultPermissionService::new(repo.clone(), config())
        .with_cache(Arc::new(DistributedPermissionCache::new(backend.clone())));
    let second = DefaultPermissionService::new(repo.clone(), config())
        .with_cache(Arc::new(DistributedPermissionCache::new(backend)));

    grant_role(&first, "u1", vec![Permission::allow("t1", "doc", "read")]).await;
    let request = check("u1", "doc", "read");
    assert!(first.check_permission(&request).await.allowed);

    let lookups = repo.user_role_lookups();
    assert!(second.check_permission(&request).await.allowed);
    assert_eq!(repo.user_role_lookups(), lookups);
}

#[tokio::test(start_paused = true)]
async fn test_external_hit_does_not_outlive_external_expiry() {
    let backend = Arc::new(MemoryCache::new(1_000));
    let repo = Arc::new(InMemoryPermissionRepository::new());
    // 用户角色与权限缓存很快过期，便于通过仓储调用次数观察是否重新解析
    let short = || PermissionServiceConfig {
        user_roles_ttl_secs: 1,
        user_permissions_ttl_secs: 1,
        ..config()
    };

    let first = DefaultPermissionService::new(repo.clone(), short())
        .with_cache(Arc::new(DistributedPermissionCache::new(backend.clone())));
    let second = DefaultPermissionService::new(repo.clone(), short())
        .with_cache(Arc::new(DistributedPermissionCache::new(backend)));

    grant_role(&first, "u1", vec![Permission::allow("t1", "doc", "read")]).await;
    let request = check("u1", "doc", "read");
    assert!(first.check_permission(&request).await.allowed);

    tokio::time::advance(Duration::from_secs(299)).await;
    let lookups = repo.user_role_lookups();
    assert!(second.check_permission(&request).await.allowed);
    assert_eq!(repo.user_role_lookups(), lookups);

    // 外部条目已过期，第二个实例必须重新解析，而不是用本地副本
    tokio::time::advance(Duration::from_secs(200)).await;
    assert!(second.check_permission(&request).await.allowed);
    assert_eq!(repo.user_role_lookups(), lookups + 1);
    assert_eq!(second.statistics().cache_hits, 0);
}

async fn chain(service: &Service, links: &[(&str, &str)]) {
    for (child, parent) in links {
        service
            .set_permission_inheritance(SetInheritanceCommand::new("t1", (*child, "folder"), (*parent, "folder")))
            .await
            .unwrap();
    }
}

async fn grant_on(service: &Service, repo: &InMemoryPermissionRepository, folder: &str) {
    let read = Permission::allow("t1", "folder", "read");
    repo.create_permission(&read).await.unwrap();
    service
        .grant_resource_permission(GrantResourcePermissionCommand::new(
            "t1",
            (folder, "folder"),
            ("u1", SubjectType::User),
            read.id,
            Effect::Allow,
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_inheritance_stops_at_max_depth() {
    let shallow = || PermissionServiceConfig {
        max_inheritance_depth: 3,
        ..config()
    };
    let (repo, service) = service_with(shallow());
    chain(&service, &[("f0", "f1"), ("f1", "f2"), ("f2", "f3"), ("f3", "f4")]).await;
    grant_on(&service, &repo, "f4").await;

    let request = check("u1", "folder", "read").with_resource_id("f0");
    assert!(!service.check_permission(&request).await.allowed);

    // f3 在第三层，恰好在上限内
    let (repo, service) = service_with(shallow());
    chain(&service, &[("f0", "f1"), ("f1", "f2"), ("f2", "f3")]).await;
    grant_on(&service, &repo, "f3").await;
    assert!(service.check_permission(&request).await.allowed);
}

#[tokio::test]
async fn test_inheritance_cycle_terminates() {
    let (repo, service) = service_with(config());
    chain(&service, &[("f0", "f1"), ("f1", "f2"), ("f2", "f0")]).await;
    grant_on(&service, &repo, "f2").await;

    let request = check("u1", "folder", "read").with_resource_id("f0");
    assert!(service.check_permission(&request).await.allowed);

    let unrelated = check("u1", "folder", "write").with_resource_id("f0");
    assert!(!service.check_permission(&unrelated).await.allowed);
}

#[tokio::test]
async fn test_inheritance_disabled() {
    let (repo, service) = service_with(PermissionServiceConfig {
        enable_inheritance: false,
        ..config()
    });
    chain(&service, &[("f0", "f1")]).await;
    grant_on(&service, &repo, "f1").await;

    let request = check("u1", "folder", "read").with_resource_id("f0");
    assert!(!service.check_permission(&request).await.allowed);
}

#[tokio::test]
async fn test_batch_isolates_failures_and_keeps_order() {
    let (repo, service) = service_with(config());
    grant_role(&service, "u1", vec![Permission::allow("t1", "doc", "read")]).await;
    grant_role(&service, "u2", vec![Permission::allow("t1", "doc", "*")]).await;
    repo.fail_user_roles_for("u2");

    let requests = vec![
        check("u1", "doc", "read"),
        check("u2", "doc", "read"),
        check("u1", "doc", "delete"),
        check("u1", "", "read"),
        check("u1", "doc", "read").with_resource_id("doc-9"),
    ];
    let responses = service.check_permissions(&requests).await;

    assert_eq!(responses.len(), requests.len());
    assert!(responses[0].allowed);
    assert!(responses[1].reason.starts_with("Check failed: "));
    assert_eq!(responses[2].reason, "No matching permission found");
    assert_eq!(responses[3].reason, "Invalid request: resource is required");
    assert!(responses[4].allowed);
}

#[tokio::test]
async fn test_policy_fallback_when_no_permission_matches() {
    let (_, service) = service_with(config());
    grant_role(&service, "u1", vec![Permission::deny("t1", "doc", "delete")]).await;
    service
        .create_policy(CreatePolicyCommand::new(
            "t1",
            "reports",
            PolicyType::Rbac,
            vec![
                PolicyRule::new("finance", "report*", "export", Effect::Allow)
                    .with_condition("department", json!("finance")),
                PolicyRule::new("catch-all", "*", "*", Effect::Allow),
            ],
        ))
        .await
        .unwrap();

    // 显式拒绝的权限先于策略生效
    let resp = service.check_permission(&check("u1", "doc", "delete")).await;
    assert!(!resp.allowed);
    assert_eq!(resp.reason, "Permission doc:delete matched");

    let resp = service
        .check_permission(&check("u1", "report.q1", "export").with_context("department", json!("finance")))
        .await;
    assert!(resp.allowed);
    assert_eq!(resp.reason, "Policy evaluation allowed");
    assert_eq!(resp.policies[0].name, "reports");
}

#[tokio::test]
async fn test_audit_records_written_before_shutdown_returns() {
    let (_, service) = service_with(PermissionServiceConfig {
        audit_all_checks: true,
        ..Default::default()
    });
    grant_role(&service, "u1", vec![Permission::allow("t1", "doc", "read")]).await;

    service.check_permission(&check("u1", "doc", "read")).await;
    service
        .check_permission(&check("u1", "doc", "delete").with_context("ip_address", json!("10.0.0.7")))
        .await;
    // 命中缓存的检查不写审计
    service.check_permission(&check("u1", "doc", "read")).await;
    service.shutdown().await;

    let page = service
        .get_permission_audit_log(&PermissionAuditFilter::default())
        .await
        .unwrap();
    assert_eq!(page.total, 2);

    let denied = PermissionAuditFilter {
        effect: Some(Effect::Deny),
        ..Default::default()
    };
    let page = service.get_permission_audit_log(&denied).await.unwrap();
    assert_eq!(page.items[0].ip_address.as_deref(), Some("10.0.0.7"));
    // 请求未指定检查模式时记录配置的默认模式
    assert_eq!(page.items[0].context["check_mode"], json!("strict"));
}
