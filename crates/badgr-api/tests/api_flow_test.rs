//! 路由级集成测试
//!
//! 使用内存仓储驱动完整的 axum 路由，覆盖认证、发放、撤销、背包与令牌端点。
//! 无需 PostgreSQL 或 Redis。

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use fake::Fake;
use fake::faker::name::en::{FirstName, LastName};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use badgr_api::auth::hash_password;
use badgr_api::{AppState, build_router};
use badgr_core::badgecheck::{BadgeCheck, ImportOutcome, ImportSource};
use badgr_core::models::{Acceptance, NewAccessToken, generate_token};
use badgr_core::publisher::RecordingPublisher;
use badgr_core::repository::Repositories;
use badgr_core::repository::memory::MemoryStore;
use badgr_core::{CoreError, IdentifierType, UserAccount};
use badgr_shared::config::BadgrSettings;

const ALL_SCOPES: &str = "rw:issuer rw:backpack r:assertions";

// ==================== 辅助函数 ====================

/// 导入校验替身，任何来源都判定为无效
struct RejectingBadgeCheck;

#[async_trait]
impl BadgeCheck for RejectingBadgeCheck {
    async fn get_or_create_assertion(
        &self,
        _source: ImportSource,
        _account: &UserAccount,
    ) -> badgr_core::Result<ImportOutcome> {
        Err(CoreError::BadgeCheck(vec!["could not verify badge".to_string()]))
    }
}

struct TestApp {
    router: Router,
    repos: Repositories,
    publisher: Arc<RecordingPublisher>,
}

struct Seeded {
    entity_id: String,
    token: String,
}

fn setup() -> TestApp {
    let repos = Repositories::in_memory(Arc::new(MemoryStore::new()));
    let publisher = Arc::new(RecordingPublisher::new());
    let state = AppState::new(
        repos.clone(),
        BadgrSettings::default(),
        publisher.clone(),
        Arc::new(RejectingBadgeCheck),
        None,
    );
    TestApp {
        router: build_router(state),
        repos,
        publisher,
    }
}

/// 创建带已验证邮箱的用户，并直接写入一个访问令牌
async fn seed_user(app: &TestApp, email: &str, scope: &str) -> Seeded {
    let first: String = FirstName().fake();
    let last: String = LastName().fake();
    let user = app.repos.users.create_user(&first, &last, None).await.unwrap();
    app.repos
        .users
        .add_identifier(user.id, email, IdentifierType::Email, true)
        .await
        .unwrap();
    let token = app
        .repos
        .oauth
        .create_token(NewAccessToken {
            token: generate_token(),
            user_id: Some(user.id),
            application_id: None,
            scope: scope.to_string(),
            expires: Utc::now() + Duration::hours(1),
        })
        .await
        .unwrap();
    Seeded {
        entity_id: user.entity_id,
        token: token.token,
    }
}

async fn send(app: &TestApp, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn first_result(body: &Value) -> &Value {
    &body["result"][0]
}

/// 建立发行方与徽章定义，返回二者的 entityId
async fn seed_issuer_and_badge(app: &TestApp, owner: &Seeded, email: &str) -> (String, String) {
    let (status, body) = send(
        app,
        Method::POST,
        "/v2/issuers",
        Some(&owner.token),
        Some(json!({
            "name": "Test Academy",
            "email": email,
            "url": "https://academy.example.org"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let issuer_id = first_result(&body)["entityId"].as_str().unwrap().to_string();

    let (status, body) = send(
        app,
        Method::POST,
        &format!("/v2/issuers/{}/badgeclasses", issuer_id),
        Some(&owner.token),
        Some(json!({
            "name": "Gold Star",
            "description": "Awarded for excellence",
            "criteriaNarrative": "Be excellent"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let badge_id = first_result(&body)["entityId"].as_str().unwrap().to_string();

    (issuer_id, badge_id)
}

/// 向徽章定义发放一个实例，返回其 entityId
async fn issue_to(app: &TestApp, owner: &Seeded, badge_id: &str, email: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        &format!("/v2/badgeclasses/{}/assertions", badge_id),
        Some(&owner.token),
        Some(json!({"recipient": {"identity": email, "type": "email"}})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    first_result(&body)["entityId"].as_str().unwrap().to_string()
}

fn entity_ids(body: &Value) -> Vec<String> {
    let mut ids: Vec<String> = body["result"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["entityId"].as_str().unwrap().to_string())
        .collect();
    ids.sort();
    ids
}

async fn get_ids(app: &TestApp, token: &str, uri: String) -> Vec<String> {
    let (status, body) = send(app, Method::GET, &uri, Some(token), None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    entity_ids(&body)
}

fn sorted<S: AsRef<str>>(ids: &[S]) -> Vec<String> {
    let mut ids: Vec<String> = ids.iter().map(|s| s.as_ref().to_string()).collect();
    ids.sort();
    ids
}

// ==================== 健康检查与认证 ====================

#[tokio::test]
async fn test_health_is_public() {
    let app = setup();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_v2_requires_bearer_token() {
    let app = setup();
    let (status, body) = send(&app, Method::GET, "/v2/issuers", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"]["success"], false);

    let (status, _) = send(&app, Method::GET, "/v2/issuers", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_scope_is_enforced() {
    let app = setup();
    let reader = seed_user(&app, "reader@example.org", "r:backpack").await;
    let (status, _) = send(&app, Method::GET, "/v2/issuers", Some(&reader.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

// ==================== 发行方与发放 ====================

#[tokio::test]
async fn test_issuer_email_must_be_verified() {
    let app = setup();
    let owner = seed_user(&app, "owner@example.org", ALL_SCOPES).await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/v2/issuers",
        Some(&owner.token),
        Some(json!({
            "name": "Elsewhere",
            "email": "someone-else@example.org",
            "url": "https://elsewhere.example.org"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"]["success"], false);
}

#[tokio::test]
async fn test_issuer_validation_reports_fields() {
    let app = setup();
    let owner = seed_user(&app, "owner@example.org", ALL_SCOPES).await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/v2/issuers",
        Some(&owner.token),
        Some(json!({"email": "owner@example.org", "url": "nope"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fieldErrors"]["name"].is_array());
    assert!(body["fieldErrors"]["url"].is_array());
}

#[tokio::test]
async fn test_issue_and_revoke_flow() {
    let app = setup();
    let owner = seed_user(&app, "owner@example.org", ALL_SCOPES).await;
    let recipient = seed_user(&app, "learner@example.org", ALL_SCOPES).await;
    let (issuer_id, badge_id) = seed_issuer_and_badge(&app, &owner, "owner@example.org").await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/v2/badgeclasses/{}/assertions", badge_id),
        Some(&owner.token),
        Some(json!({
            "recipient": {"identity": "learner@example.org", "type": "email"},
            "narrative": "Did great"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let assertion = first_result(&body);
    let assertion_id = assertion["entityId"].as_str().unwrap().to_string();
    assert_eq!(assertion["badgeclass"], badge_id);
    assert_eq!(assertion["issuer"], issuer_id);
    assert_eq!(assertion["revoked"], false);

    // 公开文档可访问
    let (status, doc) = send(&app, Method::GET, &format!("/public/assertions/{}", assertion_id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["type"], "Assertion");

    // 接收者背包可见；新发放的实例默认已接受
    let (status, body) = send(&app, Method::GET, "/v2/backpack/assertions", Some(&recipient.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"].as_array().unwrap().len(), 1);
    assert_eq!(first_result(&body)["pending"], false);
    assert_eq!(first_result(&body)["acceptance"], "Accepted");

    // 撤销原因必填
    let (status, body) = send(
        &app,
        Method::DELETE,
        &format!("/v2/assertions/{}", assertion_id),
        Some(&owner.token),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fieldErrors"]["revocation_reason"].is_array());

    let (status, body) = send(
        &app,
        Method::DELETE,
        &format!("/v2/assertions/{}", assertion_id),
        Some(&owner.token),
        Some(json!({"revocation_reason": "Issued in error"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(first_result(&body)["revoked"], true);
    assert!(app.publisher.count_for(&recipient.entity_id) >= 1);

    // 撤销后公开文档返回 410
    let (status, doc) = send(&app, Method::GET, &format!("/public/assertions/{}", assertion_id), None, None).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(doc["revoked"], true);
    assert_eq!(doc["revocationReason"], "Issued in error");

    // 再次撤销失败
    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/v2/assertions/{}", assertion_id),
        Some(&owner.token),
        Some(json!({"revocation_reason": "again"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_issuer_with_assertions_cannot_be_deleted() {
    let app = setup();
    let owner = seed_user(&app, "owner@example.org", ALL_SCOPES).await;
    let (issuer_id, badge_id) = seed_issuer_and_badge(&app, &owner, "owner@example.org").await;

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/v2/badgeclasses/{}/assertions", badge_id),
        Some(&owner.token),
        Some(json!({"recipient": {"identity": "learner@example.org"}})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(&app, Method::DELETE, &format!("/v2/issuers/{}", issuer_id), Some(&owner.token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::DELETE, &format!("/v2/badgeclasses/{}", badge_id), Some(&owner.token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_other_users_cannot_see_issuer() {
    let app = setup();
    let owner = seed_user(&app, "owner@example.org", ALL_SCOPES).await;
    let stranger = seed_user(&app, "stranger@example.org", ALL_SCOPES).await;
    let (issuer_id, badge_id) = seed_issuer_and_badge(&app, &owner, "owner@example.org").await;

    let (status, _) = send(&app, Method::GET, &format!("/v2/issuers/{}", issuer_id), Some(&stranger.token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/v2/badgeclasses/{}/assertions", badge_id),
        Some(&stranger.token),
        Some(json!({"recipient": {"identity": "learner@example.org"}})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_batch_issue_reports_item_errors() {
    let app = setup();
    let owner = seed_user(&app, "owner@example.org", ALL_SCOPES).await;
    let (_, badge_id) = seed_issuer_and_badge(&app, &owner, "owner@example.org").await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/v2/badgeclasses/{}/issue", badge_id),
        Some(&owner.token),
        Some(json!({
            "assertions": [
                {"recipient": {"identity": "a@example.org"}},
                {"recipient": {"identity": "b@example.org", "type": "telepathy"}}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fieldErrors"].is_array());

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/v2/badgeclasses/{}/issue", badge_id),
        Some(&owner.token),
        Some(json!({
            "assertions": [
                {"recipient": {"identity": "a@example.org"}},
                {"recipient": {"identity": "b@example.org"}}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["result"].as_array().unwrap().len(), 2);
}

// ==================== 批量撤销、列表与变更流 ====================

#[tokio::test]
async fn test_batch_revoke_reports_per_item() {
    let app = setup();
    let owner = seed_user(&app, "owner@example.org", ALL_SCOPES).await;
    let (_, badge_id) = seed_issuer_and_badge(&app, &owner, "owner@example.org").await;
    let a = issue_to(&app, &owner, &badge_id, "a@example.org").await;
    let b = issue_to(&app, &owner, &badge_id, "b@example.org").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/v2/assertions/revoke",
        Some(&owner.token),
        Some(json!([
            {"entityId": a, "revocationReason": "Issued in error"},
            {"entityId": b},
            {"entityId": b, "revocationReason": 5},
            {"entityId": 42, "revocationReason": "typo"},
            {"entityId": "does-not-exist", "revocationReason": "typo"},
            {"entityId": a, "revocationReason": "again"}
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let results = body["result"].as_array().unwrap();
    assert_eq!(results.len(), 6);
    assert_eq!(
        results[0],
        json!({"revoked": true, "entityId": a, "revocationReason": "Issued in error"})
    );
    assert_eq!(
        results[1],
        json!({"revoked": false, "entityId": b, "reason": "revocationReason is required"})
    );
    // 原因类型不对时 entityId 仍然回显
    assert_eq!(results[2], results[1]);
    assert_eq!(results[3], json!({"revoked": false, "reason": "entityId is required"}));
    assert_eq!(results[4]["revoked"], false);
    assert_eq!(results[4]["reason"], "permission denied or object not found");
    assert_eq!(results[5]["revoked"], false);
    assert_eq!(results[5]["reason"], "Assertion is already revoked");

    let (status, body) = send(&app, Method::GET, &format!("/v2/assertions/{}", b), Some(&owner.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first_result(&body)["revoked"], false);

    let (status, doc) = send(&app, Method::GET, &format!("/public/assertions/{}", a), None, None).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(doc["revocationReason"], "Issued in error");
}

#[tokio::test]
async fn test_issuer_assertions_filters() {
    let app = setup();
    let owner = seed_user(&app, "owner@example.org", ALL_SCOPES).await;
    let (issuer_id, badge_id) = seed_issuer_and_badge(&app, &owner, "owner@example.org").await;
    let current = issue_to(&app, &owner, &badge_id, "current@example.org").await;
    let expired = issue_to(&app, &owner, &badge_id, "expired@example.org").await;
    let revoked = issue_to(&app, &owner, &badge_id, "revoked@example.org").await;

    let mut instance = app
        .repos
        .assertions
        .get_by_entity_id(&expired)
        .await
        .unwrap()
        .unwrap();
    instance.expires_at = Some(Utc::now() - Duration::days(1));
    app.repos.assertions.update(&instance).await.unwrap();

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/v2/assertions/{}", revoked),
        Some(&owner.token),
        Some(json!({"revocation_reason": "Issued in error"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let base = format!("/v2/issuers/{}/assertions", issuer_id);
    let list = |query: &str| get_ids(&app, &owner.token, format!("{}{}", base, query));

    assert_eq!(list("").await, sorted(&[&current]));
    assert_eq!(list("?include_expired=1").await, sorted(&[&current, &expired]));
    assert_eq!(list("?include_revoked=true").await, sorted(&[&current, &revoked]));
    assert_eq!(
        list("?include_expired=true&include_revoked=1").await,
        sorted(&[&current, &expired, &revoked])
    );
}

#[tokio::test]
async fn test_changed_feed_resumes_from_timestamp() {
    let app = setup();
    let owner = seed_user(&app, "owner@example.org", ALL_SCOPES).await;
    let (_, badge_id) = seed_issuer_and_badge(&app, &owner, "owner@example.org").await;
    let a = issue_to(&app, &owner, &badge_id, "a@example.org").await;
    let b = issue_to(&app, &owner, &badge_id, "b@example.org").await;

    let (status, body) = send(&app, Method::GET, "/v2/assertions/changed", Some(&owner.token), None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(entity_ids(&body), sorted(&[&a, &b]));
    let since = body["timestamp"].as_str().unwrap().to_string();

    let uri = format!("/v2/assertions/changed?since={}", since);
    let (status, body) = send(&app, Method::GET, &uri, Some(&owner.token), None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert!(body["result"].as_array().unwrap().is_empty());
    let since = body["timestamp"].as_str().unwrap().to_string();

    // 撤销会刷新 updated_at，下一次轮询只返回该实例
    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/v2/assertions/{}", b),
        Some(&owner.token),
        Some(json!({"revocation_reason": "Issued in error"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let uri = format!("/v2/assertions/changed?since={}", since);
    let (status, body) = send(&app, Method::GET, &uri, Some(&owner.token), None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(entity_ids(&body), sorted(&[&b]));
    assert_eq!(first_result(&body)["revoked"], true);

    let (status, body) = send(&app, Method::GET, "/v2/assertions/changed?since=garbage", Some(&owner.token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fieldErrors"]["since"].is_array());
}

// ==================== 背包 ====================

#[tokio::test]
async fn test_import_requires_exactly_one_source() {
    let app = setup();
    let user = seed_user(&app, "learner@example.org", ALL_SCOPES).await;

    let (status, _) = send(&app, Method::POST, "/v2/backpack/import", Some(&user.token), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::POST,
        "/v2/backpack/import",
        Some(&user.token),
        Some(json!({"url": "https://example.org/assertion/1"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["validationErrors"][0], "could not verify badge");
}

#[tokio::test]
async fn test_collection_lifecycle() {
    let app = setup();
    let user = seed_user(&app, "learner@example.org", ALL_SCOPES).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/v2/backpack/collections",
        Some(&user.token),
        Some(json!({"name": "Highlights", "published": true})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let collection = first_result(&body);
    let entity_id = collection["entityId"].as_str().unwrap().to_string();
    let share_url = collection["share_url"].as_str().unwrap().to_string();
    let share_hash = share_url.rsplit('/').next().unwrap().to_string();

    let (status, doc) = send(&app, Method::GET, &format!("/public/collections/{}", share_hash), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["name"], "Highlights");

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/v2/backpack/collections/{}", entity_id),
        Some(&user.token),
        Some(json!({"name": "Highlights", "assertions": ["does-not-exist"]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::DELETE, &format!("/v2/backpack/collections/{}", entity_id), Some(&user.token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::GET, &format!("/v2/backpack/collections/{}", entity_id), Some(&user.token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_backpack_acceptance_update() {
    let app = setup();
    let owner = seed_user(&app, "owner@example.org", ALL_SCOPES).await;
    let recipient = seed_user(&app, "learner@example.org", ALL_SCOPES).await;
    let (_, badge_id) = seed_issuer_and_badge(&app, &owner, "owner@example.org").await;
    let assertion_id = issue_to(&app, &owner, &badge_id, "learner@example.org").await;

    let mut instance = app
        .repos
        .assertions
        .get_by_entity_id(&assertion_id)
        .await
        .unwrap()
        .unwrap();
    instance.acceptance = Acceptance::Unaccepted;
    app.repos.assertions.update(&instance).await.unwrap();

    let uri = format!("/v2/backpack/assertions/{}", assertion_id);
    let (status, body) = send(&app, Method::GET, &uri, Some(&recipient.token), None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(first_result(&body)["pending"], true);
    assert_eq!(first_result(&body)["acceptance"], "Unaccepted");

    let before = app.publisher.count_for(&recipient.entity_id);

    // 只接受字面值 "Accepted"
    let (status, body) = send(&app, Method::PUT, &uri, Some(&recipient.token), Some(json!({"acceptance": "Rejected"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fieldErrors"]["acceptance"].is_array());
    let (status, body) = send(&app, Method::PUT, &uri, Some(&recipient.token), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fieldErrors"]["acceptance"].is_array());
    assert_eq!(app.publisher.count_for(&recipient.entity_id), before);

    let (status, body) = send(&app, Method::PUT, &uri, Some(&recipient.token), Some(json!({"acceptance": "Accepted"}))).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(first_result(&body)["pending"], false);
    assert_eq!(first_result(&body)["acceptance"], "Accepted");
    assert_eq!(app.publisher.count_for(&recipient.entity_id), before + 1);

    let (status, body) = send(&app, Method::GET, "/v2/backpack/assertions", Some(&recipient.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first_result(&body)["pending"], false);

    // 他人不能改
    let (status, _) = send(&app, Method::PUT, &uri, Some(&owner.token), Some(json!({"acceptance": "Accepted"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rejected_assertion_leaves_backpack() {
    let app = setup();
    let owner = seed_user(&app, "owner@example.org", ALL_SCOPES).await;
    let recipient = seed_user(&app, "learner@example.org", ALL_SCOPES).await;
    let (_, badge_id) = seed_issuer_and_badge(&app, &owner, "owner@example.org").await;
    let assertion_id = issue_to(&app, &owner, &badge_id, "learner@example.org").await;

    let uri = format!("/v2/backpack/assertions/{}", assertion_id);
    let (status, _) = send(&app, Method::DELETE, &uri, Some(&recipient.token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, Method::GET, &uri, Some(&recipient.token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::PUT, &uri, Some(&recipient.token), Some(json!({"acceptance": "Accepted"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = send(&app, Method::GET, "/v2/backpack/assertions", Some(&recipient.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["result"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_backpack_expand() {
    let app = setup();
    let owner = seed_user(&app, "owner@example.org", ALL_SCOPES).await;
    let recipient = seed_user(&app, "learner@example.org", ALL_SCOPES).await;
    let (issuer_id, badge_id) = seed_issuer_and_badge(&app, &owner, "owner@example.org").await;
    let assertion_id = issue_to(&app, &owner, &badge_id, "learner@example.org").await;

    let (status, body) = send(
        &app,
        Method::GET,
        "/v2/backpack/assertions?expand=badgeclass,issuer",
        Some(&recipient.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let badgeclass = &first_result(&body)["badgeclass"];
    assert_eq!(badgeclass["name"], "Gold Star");
    assert_eq!(badgeclass["issuer"]["name"], "Test Academy");
    // 发行方只嵌在 badgeclass 下
    assert_eq!(first_result(&body)["issuer"], issuer_id);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/v2/backpack/assertions/{}?expand=badgeclass", assertion_id),
        Some(&recipient.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let badgeclass = &first_result(&body)["badgeclass"];
    assert_eq!(badgeclass["name"], "Gold Star");
    assert!(badgeclass["issuer"].is_string());

    // 单独展开 issuer 不内联任何对象
    let (status, body) = send(&app, Method::GET, "/v2/backpack/assertions?expand=issuer", Some(&recipient.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first_result(&body)["badgeclass"], badge_id);
    assert_eq!(first_result(&body)["issuer"], issuer_id);
}

// ==================== 令牌端点 ====================

#[tokio::test]
async fn test_password_grant() {
    let app = setup();
    let user = app
        .repos
        .users
        .create_user("Pat", "Doe", Some(&hash_password("s3cret!").unwrap()))
        .await
        .unwrap();
    app.repos
        .users
        .add_identifier(user.id, "pat@example.org", IdentifierType::Email, true)
        .await
        .unwrap();
    app.repos
        .oauth
        .create_application("public", None, "Public", None, ALL_SCOPES)
        .await
        .unwrap();

    let form = |password: &str| {
        Request::builder()
            .method(Method::POST)
            .uri("/o/token")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!(
                "grant_type=password&username=pat%40example.org&password={}",
                password
            )))
            .unwrap()
    };

    let response = app.router.clone().oneshot(form("s3cret%21")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["token_type"], "Bearer");
    let access_token = body["access_token"].as_str().unwrap().to_string();

    let (status, _) = send(&app, Method::GET, "/v2/issuers", Some(&access_token), None).await;
    assert_eq!(status, StatusCode::OK);

    let response = app.router.clone().oneshot(form("wrong")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "invalid_grant");
}

#[tokio::test]
async fn test_unsupported_grant_type() {
    let app = setup();
    let (status, body) = send(&app, Method::POST, "/o/token", None, Some(json!({"grant_type": "implicit"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unsupported_grant_type");
}

#[tokio::test]
async fn test_issuer_tokens_for_application() {
    let app = setup();
    let owner = seed_user(&app, "owner@example.org", ALL_SCOPES).await;
    let other = seed_user(&app, "other@example.org", ALL_SCOPES).await;
    let (issuer_id, _) = seed_issuer_and_badge(&app, &owner, "owner@example.org").await;
    let (foreign_issuer, _) = seed_issuer_and_badge(&app, &other, "other@example.org").await;

    let owner_user = app
        .repos
        .users
        .get_user_by_entity_id(&owner.entity_id)
        .await
        .unwrap()
        .unwrap();
    let application = app
        .repos
        .oauth
        .create_application("partner", None, "Partner", Some(owner_user.id), ALL_SCOPES)
        .await
        .unwrap();
    let app_token = app
        .repos
        .oauth
        .create_token(NewAccessToken {
            token: generate_token(),
            user_id: Some(owner_user.id),
            application_id: Some(application.id),
            scope: "rw:issuer".to_string(),
            expires: Utc::now() + Duration::hours(1),
        })
        .await
        .unwrap()
        .token;

    // 普通用户令牌不能调用
    let (status, _) = send(
        &app,
        Method::POST,
        "/v2/issuer-tokens",
        Some(&owner.token),
        Some(json!({"issuers": [issuer_id]})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::POST, "/v2/issuer-tokens", Some(&app_token), Some(json!({"issuers": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fieldErrors"]["issuers"].is_array());

    let (status, body) = send(
        &app,
        Method::POST,
        "/v2/issuer-tokens",
        Some(&app_token),
        Some(json!({"issuers": ["does-not-exist"]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["fieldErrors"]["issuers"].is_array());

    let (status, _) = send(
        &app,
        Method::POST,
        "/v2/issuer-tokens",
        Some(&app_token),
        Some(json!({"issuers": [foreign_issuer]})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        Method::POST,
        "/v2/issuer-tokens",
        Some(&app_token),
        Some(json!({"issuers": [issuer_id]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["result"].as_array().unwrap().len(), 1);
    assert_eq!(first_result(&body)["issuer"], issuer_id);
    let minted = first_result(&body)["token"].as_str().unwrap().to_string();
    assert!(!minted.is_empty());
    assert_ne!(minted, app_token);

    // 未过期的令牌被复用
    let (status, body) = send(
        &app,
        Method::POST,
        "/v2/issuer-tokens",
        Some(&app_token),
        Some(json!({"issuers": [issuer_id]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first_result(&body)["token"], minted);
}
