use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::Duration;
use pooling_api::middleware::issue_token;
use pooling_api::{app, AppState, AuthConfig, PoolFacade, IDEMPOTENCY_KEY_HEADER};
use pooling_core::events::RecordingPublisher;
use pooling_core::idempotency::InMemoryIdempotencyGuard;
use pooling_core::ManualClock;
use pooling_store::app_config::PoolingRules;
use pooling_trip::MockPaymentAdapter;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    auth: AuthConfig,
    clock: Arc<ManualClock>,
}

impl TestApp {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::default());
        let facade = PoolFacade::in_memory(
            &PoolingRules::default(),
            Arc::new(InMemoryIdempotencyGuard::new(clock.clone())),
            Arc::new(RecordingPublisher::new()),
            Arc::new(MockPaymentAdapter),
            clock.clone(),
        );
        let auth = AuthConfig {
            secret: "integration-test-secret".to_string(),
            expiration: 3600,
        };
        let router = app(AppState::new(Arc::new(facade), auth.clone(), None));
        Self { router, auth, clock }
    }

    fn token(&self, user: &str) -> String {
        issue_token(&self.auth, user, &format!("{}@example.com", user)).unwrap()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn get(&self, user: &str, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token(user)))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    async fn post(&self, user: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        self.post_with_key(user, uri, body, None).await
    }

    async fn post_with_key(&self, user: &str, uri: &str, body: Value, key: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token(user)))
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(key) = key {
            builder = builder.header(IDEMPOTENCY_KEY_HEADER, key);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap()).await
    }

    /// Creates a public Lisbon group owned by `creator` and returns its id.
    async fn create_group(&self, creator: &str, max_members: u32) -> String {
        let (status, group) = self
            .post(
                creator,
                "/groups/with-trip",
                json!({
                    "userId": creator,
                    "name": "Lisbon food week",
                    "minMembers": 2,
                    "maxMembers": max_members,
                    "trip": {
                        "baseCity": "Lisbon",
                        "startDate": "2026-06-01",
                        "endDate": "2026-06-10",
                        "budgetLevel": "moderate",
                        "preferredActivities": ["food", "hiking"]
                    }
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", group);
        group["id"].as_str().unwrap().to_string()
    }

    async fn invite_and_accept(&self, group_id: &str, inviter: &str, invitee: &str) {
        let (status, invitation) = self
            .post(
                inviter,
                &format!("/groups/{}/invite", group_id),
                json!({ "userId": inviter, "invitedUserId": invitee, "message": "come along" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", invitation);

        let (status, body) = self
            .post(
                invitee,
                "/groups/invitations/respond",
                json!({
                    "invitationId": invitation["id"],
                    "userId": invitee,
                    "action": "accept"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
    }
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let test = TestApp::new();
    let request = Request::builder()
        .method("GET")
        .uri("/groups/public/enhanced")
        .body(Body::empty())
        .unwrap();

    let (status, body) = test.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "AUTH");
    assert_eq!(body["operation"], "authenticate");
}

#[tokio::test]
async fn test_health_needs_no_identity() {
    let test = TestApp::new();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = test.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_create_list_and_paginate_groups() {
    let test = TestApp::new();
    test.create_group("ana", 4).await;
    test.create_group("bob", 4).await;

    let (status, page) = test
        .get("carla", "/groups/public/enhanced?baseCity=lisbon&preferredActivities=food&page=1&pageSize=1")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["totalPools"], 2);
    assert_eq!(page["totalPages"], 2);
    assert_eq!(page["hasNextPage"], true);
    assert_eq!(page["pools"].as_array().unwrap().len(), 1);

    let (status, mine) = test.get("ana", "/groups/created-by/ana").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let (status, body) = test.get("ana", "/groups/created-by/bob").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["operation"], "groups_created_by");
}

#[tokio::test]
async fn test_three_approvals_admit_requester() {
    let test = TestApp::new();
    let group_id = test.create_group("ana", 4).await;
    test.invite_and_accept(&group_id, "ana", "bob").await;
    test.invite_and_accept(&group_id, "ana", "cy").await;

    let (status, request) = test
        .post(
            "dee",
            &format!("/groups/{}/join", group_id),
            json!({
                "userId": "dee",
                "userEmail": "dee@example.com",
                "message": "I cook",
                "userProfile": { "bio": "chef" }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", request);
    assert_eq!(request["status"], "PENDING");

    let (status, pending) = test
        .get("bob", &format!("/groups/{}/join-requests/pending?userId=bob", group_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending[0]["requiredVotes"], 3);

    let (_, items) = test.get("cy", "/groups/all-pending-items?userId=cy&email=cy@example.com").await;
    assert_eq!(items["joinRequestsToVote"].as_array().unwrap().len(), 1);

    let vote_uri = format!("/groups/{}/join-requests/dee/vote", group_id);
    for voter in ["ana", "bob"] {
        let (status, body) = test.post(voter, &vote_uri, json!({ "userId": voter, "approved": true })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "PENDING");
    }
    let (status, body) = test
        .post("cy", &vote_uri, json!({ "userId": "cy", "approved": true, "comment": "welcome" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "APPROVED");

    let (_, page) = test.get("dee", "/groups/public/enhanced?refresh=true").await;
    let group = &page["pools"][0];
    assert_eq!(group["memberCount"], 4);
    assert_eq!(group["isMember"], true);
}

#[tokio::test]
async fn test_invitation_expires_after_default_window() {
    let test = TestApp::new();
    let group_id = test.create_group("ana", 4).await;

    let (status, invitation) = test
        .post(
            "ana",
            &format!("/groups/{}/invite", group_id),
            json!({ "userId": "ana", "invitedEmail": "Bob@Example.com" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, listed) = test.get("bob", "/groups/invitations/bob").await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    test.clock.advance(Duration::days(8));
    let (status, body) = test
        .post(
            "bob",
            "/groups/invitations/respond",
            json!({ "invitationId": invitation["id"], "userId": "bob", "action": "accept" }),
        )
        .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["kind"], "EXPIRED");

    let (_, page) = test.get("ana", "/groups/public/enhanced?refresh=true").await;
    assert_eq!(page["pools"][0]["memberCount"], 1);
}

#[tokio::test]
async fn test_body_user_must_match_token() {
    let test = TestApp::new();
    let group_id = test.create_group("ana", 4).await;

    let (status, body) = test
        .post(
            "mallory",
            &format!("/groups/{}/invite", group_id),
            json!({ "userId": "ana", "invitedUserId": "eve" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["operation"], "invite");
}

#[tokio::test]
async fn test_confirmation_and_staged_payments() {
    let test = TestApp::new();
    let group_id = test.create_group("ana", 8).await;
    test.invite_and_accept(&group_id, "ana", "bob").await;

    let (status, trip) = test
        .post(
            "ana",
            "/pooling-confirm/initiate",
            json!({
                "userId": "ana",
                "groupId": group_id,
                "minMembers": 2,
                "maxMembers": 8,
                "confirmationHours": 48,
                "totalAmount": 200000,
                "pricePerPerson": 50000,
                "currency": "EUR",
                "startDate": "2026-06-01",
                "endDate": "2026-06-10"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", trip);
    let trip_id = trip["id"].as_str().unwrap().to_string();

    for member in ["ana", "bob"] {
        let (status, body) = test
            .post_with_key(
                member,
                &format!("/pooling-confirm/{}/confirm", trip_id),
                json!({ "userId": member }),
                Some("confirm-1"),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
    }

    // same key from the same caller is a repeated delivery
    let (status, body) = test
        .post_with_key(
            "bob",
            &format!("/pooling-confirm/{}/confirm", trip_id),
            json!({ "userId": "bob" }),
            Some("confirm-1"),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "CONFLICT");

    let (_, view) = test
        .get("bob", &format!("/pooling-confirm/{}/status?userId=bob", trip_id))
        .await;
    assert_eq!(view["status"], "CONFIRMED");
    assert_eq!(view["confirmedCount"], 2);

    let (status, body) = test
        .post(
            "ana",
            &format!("/pooling-confirm/{}/payment/final", trip_id),
            json!({ "userId": "ana", "amount": 30000, "method": "card" }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["operation"], "pay_final");

    let payment = json!({ "userId": "bob", "amount": 25000, "currency": "EUR", "method": "card" });
    let (status, upfront) = test
        .post("bob", &format!("/pooling-confirm/{}/payment/upfront", trip_id), payment.clone())
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", upfront);
    assert_eq!(upfront["status"], "RECORDED");
    let (status, last) = test
        .post("bob", &format!("/pooling-confirm/{}/payment/final", trip_id), payment)
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", last);
    assert_eq!(last["phase"], "FINAL");

    let (_, details) = test
        .get("bob", &format!("/pooling-confirm/{}/details?userId=bob", trip_id))
        .await;
    assert_eq!(details["callerUpfrontPaid"], true);
    assert_eq!(details["callerFinalPaid"], true);
}

#[tokio::test]
async fn test_unconfirmed_window_reads_expired() {
    let test = TestApp::new();
    let group_id = test.create_group("ana", 8).await;

    let (_, trip) = test
        .post(
            "ana",
            "/pooling-confirm/initiate",
            json!({
                "userId": "ana",
                "groupId": group_id,
                "minMembers": 2,
                "maxMembers": 8,
                "confirmationHours": 48,
                "totalAmount": 0,
                "pricePerPerson": 0,
                "currency": "EUR",
                "startDate": "2026-06-01",
                "endDate": "2026-06-10"
            }),
        )
        .await;
    let trip_id = trip["id"].as_str().unwrap().to_string();
    test.post("ana", &format!("/pooling-confirm/{}/confirm", trip_id), json!({ "userId": "ana" }))
        .await;

    test.clock.advance(Duration::hours(49));
    let (status, view) = test
        .get("ana", &format!("/pooling-confirm/{}/status?userId=ana", trip_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "EXPIRED");
}
