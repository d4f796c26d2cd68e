//! Policy aggregation over direct and group grants.

mod common;

use access_service::{
    models::{GrantSubject, Lookup, NetworkIdentity, NewPrincipal},
    services::{DirectoryStore, ServiceError},
};
use axum::http::{Method, StatusCode};
use common::{bearer, body_json, TestApp};
use serde_json::json;

#[tokio::test]
async fn user_policy_merges_direct_and_group_grants() {
    let app = TestApp::spawn().await.expect("Failed to spawn test app");
    app.seed_grants().await;
    let token = app.alice_token().await;

    let res = app.get("/userapi/policies", bearer(&token)).await;
    assert_eq!(res.status(), StatusCode::OK);

    let body = body_json(res).await;
    let services = body["services"].as_object().expect("services map");
    assert_eq!(services.len(), 2);

    assert_eq!(
        body["services"]["vpn1"],
        json!({
            "name": "vpn1",
            "wg_key": "wg-key-1",
            "virtual_ip": "10.8.0.1",
            "public_ip": "203.0.113.1",
            "local_ip": "192.168.1.1",
            "apps": [{ "name": "vpn1", "is_user_policy": true }],
        })
    );
    assert_eq!(
        body["services"]["vpn1b"]["apps"],
        json!([{ "name": "vpn1b" }])
    );
}

#[tokio::test]
async fn admin_reads_the_same_user_policy_by_name_or_id() {
    let app = TestApp::spawn().await.expect("Failed to spawn test app");
    app.seed_grants().await;
    let alice_token = app.alice_token().await;
    let admin = app.admin_token().await;

    let own = body_json(app.get("/userapi/policies", bearer(&alice_token)).await).await;
    let by_name = body_json(app.get("/policies/alice", bearer(&admin)).await).await;
    let by_id = body_json(
        app.get(&format!("/policies/{}", app.alice.id()), bearer(&admin))
            .await,
    )
    .await;

    assert_eq!(own, by_name);
    assert_eq!(own, by_id);
}

#[tokio::test]
async fn user_without_grants_gets_empty_policy() {
    let app = TestApp::spawn().await.expect("Failed to spawn test app");
    app.seed_grants().await;
    let admin = app.admin_token().await;

    let res = app.get("/policies/bob", bearer(&admin)).await;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await, json!({ "services": {} }));
}

#[tokio::test]
async fn unknown_user_policy_is_not_found() {
    let app = TestApp::spawn().await.expect("Failed to spawn test app");
    let admin = app.admin_token().await;

    let res = app.get("/policies/mallory", bearer(&admin)).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let err = app
        .state
        .policies
        .policy_for_user(app.acme.id, &Lookup::Name("mallory".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::UnknownPrincipal(_)));
}

#[tokio::test]
async fn invalid_user_segment_is_bad_request() {
    let app = TestApp::spawn().await.expect("Failed to spawn test app");
    let admin = app.admin_token().await;

    let res = app.get("/policies/0", bearer(&admin)).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn same_app_through_both_sources_is_listed_twice() {
    let app = TestApp::spawn().await.expect("Failed to spawn test app");
    app.grant(GrantSubject::User, "alice", "vpn1").await;
    app.grant(GrantSubject::Group, "eng", "vpn1").await;

    let policy = app
        .state
        .policies
        .policy_for_user(app.acme.id, &Lookup::Name("alice".into()))
        .await
        .expect("policy");

    let node = policy.node("vpn1").expect("vpn1 node");
    assert_eq!(node.apps.len(), 2);
    assert!(node.apps[0].is_user_policy);
    assert!(!node.apps[1].is_user_policy);
}

#[tokio::test]
async fn revoked_grant_leaves_the_policy() {
    let app = TestApp::spawn().await.expect("Failed to spawn test app");
    app.seed_grants().await;
    let admin = app.admin_token().await;

    let res = app
        .send(Method::DELETE, "/users/access/alice/vpn1", bearer(&admin), None)
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let policy = app
        .state
        .policies
        .policy_for_user(app.acme.id, &Lookup::Name("alice".into()))
        .await
        .expect("policy");
    assert!(policy.node("vpn1").is_none());
    assert!(policy.node("vpn1b").is_some());
}

#[tokio::test]
async fn domain_policy_covers_every_grant_in_the_domain() {
    let app = TestApp::spawn().await.expect("Failed to spawn test app");
    app.seed_grants().await;
    app.grant(GrantSubject::User, "bob", "vpn1b").await;
    let admin = app.admin_token().await;

    let res = app.get("/policies", bearer(&admin)).await;
    assert_eq!(res.status(), StatusCode::OK);

    let body = body_json(res).await;
    assert_eq!(
        body["services"]["vpn1"]["apps"],
        json!([{ "name": "vpn1", "is_user_policy": true }])
    );
    // Direct grants come first, then group grants.
    assert_eq!(
        body["services"]["vpn1b"]["apps"],
        json!([
            { "name": "vpn1b", "is_user_policy": true },
            { "name": "vpn1b" },
        ])
    );
}

#[tokio::test]
async fn policies_never_cross_domains() {
    let app = TestApp::spawn().await.expect("Failed to spawn test app");
    app.seed_grants().await;

    let store = &app.store;
    let globex = app.globex.id;
    store
        .create_principal(&NewPrincipal::service(
            globex,
            "gw",
            "gw-pw",
            NetworkIdentity::default(),
        ))
        .await
        .expect("gw");
    store
        .create_principal(&NewPrincipal::user(
            globex,
            "carol",
            "carol-pw",
            NetworkIdentity::default(),
        ))
        .await
        .expect("carol");
    store
        .grant_app(
            GrantSubject::User,
            globex,
            &Lookup::Name("carol".into()),
            &Lookup::Name("gw".into()),
        )
        .await
        .expect("grant");

    let acme = app
        .state
        .policies
        .policy_for_domain(app.acme.id)
        .await
        .expect("acme policy");
    let globex_policy = app
        .state
        .policies
        .policy_for_domain(globex)
        .await
        .expect("globex policy");

    assert!(acme.node("gw").is_none());
    assert_eq!(acme.app_count(), 2);
    assert_eq!(globex_policy.nodes.len(), 1);
    assert!(globex_policy.node("gw").is_some());

    // alice is not visible from globex.
    let err = app
        .state
        .policies
        .policy_for_user(globex, &Lookup::Name("alice".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::UnknownPrincipal(_)));
}

#[tokio::test]
async fn grants_never_reach_across_domains() {
    let app = TestApp::spawn().await.expect("Failed to spawn test app");

    let err = app
        .store
        .grant_app(
            GrantSubject::User,
            app.globex.id,
            &Lookup::Name("alice".into()),
            &Lookup::Name("vpn1".into()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn extra_apps_carry_their_allowed_ips() {
    let app = TestApp::spawn().await.expect("Failed to spawn test app");
    app.store
        .create_app(app.vpn1.id(), "ssh", Some("10.8.0.0/24"))
        .await
        .expect("app");
    app.grant(GrantSubject::User, "alice", "ssh").await;
    app.grant(GrantSubject::User, "alice", "vpn1").await;
    let admin = app.admin_token().await;

    let body = body_json(app.get("/policies/alice", bearer(&admin)).await).await;

    assert_eq!(
        body["services"]["vpn1"]["apps"],
        json!([
            { "name": "ssh", "allowed_ips": "10.8.0.0/24", "is_user_policy": true },
            { "name": "vpn1", "is_user_policy": true },
        ])
    );
}
