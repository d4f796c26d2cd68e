//! Power-admin domain switching and domain removal.

mod common;

use axum::http::{Method, StatusCode};
use common::{bearer, body_json, challenge, TestApp};

#[tokio::test]
async fn power_admin_switches_working_domain() {
    let app = TestApp::spawn().await.expect("Failed to spawn test app");
    let token = app.power_token().await;

    let res = app
        .send(Method::POST, "/changedomain/globex", bearer(&token), None)
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let body = body_json(res).await;
    assert_eq!(body["domain"], "globex");
    assert_eq!(body["role"], "P");
    assert_eq!(body["Token"], token.as_str());
    assert_eq!(
        body["logo_file"],
        format!("images/logos/{}.png", app.globex.id)
    );

    // The session itself moved: acme users are no longer addressable.
    let res = app.get("/policies/alice", bearer(&token)).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = app
        .send(
            Method::POST,
            &format!("/changedomain/{}", app.acme.id),
            bearer(&token),
            None,
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["domain"], "acme");

    let res = app.get("/policies/alice", bearer(&token)).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn switching_to_current_domain_is_a_no_op() {
    let app = TestApp::spawn().await.expect("Failed to spawn test app");
    let token = app.power_token().await;

    let res = app
        .send(Method::POST, "/changedomain/acme", bearer(&token), None)
        .await;

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["domain"], "acme");
}

#[tokio::test]
async fn tenant_admin_cannot_switch_domains() {
    let app = TestApp::spawn().await.expect("Failed to spawn test app");
    let token = app.admin_token().await;

    let res = app
        .send(Method::POST, "/changedomain/globex", bearer(&token), None)
        .await;

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert!(challenge(&res).is_some());
}

#[tokio::test]
async fn switching_to_unknown_domain_is_rejected() {
    let app = TestApp::spawn().await.expect("Failed to spawn test app");
    let token = app.power_token().await;

    let unknown = app
        .send(Method::POST, "/changedomain/initech", bearer(&token), None)
        .await;
    let zero = app
        .send(Method::POST, "/changedomain/0", bearer(&token), None)
        .await;

    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
    assert_eq!(zero.status(), StatusCode::BAD_REQUEST);

    // The session keeps its domain.
    let res = app.get("/policies/alice", bearer(&token)).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn empty_domain_can_be_deleted() {
    let app = TestApp::spawn().await.expect("Failed to spawn test app");
    let token = app.power_token().await;

    let res = app
        .send(Method::DELETE, "/domains/globex", bearer(&token), None)
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let body = body_json(res).await;
    assert_eq!(body["id"], app.globex.id);
    assert_eq!(body["name"], "globex");

    let res = app
        .send(Method::POST, "/changedomain/globex", bearer(&token), None)
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .send(Method::DELETE, "/domains/globex", bearer(&token), None)
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn domain_with_members_is_not_deleted() {
    let app = TestApp::spawn().await.expect("Failed to spawn test app");
    let token = app.power_token().await;

    let res = app
        .send(Method::DELETE, "/domains/acme", bearer(&token), None)
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // Still usable.
    let login = app.admin_token().await;
    assert!(login.starts_with('A'));
}

#[tokio::test]
async fn power_domain_is_never_deleted() {
    let app = TestApp::spawn().await.expect("Failed to spawn test app");
    let token = app.power_token().await;

    for target in ["power", "1"] {
        let res = app
            .send(
                Method::DELETE,
                &format!("/domains/{target}"),
                bearer(&token),
                None,
            )
            .await;
        assert_eq!(res.status(), StatusCode::CONFLICT, "target {target}");
    }
}

#[tokio::test]
async fn tenant_admin_cannot_delete_domains() {
    let app = TestApp::spawn().await.expect("Failed to spawn test app");
    let token = app.admin_token().await;

    let res = app
        .send(Method::DELETE, "/domains/globex", bearer(&token), None)
        .await;

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_domain_delete_is_not_found() {
    let app = TestApp::spawn().await.expect("Failed to spawn test app");
    let token = app.power_token().await;

    let res = app
        .send(Method::DELETE, "/domains/initech", bearer(&token), None)
        .await;

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn working_domain_of_a_session_is_not_deleted() {
    let app = TestApp::spawn().await.expect("Failed to spawn test app");
    let token = app.power_token().await;

    let res = app
        .send(Method::POST, "/changedomain/globex", bearer(&token), None)
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .send(Method::DELETE, "/domains/globex", bearer(&token), None)
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // The session still resolves and can leave the domain.
    let res = app.get("/policies", bearer(&token)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = app
        .send(Method::POST, "/changedomain/acme", bearer(&token), None)
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    // Once nobody works there it can go.
    let res = app
        .send(Method::DELETE, "/domains/globex", bearer(&token), None)
        .await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn ended_sessions_do_not_pin_a_domain() {
    let app = TestApp::spawn().await.expect("Failed to spawn test app");
    let parked = app.power_token().await;
    app.send(Method::POST, "/changedomain/globex", bearer(&parked), None)
        .await;
    let res = app.get("/logout", bearer(&parked)).await;
    assert_eq!(res.status(), StatusCode::OK);

    let token = app.power_token().await;
    let res = app
        .send(Method::DELETE, "/domains/globex", bearer(&token), None)
        .await;

    assert_eq!(res.status(), StatusCode::OK);
}
