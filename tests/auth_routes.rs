use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{self, Body},
    http::{Request, StatusCode, header},
    response::Response,
};
use serde_json::json;
use tower::ServiceExt; // for `oneshot`

use campus_server::{
    auth::{
        Role, password,
        token::{JwtKeys, encode_token, make_claims},
    },
    services::SignAuth,
    state::AppState,
    test_helpers::{test_config, test_router},
};

async fn json_body(res: Response) -> serde_json::Value {
    let bytes = body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn refresh_cookie(res: &Response) -> String {
    let set_cookie = res
        .headers()
        .get(header::SET_COOKIE)
        .expect("set-cookie header")
        .to_str()
        .unwrap();
    assert!(set_cookie.starts_with("refresh_token="));
    set_cookie.split(';').next().unwrap().to_string()
}

fn post_json(uri: &str, payload: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

fn post_json_bearer(uri: &str, payload: serde_json::Value, token: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(payload.to_string()))
        .unwrap()
}

async fn signup(app: &axum::Router, email: &str, username: &str) -> serde_json::Value {
    let res = app
        .clone()
        .oneshot(post_json(
            "/auth/signup",
            json!({"email": email, "username": username, "password": "student-pass"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    json_body(res).await
}

async fn seed_admin(state: &AppState) -> String {
    let hash = password::hash_password("admin-password").unwrap();
    let admin = state
        .dao
        .user()
        .create_user("root@example.com", "root", Some(&hash))
        .await
        .unwrap();
    state.dao.role().grant(admin.id, Role::Admin).await.unwrap();

    state
        .sessions
        .sign_auth(SignAuth {
            user_id: admin.id,
            method: "local".into(),
            expires_in_minutes: None,
            roles: None,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn health_works() {
    let (app, _state) = test_router().await;

    let res = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await["status"], "ok");
}

#[tokio::test]
async fn signup_sets_refresh_cookie_and_returns_access_token() {
    let (app, _state) = test_router().await;

    let res = app
        .oneshot(post_json(
            "/auth/signup",
            json!({"email": "s@example.com", "username": "s", "password": "student-pass"}),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let set_cookie = res
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("refresh_token="));
    assert!(set_cookie.contains("HttpOnly"));

    let body = json_body(res).await;
    assert_eq!(body["success"], true);
    assert!(body["access_token"].as_str().is_some());
    assert_eq!(body["user"]["username"], "s");
}

#[tokio::test]
async fn login_checks_credentials_and_bumps_last_login() {
    let (app, state) = test_router().await;
    signup(&app, "l@example.com", "l").await;

    let res = app
        .clone()
        .oneshot(post_json(
            "/auth/login",
            json!({"email": "l@example.com", "password": "wrong-password"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app
        .oneshot(post_json(
            "/auth/login",
            json!({"email": "l@example.com", "password": "student-pass"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = json_body(res).await;
    assert!(body["access_token"].as_str().is_some());

    let user = state
        .dao
        .user()
        .find_by_email("l@example.com")
        .await
        .unwrap()
        .unwrap();
    assert!(user.last_login_at.is_some());
}

#[tokio::test]
async fn banned_user_cannot_login() {
    let (app, state) = test_router().await;
    let body = signup(&app, "b@example.com", "b").await;
    let user_id = body["user"]["id"].as_i64().unwrap();
    state.dao.user().set_banned(user_id, true).await.unwrap();

    let res = app
        .oneshot(post_json(
            "/auth/login",
            json!({"email": "b@example.com", "password": "student-pass"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn refresh_login_rotates_the_cookie() {
    let (app, _state) = test_router().await;

    let res = app
        .clone()
        .oneshot(post_json(
            "/auth/signup",
            json!({"email": "r@example.com", "username": "r", "password": "student-pass"}),
        ))
        .await
        .unwrap();
    let cookie = refresh_cookie(&res);

    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/refreshLogin")
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let rotated = refresh_cookie(&res);
    assert!(rotated.len() > "refresh_token=".len());
    let body = json_body(res).await;
    assert_eq!(body["success"], true);
    assert!(body["access_token"].as_str().is_some());
}

#[tokio::test]
async fn refresh_login_without_cookie_is_rejected() {
    let (app, _state) = test_router().await;

    let res = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/refreshLogin")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_requires_a_token_and_clears_the_cookie() {
    let (app, _state) = test_router().await;

    let res = app
        .clone()
        .oneshot(post_json("/auth/logout", json!({})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let body = signup(&app, "out@example.com", "out").await;
    let token = body["access_token"].as_str().unwrap();

    let res = app
        .oneshot(post_json_bearer("/auth/logout", json!({}), token))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let set_cookie = res
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(set_cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn invalidate_routes_are_admin_only() {
    let (app, state) = test_router().await;
    let body = signup(&app, "s@example.com", "s").await;
    let student_token = body["access_token"].as_str().unwrap().to_string();

    // no token at all
    let res = app
        .clone()
        .oneshot(post_json("/auth/invalidateAllTokens", json!({})))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // student token: blocked with the exact gate message
    let res = app
        .clone()
        .oneshot(post_json_bearer(
            "/auth/invalidateAllTokens",
            json!({}),
            &student_token,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let bytes = body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"Insufficient priviledges");

    let admin_token = seed_admin(&state).await;
    let res = app
        .oneshot(post_json_bearer(
            "/auth/invalidateAllTokens",
            json!({}),
            &admin_token,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn gate_falls_back_to_the_role_table_when_the_token_embeds_no_roles() {
    let (app, state) = test_router().await;
    let admin = state
        .dao
        .user()
        .create_user("bare-admin@example.com", "bare-admin", None)
        .await
        .unwrap();
    state.dao.role().grant(admin.id, Role::Admin).await.unwrap();
    let student = state
        .dao
        .user()
        .create_user("bare-student@example.com", "bare-student", None)
        .await
        .unwrap();
    state.dao.role().grant(student.id, Role::Student).await.unwrap();

    // tokens signed without a roles claim: the gate has to consult the table
    let keys = JwtKeys::from_secret(test_config().auth_token_secret.as_bytes());
    let admin_token =
        encode_token(&keys, &make_claims("campus-test", admin.id, "local", 5, None, None)).unwrap();
    let student_token =
        encode_token(&keys, &make_claims("campus-test", student.id, "local", 5, None, None))
            .unwrap();

    let res = app
        .clone()
        .oneshot(post_json_bearer(
            "/auth/invalidateUserTokens",
            json!({"userId": student.id}),
            &student_token,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let bytes = body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"Insufficient priviledges");

    let res = app
        .oneshot(post_json_bearer(
            "/auth/invalidateUserTokens",
            json!({"userId": student.id}),
            &admin_token,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_revocation_drops_an_active_session() {
    let (app, state) = test_router().await;
    let body = signup(&app, "victim@example.com", "victim").await;
    let student_token = body["access_token"].as_str().unwrap().to_string();
    let student_id = body["user"]["id"].as_i64().unwrap();
    assert!(state.sessions.validate_auth(&student_token).await);

    // cross a second boundary so the revocation watermark lands after iat
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let admin_token = seed_admin(&state).await;
    let res = app
        .clone()
        .oneshot(post_json_bearer(
            "/auth/invalidateUserTokens",
            json!({"userId": student_id}),
            &admin_token,
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    assert!(!state.sessions.validate_auth(&student_token).await);
    let res = app
        .oneshot(post_json_bearer("/auth/logout", json!({}), &student_token))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn password_reset_request_does_not_leak_account_existence() {
    let (app, _state) = test_router().await;

    let res = app
        .oneshot(post_json(
            "/auth/requestPasswordReset",
            json!({"email": "nobody@example.com"}),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await["success"], true);
}

#[tokio::test]
async fn set_password_with_a_bogus_challenge_is_rejected() {
    let (app, _state) = test_router().await;

    let res = app
        .oneshot(post_json(
            "/auth/setPasswordOnReset",
            json!({"id": 12345, "token": "whatever", "password": "new-password-1"}),
        ))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn end_to_end_password_reset_changes_the_login_password() {
    let (app, state) = test_router().await;
    signup(&app, "flow@example.com", "flow").await;

    // drive the flow through the service so the raw token is observable,
    // then finish through the route
    let mailer = Arc::new(campus_server::test_helpers::RecordingMailer::default());
    let flow = campus_server::services::PasswordResetFlow::new(
        &state.dao,
        mailer.clone(),
        "campus-test".into(),
    );
    flow.request("flow@example.com").await.unwrap();
    let mail = mailer.last().unwrap();
    let id = mail.payload["id"].as_i64().unwrap();
    let token = mail.payload["token"].as_str().unwrap().to_string();

    let res = app
        .clone()
        .oneshot(post_json(
            "/auth/setPasswordOnReset",
            json!({"id": id, "token": token, "password": "reset-password-1"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = app
        .oneshot(post_json(
            "/auth/login",
            json!({"email": "flow@example.com", "password": "reset-password-1"}),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}
