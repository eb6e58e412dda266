//! End-to-end tests of the back-office login flow.

use std::time::Duration;

use campaign_core::Role;
use campaign_integration_tests::{PASSWORD, TestContext};
use reqwest::StatusCode;

fn location(resp: &reqwest::Response) -> &str {
    resp.headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_admin_signs_in_and_sees_dashboard() {
    let ctx = TestContext::start().await;
    ctx.seed("admin@example.com", "Marie Admin", Some(Role::Admin));
    let client = TestContext::client();

    let resp = ctx.login(&client, "admin@example.com", PASSWORD).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/admin/dashboard");

    let resp = client
        .get(ctx.url("/admin/dashboard"))
        .send()
        .await
        .expect("Failed to get dashboard");
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.expect("Failed to read response");
    assert!(body.contains("Connecté en tant que Marie Admin"));
    assert!(body.contains("Messages citoyens"));
}

#[tokio::test]
async fn test_login_page_redirects_signed_in_admin() {
    let ctx = TestContext::start().await;
    ctx.seed("admin@example.com", "", Some(Role::Admin));
    let client = TestContext::client();

    ctx.login(&client, "admin@example.com", PASSWORD).await;

    let resp = client
        .get(ctx.url("/admin/login"))
        .send()
        .await
        .expect("Failed to get login page");
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/admin/dashboard");
}

#[tokio::test]
async fn test_editor_is_denied_and_signed_out() {
    let ctx = TestContext::start().await;
    ctx.seed("editor@example.com", "Paul", Some(Role::Editor));
    let client = TestContext::client();

    let resp = ctx.login(&client, "editor@example.com", PASSWORD).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body = resp.text().await.expect("Failed to read response");
    assert!(body.contains("rôle : editor"));
    assert!(ctx.backend.sign_out_count() >= 1);

    let resp = client
        .get(ctx.url("/admin/dashboard"))
        .send()
        .await
        .expect("Failed to get dashboard");
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/admin/login");
}

#[tokio::test]
async fn test_identity_without_profile_is_denied() {
    let ctx = TestContext::start().await;
    ctx.seed("ghost@example.com", "", None);
    let client = TestContext::client();

    let resp = ctx.login(&client, "ghost@example.com", PASSWORD).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body = resp.text().await.expect("Failed to read response");
    assert!(body.contains("Profil utilisateur introuvable"));
}

#[tokio::test]
async fn test_wrong_password_keeps_form() {
    let ctx = TestContext::start().await;
    ctx.seed("admin@example.com", "", Some(Role::Admin));
    let client = TestContext::client();

    let resp = ctx.login(&client, "admin@example.com", "wrong-password").await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = resp.text().await.expect("Failed to read response");
    assert!(body.contains("Email ou mot de passe incorrect"));
    assert!(body.contains("admin@example.com"));
}

#[tokio::test]
async fn test_invalid_email_is_rejected() {
    let ctx = TestContext::start().await;
    let client = TestContext::client();

    let resp = ctx.login(&client, "not-an-email", PASSWORD).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body = resp.text().await.expect("Failed to read response");
    assert!(body.contains("Email ou mot de passe incorrect"));
}

#[tokio::test]
async fn test_single_label_domain_signs_in() {
    let ctx = TestContext::start().await;
    ctx.seed("admin@localhost", "Local Admin", Some(Role::Admin));
    let client = TestContext::client();

    let resp = ctx.login(&client, "admin@localhost", PASSWORD).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/admin/dashboard");
}

#[tokio::test]
async fn test_dashboard_shows_loading_page_while_session_resolves() {
    let ctx = TestContext::start().await;
    ctx.seed("admin@example.com", "Marie Admin", Some(Role::Admin));
    let client = TestContext::client();

    // Establish the visitor cookie before profile lookups slow down
    let resp = client
        .get(ctx.url("/admin/login"))
        .send()
        .await
        .expect("Failed to get login page");
    assert_eq!(resp.status(), StatusCode::OK);

    ctx.backend.delay_queries(Some(Duration::from_secs(4)));

    let login = {
        let client = client.clone();
        let url = ctx.url("/admin/login");
        tokio::spawn(async move {
            client
                .post(url)
                .form(&[("email", "admin@example.com"), ("password", PASSWORD)])
                .send()
                .await
                .expect("Failed to submit login form")
        })
    };
    tokio::time::sleep(Duration::from_millis(300)).await;

    let resp = client
        .get(ctx.url("/admin/dashboard"))
        .send()
        .await
        .expect("Failed to get dashboard");
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().get("location").is_none());
    let body = resp.text().await.expect("Failed to read response");
    assert!(body.contains("http-equiv=\"refresh\""));

    let resp = login.await.expect("Login task panicked");
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_unauthenticated_dashboard_redirects_to_login() {
    let ctx = TestContext::start().await;
    let client = TestContext::client();

    for path in ["/admin/dashboard", "/", "/admin"] {
        let resp = client
            .get(ctx.url(path))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(resp.status(), StatusCode::SEE_OTHER, "{path}");
    }

    let resp = client
        .get(ctx.url("/admin/dashboard"))
        .send()
        .await
        .expect("Failed to get dashboard");
    assert_eq!(location(&resp), "/admin/login");
}

#[tokio::test]
async fn test_logout_returns_to_login() {
    let ctx = TestContext::start().await;
    ctx.seed("admin@example.com", "", Some(Role::Admin));
    let client = TestContext::client();

    ctx.login(&client, "admin@example.com", PASSWORD).await;

    let resp = client
        .post(ctx.url("/admin/logout"))
        .send()
        .await
        .expect("Failed to log out");
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/admin/login");

    let resp = client
        .get(ctx.url("/admin/dashboard"))
        .send()
        .await
        .expect("Failed to get dashboard");
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/admin/login");
}

#[tokio::test]
async fn test_visitors_do_not_share_sessions() {
    let ctx = TestContext::start().await;
    ctx.seed("admin@example.com", "", Some(Role::Admin));
    let admin = TestContext::client();
    let stranger = TestContext::client();

    ctx.login(&admin, "admin@example.com", PASSWORD).await;

    let resp = stranger
        .get(ctx.url("/admin/dashboard"))
        .send()
        .await
        .expect("Failed to get dashboard");
    assert_eq!(location(&resp), "/admin/login");
}

#[tokio::test]
async fn test_pages_carry_security_headers() {
    let ctx = TestContext::start().await;
    let client = TestContext::client();

    let resp = client
        .get(ctx.url("/admin/login"))
        .send()
        .await
        .expect("Failed to get login page");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-frame-options"], "DENY");
    assert!(resp.headers().contains_key("content-security-policy"));
}

#[tokio::test]
async fn test_health_endpoints() {
    let ctx = TestContext::start().await;
    let client = TestContext::client();

    let resp = client
        .get(ctx.url("/health"))
        .send()
        .await
        .expect("Failed to get health");
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .get(ctx.url("/health/ready"))
        .send()
        .await
        .expect("Failed to get readiness");
    assert_eq!(resp.status(), StatusCode::OK);
}
