mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, assert_redirect, body_json, notice_from, TestApp};

#[tokio::test]
async fn contact_message_is_stored() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let response = app
        .post_form(
            "/contact",
            &[
                ("name", "Visitor"),
                ("email", "visitor@example.com"),
                ("message", "Do you list part-time roles?"),
            ],
            None,
        )
        .await?;
    assert_redirect(&response, "/");
    assert!(notice_from(&response).expect("notice").is_success());
    assert_eq!(app.count_rows("contacts").await?, 1);

    let response = app
        .post_form("/contact", &[("name", "Visitor"), ("message", "hi")], None)
        .await?;
    assert_redirect(&response, "/");
    assert_eq!(notice_from(&response).expect("notice").code, "validation_error");
    assert_eq!(app.count_rows("contacts").await?, 1);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn notice_is_rendered_once_and_cleared() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let response = app
        .get("/login", Some("notice=success:Thanks%20for%20reaching%20out%21"))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let cleared = response
        .headers()
        .get(axum::http::header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    assert!(cleared.is_some_and(|cookie| cookie.starts_with("notice=;")));
    let page = body_json(response).await?;
    assert_eq!(page["page"], "login");
    assert_eq!(page["notice"]["message"], "Thanks for reaching out!");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn health_reports_database() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let response = app.get("/api/health", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await?;
    assert_eq!(body["database"], "ok");

    app.cleanup().await?;
    Ok(())
}
