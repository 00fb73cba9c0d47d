//! Integration tests for the synchronous `/api/v1/patch` endpoint.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;

use common::{body_json, post_json};
use pagesmith_db::MemoryStore;

fn app() -> axum::Router {
    common::build_test_app(Arc::new(MemoryStore::new()))
}

#[tokio::test]
async fn applies_ops_and_reports_changes() {
    let response = post_json(
        app(),
        "/api/v1/patch",
        &json!({
            "html": "<body><nav>h</nav><main><h1>Old</h1></main></body>",
            "css": "",
            "ops": [
                {"op": "replace_text", "selector": "h1", "text": "New"},
                {"op": "replace_text", "selector": "nav", "text": "x"},
                {"op": "add_class", "selector": "h1", "classes": "big"},
                {"op": "teleport", "selector": "h1"}
            ]
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(
        json["html"],
        r#"<body><nav>h</nav><main><h1 class="big">New</h1></main></body>"#
    );
    assert_eq!(json["changedCount"], 2);
    assert_eq!(json["appliedLog"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn max_ops_in_the_body_overrides_the_default() {
    let response = post_json(
        app(),
        "/api/v1/patch",
        &json!({
            "html": "<body><p>1</p><p>2</p><p>3</p></body>",
            "ops": [{"op": "replace_text", "selector": "p", "text": "x"}],
            "maxOps": 2
        }),
    )
    .await;
    let json = body_json(response).await;
    assert_eq!(json["changedCount"], 2);
    assert_eq!(json["html"], "<body><p>x</p><p>x</p><p>3</p></body>");
}

#[tokio::test]
async fn unparseable_page_is_a_parse_error() {
    let response = post_json(
        app(),
        "/api/v1/patch",
        &json!({"html": "just text", "ops": []}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "PARSE_ERROR");
}

#[tokio::test]
async fn empty_html_is_a_validation_error() {
    let response = post_json(app(), "/api/v1/patch", &json!({"html": ""})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}
