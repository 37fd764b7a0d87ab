//! HTTP binding tests driven through the router with `tower::ServiceExt`.

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use fhir_upsert_server::{AppConfig, build_app};
use serde_json::{Value, json};
use tower::ServiceExt;

async fn send(app: &Router, uri: &str, body: Value) -> (StatusCode, header::HeaderMap, Value) {
    let request = Request::builder()
        .method("PUT")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/fhir+json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, json)
}

fn patient(mrn: &str) -> Value {
    json!({
        "resourceType": "Patient",
        "identifier": [{"system": "urn:mrn", "value": mrn}],
        "name": [{"family": "Chalmers"}]
    })
}

#[tokio::test]
async fn healthz_reports_store() {
    let app = build_app(&AppConfig::default());
    let response = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "in-memory-dashmap");
}

#[tokio::test]
async fn conditional_put_creates_then_updates() {
    let app = build_app(&AppConfig::default());

    let (status, headers, body) =
        send(&app, "/Patient?identifier=urn:mrn%7C123", patient("123")).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_str().unwrap().to_string();
    let first_etag = headers[header::ETAG].to_str().unwrap().to_string();
    assert!(first_etag.starts_with("W/\""));
    let location = headers[header::LOCATION].to_str().unwrap();
    assert!(location.starts_with(&format!("Patient/{id}/_history/")));

    let (status, headers, body) =
        send(&app, "/Patient?identifier=urn:mrn%7C123", patient("123")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.as_str());
    assert_ne!(headers[header::ETAG].to_str().unwrap(), first_etag);
    assert_eq!(
        body["meta"]["versionId"].as_str().map(|v| format!("W/\"{v}\"")),
        Some(headers[header::ETAG].to_str().unwrap().to_string())
    );
}

#[tokio::test]
async fn mismatched_id_is_bad_request() {
    let app = build_app(&AppConfig::default());
    send(&app, "/Patient?identifier=urn:mrn%7C123", patient("123")).await;

    let mut body = patient("123");
    body["id"] = json!("someone-else");
    let (status, _, outcome) = send(&app, "/Patient?identifier=urn:mrn%7C123", body).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(outcome["resourceType"], "OperationOutcome");
    assert!(
        outcome["issue"][0]["diagnostics"]
            .as_str()
            .unwrap()
            .contains("someone-else")
    );
}

#[tokio::test]
async fn ambiguous_criteria_are_precondition_failed() {
    let app = build_app(&AppConfig::default());
    let mut first = patient("1");
    first["active"] = json!(true);
    let mut second = patient("2");
    second["active"] = json!(true);
    send(&app, "/Patient?identifier=urn:mrn%7C1", first).await;
    send(&app, "/Patient?identifier=urn:mrn%7C2", second).await;

    let (status, _, outcome) = send(&app, "/Patient?active=true", patient("3")).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(outcome["issue"][0]["code"], "multiple-matches");
}

#[tokio::test]
async fn result_parameters_do_not_narrow_the_match() {
    let app = build_app(&AppConfig::default());
    let (status, _, created) = send(&app, "/Patient?identifier=urn:mrn%7C1", patient("1")).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, updated) = send(
        &app,
        "/Patient?identifier=urn:mrn%7C1&_count=1&_sort=name",
        patient("1"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["id"], created["id"]);
}

#[tokio::test]
async fn unsupported_modifiers_are_bad_request() {
    let app = build_app(&AppConfig::default());
    let (status, _, outcome) = send(&app, "/Patient?name:contains=chal", patient("1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(outcome["resourceType"], "OperationOutcome");
}

#[tokio::test]
async fn update_as_create_can_be_disabled() {
    let mut cfg = AppConfig::default();
    cfg.conditional.allow_update_as_create = false;
    let app = build_app(&cfg);

    let mut body = patient("123");
    body["id"] = json!("42");
    let (status, _, outcome) = send(&app, "/Patient?identifier=urn:mrn%7C123", body).await;

    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(outcome["issue"][0]["code"], "not-supported");
}

#[tokio::test]
async fn missing_criteria_and_bad_bodies_are_rejected() {
    let app = build_app(&AppConfig::default());

    let (status, _, outcome) = send(&app, "/Patient", patient("123")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(outcome["issue"][0]["code"], "invalid");

    let (status, _, _) = send(&app, "/Observation?code=1234-5", patient("123")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method("PUT")
        .uri("/Patient?identifier=x")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unsupported_criteria_are_bad_request() {
    let app = build_app(&AppConfig::default());

    let (status, _, _) = send(&app, "/Patient?name=Chalmers", patient("1")).await;
    assert_eq!(status, StatusCode::CREATED);

    // Once a stored Patient carries a complex `name`, the same criteria cannot be evaluated.
    let (status, _, outcome) = send(&app, "/Patient?name=Chalmers", patient("1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(outcome["resourceType"], "OperationOutcome");

    let (status, _, _) = send(
        &app,
        "/Patient?_lastUpdated=gt2020-01-01&identifier=urn:mrn%7C1",
        patient("1"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
