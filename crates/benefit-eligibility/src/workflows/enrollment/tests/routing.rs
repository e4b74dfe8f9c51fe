use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::workflows::enrollment::renewal::RenewalPolicy;
use crate::workflows::enrollment::repository::HouseholdRepository;
use crate::workflows::enrollment::router::{self, DocumentReplacement};
use crate::workflows::enrollment::EnrollmentService;

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn register_route_creates_household() {
    let (service, repository, _) = build_service();
    let router = router_with_service(service);

    let response = router
        .oneshot(json_request(
            "POST",
            "/api/v1/households",
            json!({ "email": "resident@example.org", "phone": "970-555-0142" }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    let id = payload
        .get("id")
        .and_then(Value::as_str)
        .expect("household id returned");
    assert!(id.starts_with("hh-"));
    let stored = repository.list().expect("list households");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id.0, id);
}

#[tokio::test]
async fn finalize_route_reports_next_step_for_incomplete_application() {
    let (service, _, _) = build_service();
    let id = service.register(contact()).expect("registered").id;
    let router = router_with_service(service);

    let response = router
        .oneshot(empty_request(
            "POST",
            &format!("/api/v1/households/{id}/finalize"),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(response).await;
    assert_eq!(payload.get("next_step"), Some(&json!("address")));
}

#[tokio::test]
async fn finalize_then_dashboard_lists_programs() {
    let (service, _, _) = build_service();
    let id = prepared_household(&service, in_area_address(), &["snap"]);
    let router = router_with_service(service);

    let finalized = router
        .clone()
        .oneshot(empty_request(
            "POST",
            &format!("/api/v1/households/{id}/finalize"),
        ))
        .await
        .expect("route executes");
    assert_eq!(finalized.status(), StatusCode::OK);
    let payload = read_json_body(finalized).await;
    assert_eq!(
        payload
            .pointer("/plan/create")
            .and_then(Value::as_array)
            .map(Vec::len),
        Some(3)
    );

    let dashboard = router
        .oneshot(empty_request(
            "GET",
            &format!("/api/v1/households/{id}/dashboard"),
        ))
        .await
        .expect("route executes");
    assert_eq!(dashboard.status(), StatusCode::OK);
    let payload = read_json_body(dashboard).await;
    let programs = payload
        .get("programs")
        .and_then(Value::as_array)
        .expect("program cards");
    let statuses: Vec<(&str, &str)> = programs
        .iter()
        .map(|card| {
            (
                card.pointer("/result/friendly_name")
                    .or_else(|| card.pointer("/result/program/friendly_name"))
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
                card.get("button_text")
                    .and_then(Value::as_str)
                    .unwrap_or_default(),
            )
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("Connexion", "Apply Now"),
            ("Grocery", "Applied"),
            ("Recreation", "Applied"),
            ("Spin", "Applied"),
        ]
    );
    assert_eq!(payload.get("next_step"), Some(&json!("dashboard")));
}

#[tokio::test]
async fn quick_apply_route_returns_reasons_when_ineligible() {
    let (service, _, _) = build_service();
    let id = prepared_household(&service, in_area_address(), &["medicaid"]);
    service
        .finalize_application(&id, at(2024, 3, 1))
        .expect("finalized");
    let router = router_with_service(service);

    let response = router
        .oneshot(empty_request(
            "POST",
            &format!("/api/v1/households/{id}/programs/recreation/apply"),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(response).await;
    assert_eq!(payload.get("program"), Some(&json!("recreation")));
    assert_eq!(
        payload
            .get("reasons")
            .and_then(Value::as_array)
            .map(Vec::len),
        Some(1)
    );
}

#[tokio::test]
async fn replace_documents_handler_returns_conflict_for_enrolled_program() {
    let (service, _, _) = build_service();
    let id = prepared_household(&service, in_area_address(), &["snap"]);
    service
        .finalize_application(&id, at(2024, 3, 1))
        .expect("finalized");
    service
        .mark_enrolled(&id, &pid("recreation"), at(2024, 3, 5))
        .expect("enrolled");
    let service = Arc::new(service);

    let replacement: DocumentReplacement = serde_json::from_value(json!({
        "documents": [{ "category": "medicaid", "document_path": "docs/medicaid.pdf" }]
    }))
    .expect("replacement payload");
    let response = router::replace_documents_handler::<
        MemoryRepository,
        MemoryNotifier,
        StaticAddressValidator,
    >(State(service.clone()), Path(id.0.clone()), axum::Json(replacement))
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let payload = read_json_body(response).await;
    assert_eq!(
        payload.pointer("/programs/0/program"),
        Some(&json!("recreation"))
    );
    let stored = service.household(&id).expect("household loads");
    assert_eq!(stored.documents[0].category.0, "snap");
}

#[tokio::test]
async fn document_preview_route_leaves_household_unchanged() {
    let (service, repository, _) = build_service();
    let id = prepared_household(&service, in_area_address(), &["snap"]);
    service
        .finalize_application(&id, at(2024, 3, 1))
        .expect("finalized");
    let before = repository.get(&id);
    let router = router_with_service(service);

    let response = router
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/admin/households/{}/documents/preview", id.0),
            json!({
                "documents": [{ "category": "medicaid", "document_path": "docs/medicaid.pdf" }]
            }),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    let removed = payload
        .get("remove")
        .and_then(Value::as_array)
        .expect("remove list");
    assert!(removed.contains(&json!("recreation")));
    assert_eq!(repository.get(&id), before);
}

#[tokio::test]
async fn missing_household_returns_not_found() {
    let (service, _, _) = build_service();

    let response = router::dashboard_handler::<
        MemoryRepository,
        MemoryNotifier,
        StaticAddressValidator,
    >(State(Arc::new(service)), Path("hh-unknown".to_string()))
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_verification_queue_returns_not_found() {
    let (service, _, _) = build_service();
    let router = router_with_service(service);

    let response = router
        .oneshot(empty_request("GET", "/api/v1/admin/verification/later"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn program_update_with_mismatched_name_is_rejected() {
    let (service, _, _) = build_service();
    let grocery = service
        .catalog()
        .program(&pid("grocery"))
        .cloned()
        .expect("grocery present");
    let router = router_with_service(service);

    let response = router
        .oneshot(json_request(
            "PUT",
            "/api/v1/admin/programs/spin",
            serde_json::to_value(&grocery).expect("program serializes"),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn removing_enrolled_program_returns_conflict() {
    let (service, _, _) = build_service();
    let id = prepared_household(&service, in_area_address(), &["snap"]);
    service
        .finalize_application(&id, at(2024, 3, 1))
        .expect("finalized");
    service
        .mark_enrolled(&id, &pid("spin"), at(2024, 3, 5))
        .expect("enrolled");
    let router = router_with_service(service);

    let response = router
        .oneshot(empty_request("DELETE", "/api/v1/admin/programs/spin"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn sweep_route_returns_report() {
    let (service, repository, notifier) = build_service();
    repository.put(record_with("hh-due", Some(at(2020, 6, 1)), Vec::new()));
    let router = router_with_service(service);

    let response = router
        .oneshot(empty_request("POST", "/api/v1/admin/renewals/sweep"))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload.get("notified"), Some(&json!(["hh-due"])));
    assert_eq!(notifier.notices().len(), 1);
}

#[tokio::test]
async fn repository_outage_returns_internal_error() {
    let service = Arc::new(EnrollmentService::new(
        Arc::new(UnavailableRepository),
        Arc::new(MemoryNotifier::default()),
        Arc::new(StaticAddressValidator),
        catalog(),
        RenewalPolicy::default(),
    ));

    let response = router::register_handler::<
        UnavailableRepository,
        MemoryNotifier,
        StaticAddressValidator,
    >(State(service), axum::Json(contact()))
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let payload = read_json_body(response).await;
    assert!(payload
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .contains("offline"));
}
