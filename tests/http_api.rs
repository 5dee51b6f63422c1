use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use axum::{
    body::{Body, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use gymdesk::seed::seed_sample_data;
use gymdesk::service::{
    ClientService, EmailMessage, EmailRequest, EmailSender, LogEmailSender, NotificationError,
};
use gymdesk::spreadsheet::{Worksheet, XLSX_CONTENT_TYPE};
use gymdesk::{
    ActorContext, AppState, GymError, MemoryStore, Role, Store, build_router, gym_catalog,
};
use serde_json::{Value, json};
use tower::ServiceExt;

const ADMIN: (&str, &str) = ("admin", "Admin");
const STAFF: (&str, &str) = ("sam", "Staff");

/// A mail transport that is always down.
#[derive(Default)]
struct DownMailer {
    attempts: AtomicUsize,
}

#[async_trait]
impl EmailSender for DownMailer {
    async fn send_to_many(&self, _message: &EmailMessage) -> Result<(), NotificationError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(NotificationError::Transport("connection refused".to_string()))
    }
}

async fn seeded_store() -> Arc<dyn Store> {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new(gym_catalog().unwrap()));
    seed_sample_data(store.as_ref()).await.unwrap();
    store
}

async fn app() -> axum::Router {
    build_router(AppState::new(seeded_store().await, Arc::new(LogEmailSender), 10))
}

fn request(method: Method, uri: &str, user: Option<(&str, &str)>) -> axum::http::request::Builder {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((name, roles)) = user {
        builder = builder
            .header("x-user-name", name)
            .header("x-user-roles", roles);
    }
    builder
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("response expected");
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body should be readable");

    if body.is_empty() {
        return (status, Value::Null);
    }

    let json = serde_json::from_slice::<Value>(&body).expect("body should be valid JSON");
    (status, json)
}

async fn send_json(
    app: &axum::Router,
    method: Method,
    uri: &str,
    user: (&str, &str),
    payload: Value,
) -> (StatusCode, Value) {
    let request = request(method, uri, Some(user))
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request should build");
    send(app, request).await
}

async fn send_empty(
    app: &axum::Router,
    method: Method,
    uri: &str,
    user: Option<(&str, &str)>,
) -> (StatusCode, Value) {
    let request = request(method, uri, user)
        .body(Body::empty())
        .expect("request should build");
    send(app, request).await
}

async fn category_id(app: &axum::Router, name: &str) -> (i64, String) {
    let (status, body) = send_empty(app, Method::GET, "/api/fitness-categories", Some(STAFF)).await;
    assert_eq!(status, StatusCode::OK);
    let item = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|item| item["category"] == name)
        .expect("seeded category");
    (
        item["id"].as_i64().unwrap(),
        item["row_version"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn health_is_public() {
    let app = app().await;
    let (status, body) = send_empty(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["message"], "ok");
}

#[tokio::test]
async fn clients_are_paged_and_need_a_user() {
    let app = app().await;

    let (status, body) = send_empty(&app, Method::GET, "/api/clients?page=1&page_size=3", Some(STAFF)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 5);
    assert_eq!(body["data"]["page_size"], 3);
    assert_eq!(body["data"]["total_pages"], 2);
    assert_eq!(body["data"]["items"][0]["first_name"], "Barney");

    let (status, body) = send_empty(&app, Method::GET, "/api/clients", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");
}

#[tokio::test]
async fn client_role_only_sees_their_own_record() {
    let app = app().await;
    let request = request(Method::GET, "/api/clients", Some(("fred", "Client")))
        .header("x-user-email", "fflintstone@outlook.com")
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["email"], "fflintstone@outlook.com");
}

#[tokio::test]
async fn invalid_client_form_is_unprocessable() {
    let app = app().await;
    let (status, body) = send_json(
        &app,
        Method::POST,
        "/api/clients",
        STAFF,
        json!({ "first_name": "Dino" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "validation_error");
    assert!(
        body["errors"]
            .as_array()
            .unwrap()
            .iter()
            .any(|e| e["field"] == "last_name")
    );
}

#[tokio::test]
async fn stale_category_edit_is_a_conflict() {
    let app = app().await;
    let (id, token) = category_id(&app, "Flexibility").await;
    let uri = format!("/api/fitness-categories/{id}");

    let (status, body) = send_json(
        &app,
        Method::PUT,
        &uri,
        STAFF,
        json!({ "category": "Stretching", "row_version": token }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["category"], "Stretching");

    let request = request(Method::PUT, &uri, Some(ADMIN))
        .header("content-type", "application/json")
        .header(header::IF_MATCH, format!("\"{token}\""))
        .body(Body::from(json!({ "category": "Mobility" }).to_string()))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "version_conflict");
    assert_eq!(body["conflict"]["fields"][0]["field"], "category");
    assert_eq!(body["conflict"]["fields"][0]["current_display"], "Stretching");
}

#[tokio::test]
async fn edit_without_a_token_is_a_bad_request() {
    let app = app().await;
    let (id, _) = category_id(&app, "Core").await;
    let (status, body) = send_json(
        &app,
        Method::PUT,
        &format!("/api/fitness-categories/{id}"),
        ADMIN,
        json!({ "category": "Abs" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");
}

#[tokio::test]
async fn duplicate_category_reports_the_field() {
    let app = app().await;
    let (status, body) = send_json(
        &app,
        Method::POST,
        "/api/fitness-categories",
        STAFF,
        json!({ "category": "Cardio" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "constraint_violation");
    assert_eq!(body["field"], "category");
}

#[tokio::test]
async fn category_with_classes_cannot_be_deleted() {
    let app = app().await;
    let (id, _) = category_id(&app, "Cardio").await;
    let uri = format!("/api/fitness-categories/{id}");

    let (status, body) = send_empty(&app, Method::DELETE, &uri, Some(ADMIN)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "restricted_delete");

    let (status, body) = send_empty(&app, Method::GET, &uri, Some(STAFF)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body["data"]["exercises"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn import_takes_a_raw_csv_body() {
    let app = app().await;
    let request = request(Method::POST, "/api/fitness-categories/import", Some(ADMIN))
        .header("content-type", "text/csv")
        .body(Body::from("Exercise,FitnessCategory\nKettlebell Swing,Strength\nPlank,Core\n"))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["success_count"], 1);
    assert_eq!(body["data"]["error_count"], 1);
    assert_eq!(
        body["data"]["message"],
        "Finished Importing 2 Records with 1 inserted and 1 rejected."
    );
}

#[tokio::test]
async fn email_returns_the_recipient_count() {
    let app = app().await;
    let (status, body) = send_json(
        &app,
        Method::POST,
        "/api/clients/email",
        ("sue", "Supervisor"),
        json!({ "selected": [1, 2], "subject": "Holiday hours", "content": "Closed Monday." }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["recipients"], 2);
    assert_eq!(body["data"]["message"], "Message sent to 2 Client(s).");

    let (status, _) = send_json(
        &app,
        Method::POST,
        "/api/clients/email",
        ("sue", "Supervisor"),
        json!({ "selected": [1], "subject": "", "content": "x" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

async fn download(app: &axum::Router, uri: &str, user: (&str, &str)) -> (StatusCode, HeaderMap, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(request(Method::GET, uri, Some(user)).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

#[tokio::test]
async fn failed_email_reports_the_intended_recipients() {
    let store = seeded_store().await;
    let mailer = Arc::new(DownMailer::default());
    let service = ClientService::new(store.clone(), mailer.clone());
    let supervisor = ActorContext::user("sue").with_role(Role::Supervisor);
    let request = EmailRequest {
        selected: vec![1, 2, 3],
        subject: "Holiday hours".to_string(),
        content: "Closed Monday.".to_string(),
    };

    let err = service.email(&supervisor, request).await.unwrap_err();
    assert!(matches!(err, GymError::NotificationDispatchFailure { recipients: 3 }));
    assert_eq!(
        err.to_string(),
        "Error: Could not send email message to the 3 Clients."
    );
    assert_eq!(mailer.attempts.load(Ordering::SeqCst), 1);

    let app = build_router(AppState::new(store, mailer.clone(), 10));
    let (status, body) = send_json(
        &app,
        Method::POST,
        "/api/clients/email",
        ("sue", "Supervisor"),
        json!({ "selected": [1, 2], "subject": "Holiday hours", "content": "Closed Monday." }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "notification_failed");
    assert_eq!(
        body["error"],
        "Error: Could not send email message to the 2 Clients."
    );
    assert_eq!(mailer.attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn membership_report_downloads_as_a_workbook() {
    let app = app().await;
    let (status, headers, body) = download(&app, "/api/clients/membership-report", ADMIN).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], XLSX_CONTENT_TYPE);
    assert!(
        headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("MembershipTypeReport.xlsx")
    );

    let sheet = Worksheet::from_workbook(&body).unwrap();
    assert_eq!(sheet.name(), "MembershipTypes");
    assert_eq!(sheet.text(1, 1), "Membership Type Summary");
    assert_eq!(sheet.text(3, 1), "Membership Type");
    assert_eq!(sheet.text(4, 1), "Basic");
    assert_eq!(sheet.text(7, 1), "Totals:");
    assert_eq!(sheet.text(6, 1), "Student");
    assert_eq!(sheet.text(7, 6), "2050");

    let (status, _, _) = download(&app, "/api/clients/membership-report", STAFF).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn membership_report_can_be_csv() {
    let app = app().await;
    let (status, headers, body) =
        download(&app, "/api/clients/membership-report?format=csv", ADMIN).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "text/csv; charset=utf-8");
    assert!(
        headers[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .contains("MembershipTypeReport.csv")
    );
    let text = String::from_utf8(body).unwrap();
    assert!(text.starts_with("Membership Type Summary"));
    assert!(text.contains("Totals:"));
}

#[tokio::test]
async fn membership_summary_groups_paid_clients() {
    let app = app().await;
    let (status, body) = send_empty(&app, Method::GET, "/api/clients/membership-summary", Some(ADMIN)).await;
    assert_eq!(status, StatusCode::OK);

    let items = body["data"]["items"].as_array().unwrap();
    let names: Vec<&str> = items.iter().map(|i| i["membership_type"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["Basic", "Premium", "Student"]);
    assert_eq!(items[1]["number_of_clients"], 2);
    assert_eq!(items[1]["total_fees"], 1450.0);
}
