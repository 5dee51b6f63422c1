use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::error;

use super::{Actor, IfMatch, WebError, WebResult, state::AppState};
use crate::core::RecordId;
use crate::domain::{Client, FitnessCategory};
use crate::record::VersionToken;
use crate::spreadsheet::XLSX_CONTENT_TYPE;
use crate::service::report::REPORT_FILE_STEM;
use crate::service::{
    CategoryDetails, CategoryListItem, ClientForm, EmailRequest, FitnessCategoryForm,
    ImportSummary, MembershipTypeSummary, Page, PageRequest, Upload,
};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct ApiMessage {
    pub message: String,
}

fn ok<T>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { data })
}

#[derive(Debug, Deserialize)]
pub struct ClientEditBody {
    #[serde(flatten)]
    pub form: ClientForm,
    pub row_version: Option<VersionToken>,
}

#[derive(Debug, Deserialize)]
pub struct CategoryEditBody {
    #[serde(flatten)]
    pub form: FitnessCategoryForm,
    pub row_version: Option<VersionToken>,
}

#[derive(Debug, Serialize)]
pub struct EmailSent {
    pub message: String,
    pub recipients: usize,
}

#[derive(Debug, Serialize)]
pub struct ImportResult {
    pub message: String,
    #[serde(flatten)]
    pub summary: ImportSummary,
}

pub async fn healthcheck() -> Json<ApiResponse<ApiMessage>> {
    ok(ApiMessage {
        message: "ok".to_string(),
    })
}

pub async fn list_clients(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Query(page): Query<PageRequest>,
) -> WebResult<Json<ApiResponse<Page<Client>>>> {
    Ok(ok(state.clients.index(&actor, page).await?))
}

pub async fn get_client(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<RecordId>,
) -> WebResult<Json<ApiResponse<Client>>> {
    Ok(ok(state.clients.details(&actor, id).await?))
}

pub async fn create_client(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(form): Json<ClientForm>,
) -> WebResult<(StatusCode, Json<ApiResponse<Client>>)> {
    let client = state.clients.create(&actor, form).await?;
    Ok((StatusCode::CREATED, ok(client)))
}

pub async fn update_client(
    State(state): State<AppState>,
    Actor(actor): Actor,
    if_match: IfMatch,
    Path(id): Path<RecordId>,
    Json(body): Json<ClientEditBody>,
) -> WebResult<Json<ApiResponse<Client>>> {
    let token = if_match.resolve(body.row_version)?;
    Ok(ok(state.clients.edit(&actor, id, body.form, token).await?))
}

pub async fn delete_client(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<RecordId>,
) -> WebResult<StatusCode> {
    state.clients.delete(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn email_clients(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(request): Json<EmailRequest>,
) -> WebResult<Json<ApiResponse<EmailSent>>> {
    let recipients = state.clients.email(&actor, request).await?;
    Ok(ok(EmailSent {
        message: format!("Message sent to {recipients} Client(s)."),
        recipients,
    }))
}

pub async fn membership_summary(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Query(page): Query<PageRequest>,
) -> WebResult<Json<ApiResponse<Page<MembershipTypeSummary>>>> {
    Ok(ok(state.clients.membership_type_summary(&actor, page).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    /// `csv` for a CSV download; anything else gets the workbook.
    pub format: Option<String>,
}

/// The summary worksheet as an `.xlsx` download, or CSV on request.
pub async fn membership_report(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Query(query): Query<ReportQuery>,
) -> WebResult<Response> {
    let sheet = state.clients.membership_type_report(&actor).await?;

    let (content_type, extension, body) = if query.format.as_deref() == Some("csv") {
        ("text/csv; charset=utf-8", "csv", sheet.to_csv().into_bytes())
    } else {
        let bytes = sheet.to_xlsx().map_err(|e| {
            error!(error = %e, "membership report workbook failed");
            WebError::input("Could not build and download the file.")
        })?;
        (XLSX_CONTENT_TYPE, "xlsx", bytes)
    };

    let headers = [
        (header::CONTENT_TYPE, content_type.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{REPORT_FILE_STEM}.{extension}\""),
        ),
    ];
    Ok((headers, body).into_response())
}

pub async fn list_categories(
    State(state): State<AppState>,
    Actor(actor): Actor,
) -> WebResult<Json<ApiResponse<Vec<CategoryListItem>>>> {
    Ok(ok(state.categories.index(&actor).await?))
}

pub async fn get_category(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<RecordId>,
) -> WebResult<Json<ApiResponse<CategoryDetails>>> {
    Ok(ok(state.categories.details(&actor, id).await?))
}

pub async fn create_category(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Json(form): Json<FitnessCategoryForm>,
) -> WebResult<(StatusCode, Json<ApiResponse<FitnessCategory>>)> {
    let category = state.categories.create(&actor, form).await?;
    Ok((StatusCode::CREATED, ok(category)))
}

pub async fn update_category(
    State(state): State<AppState>,
    Actor(actor): Actor,
    if_match: IfMatch,
    Path(id): Path<RecordId>,
    Json(body): Json<CategoryEditBody>,
) -> WebResult<Json<ApiResponse<FitnessCategory>>> {
    let token = if_match.resolve(body.row_version)?;
    Ok(ok(state.categories.edit(&actor, id, body.form, token).await?))
}

pub async fn delete_category(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Path(id): Path<RecordId>,
) -> WebResult<StatusCode> {
    state.categories.delete(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Raw upload body; the `Content-Type` header picks the reader.
pub async fn import_exercises(
    State(state): State<AppState>,
    Actor(actor): Actor,
    headers: HeaderMap,
    body: Bytes,
) -> WebResult<Json<ApiResponse<ImportResult>>> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let upload = Upload::new(content_type, body.to_vec());

    let summary = state.categories.import_exercises(&actor, &upload).await?;
    Ok(ok(ImportResult {
        message: summary.message(),
        summary,
    }))
}
