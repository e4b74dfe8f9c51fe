use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::catalog::CatalogError;
use super::domain::{
    ApplicationStep, ContactInfo, EligibilityCategoryId, EligibilityDocument, HouseholdId,
    HouseholdMember, HouseholdProfile, IqProgram, ProgramId, RawAddress,
};
use super::repository::{AddressValidator, HouseholdRepository, Notifier, RepositoryError};
use super::service::{EnrollmentService, EnrollmentServiceError};
use super::verification::VerificationQueue;

type SharedService<R, N, V> = Arc<EnrollmentService<R, N, V>>;

/// Router builder exposing household intake, dashboard, and staff endpoints.
pub fn enrollment_router<R, N, V>(service: SharedService<R, N, V>) -> Router
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    Router::new()
        .route("/api/v1/households", post(register_handler::<R, N, V>))
        .route(
            "/api/v1/households/:household_id",
            get(household_handler::<R, N, V>),
        )
        .route(
            "/api/v1/households/:household_id/address",
            put(address_handler::<R, N, V>),
        )
        .route(
            "/api/v1/households/:household_id/profile",
            put(profile_handler::<R, N, V>),
        )
        .route(
            "/api/v1/households/:household_id/members",
            put(members_handler::<R, N, V>),
        )
        .route(
            "/api/v1/households/:household_id/documents",
            put(select_documents_handler::<R, N, V>),
        )
        .route(
            "/api/v1/households/:household_id/documents/:category",
            put(upload_handler::<R, N, V>),
        )
        .route(
            "/api/v1/households/:household_id/finalize",
            post(finalize_handler::<R, N, V>),
        )
        .route(
            "/api/v1/households/:household_id/renewal/steps",
            post(renewal_step_handler::<R, N, V>),
        )
        .route(
            "/api/v1/households/:household_id/renewal",
            post(renew_handler::<R, N, V>),
        )
        .route(
            "/api/v1/households/:household_id/programs/:program_name/apply",
            post(quick_apply_handler::<R, N, V>),
        )
        .route(
            "/api/v1/households/:household_id/dashboard",
            get(dashboard_handler::<R, N, V>),
        )
        .route(
            "/api/v1/admin/households/:household_id/programs/:program_name/enroll",
            post(enroll_handler::<R, N, V>),
        )
        .route(
            "/api/v1/admin/households/:household_id/income-verification",
            put(income_verification_handler::<R, N, V>),
        )
        .route(
            "/api/v1/admin/households/:household_id/awaiting-response",
            put(awaiting_response_handler::<R, N, V>),
        )
        .route(
            "/api/v1/admin/households/:household_id/city-coverage",
            put(city_coverage_handler::<R, N, V>),
        )
        .route(
            "/api/v1/admin/households/:household_id/documents",
            put(replace_documents_handler::<R, N, V>),
        )
        .route(
            "/api/v1/admin/households/:household_id/documents/preview",
            post(preview_documents_handler::<R, N, V>),
        )
        .route(
            "/api/v1/admin/households/:household_id/reconcile",
            post(reconcile_handler::<R, N, V>),
        )
        .route(
            "/api/v1/admin/verification/:queue",
            get(verification_handler::<R, N, V>),
        )
        .route("/api/v1/admin/programs", post(add_program_handler::<R, N, V>))
        .route(
            "/api/v1/admin/programs/:program_name",
            put(update_program_handler::<R, N, V>).delete(remove_program_handler::<R, N, V>),
        )
        .route(
            "/api/v1/admin/renewals",
            get(notification_status_handler::<R, N, V>),
        )
        .route(
            "/api/v1/admin/renewals/sweep",
            post(sweep_handler::<R, N, V>),
        )
        .with_state(service)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSelection {
    pub categories: Vec<EligibilityCategoryId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentUpload {
    pub document_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalStepRequest {
    pub step: ApplicationStep,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomeVerificationRequest {
    pub verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwaitingResponseRequest {
    pub awaiting: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityCoverageRequest {
    pub is_city_covered: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentReplacement {
    pub documents: Vec<EligibilityDocument>,
}

pub(crate) async fn register_handler<R, N, V>(
    State(service): State<SharedService<R, N, V>>,
    axum::Json(contact): axum::Json<ContactInfo>,
) -> Response
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    respond(StatusCode::CREATED, service.register(contact))
}

pub(crate) async fn household_handler<R, N, V>(
    State(service): State<SharedService<R, N, V>>,
    Path(household_id): Path<String>,
) -> Response
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    respond(StatusCode::OK, service.household(&HouseholdId(household_id)))
}

pub(crate) async fn address_handler<R, N, V>(
    State(service): State<SharedService<R, N, V>>,
    Path(household_id): Path<String>,
    axum::Json(address): axum::Json<RawAddress>,
) -> Response
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    respond(
        StatusCode::OK,
        service.record_address(&HouseholdId(household_id), address),
    )
}

pub(crate) async fn profile_handler<R, N, V>(
    State(service): State<SharedService<R, N, V>>,
    Path(household_id): Path<String>,
    axum::Json(profile): axum::Json<HouseholdProfile>,
) -> Response
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    respond(
        StatusCode::OK,
        service.record_profile(&HouseholdId(household_id), profile),
    )
}

pub(crate) async fn members_handler<R, N, V>(
    State(service): State<SharedService<R, N, V>>,
    Path(household_id): Path<String>,
    axum::Json(members): axum::Json<Vec<HouseholdMember>>,
) -> Response
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    respond(
        StatusCode::OK,
        service.record_members(&HouseholdId(household_id), members),
    )
}

pub(crate) async fn select_documents_handler<R, N, V>(
    State(service): State<SharedService<R, N, V>>,
    Path(household_id): Path<String>,
    axum::Json(selection): axum::Json<DocumentSelection>,
) -> Response
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    respond(
        StatusCode::OK,
        service.select_documents(&HouseholdId(household_id), selection.categories),
    )
}

pub(crate) async fn upload_handler<R, N, V>(
    State(service): State<SharedService<R, N, V>>,
    Path((household_id, category)): Path<(String, String)>,
    axum::Json(upload): axum::Json<DocumentUpload>,
) -> Response
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    respond(
        StatusCode::OK,
        service.record_upload(
            &HouseholdId(household_id),
            &EligibilityCategoryId(category),
            upload.document_path,
        ),
    )
}

pub(crate) async fn finalize_handler<R, N, V>(
    State(service): State<SharedService<R, N, V>>,
    Path(household_id): Path<String>,
) -> Response
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    respond(
        StatusCode::OK,
        service.finalize_application(&HouseholdId(household_id), Utc::now()),
    )
}

pub(crate) async fn renewal_step_handler<R, N, V>(
    State(service): State<SharedService<R, N, V>>,
    Path(household_id): Path<String>,
    axum::Json(request): axum::Json<RenewalStepRequest>,
) -> Response
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    match service.record_renewal_step(&HouseholdId(household_id), request.step) {
        Ok(progress) => {
            let payload = json!({
                "completed": progress.completed,
                "next_step": progress.next_step(),
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn renew_handler<R, N, V>(
    State(service): State<SharedService<R, N, V>>,
    Path(household_id): Path<String>,
) -> Response
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    respond(
        StatusCode::OK,
        service.renew_application(&HouseholdId(household_id), Utc::now()),
    )
}

pub(crate) async fn quick_apply_handler<R, N, V>(
    State(service): State<SharedService<R, N, V>>,
    Path((household_id, program_name)): Path<(String, String)>,
) -> Response
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    respond(
        StatusCode::CREATED,
        service.quick_apply(
            &HouseholdId(household_id),
            &ProgramId(program_name),
            Utc::now(),
        ),
    )
}

pub(crate) async fn dashboard_handler<R, N, V>(
    State(service): State<SharedService<R, N, V>>,
    Path(household_id): Path<String>,
) -> Response
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    respond(
        StatusCode::OK,
        service.dashboard(&HouseholdId(household_id), Utc::now()),
    )
}

pub(crate) async fn enroll_handler<R, N, V>(
    State(service): State<SharedService<R, N, V>>,
    Path((household_id, program_name)): Path<(String, String)>,
) -> Response
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    respond(
        StatusCode::OK,
        service.mark_enrolled(
            &HouseholdId(household_id),
            &ProgramId(program_name),
            Utc::now(),
        ),
    )
}

pub(crate) async fn income_verification_handler<R, N, V>(
    State(service): State<SharedService<R, N, V>>,
    Path(household_id): Path<String>,
    axum::Json(request): axum::Json<IncomeVerificationRequest>,
) -> Response
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    respond(
        StatusCode::OK,
        service.verify_income(&HouseholdId(household_id), request.verified),
    )
}

pub(crate) async fn awaiting_response_handler<R, N, V>(
    State(service): State<SharedService<R, N, V>>,
    Path(household_id): Path<String>,
    axum::Json(request): axum::Json<AwaitingResponseRequest>,
) -> Response
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    respond(
        StatusCode::OK,
        service.set_awaiting_response(&HouseholdId(household_id), request.awaiting),
    )
}

pub(crate) async fn city_coverage_handler<R, N, V>(
    State(service): State<SharedService<R, N, V>>,
    Path(household_id): Path<String>,
    axum::Json(request): axum::Json<CityCoverageRequest>,
) -> Response
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    respond(
        StatusCode::OK,
        service.set_city_coverage(&HouseholdId(household_id), request.is_city_covered),
    )
}

pub(crate) async fn replace_documents_handler<R, N, V>(
    State(service): State<SharedService<R, N, V>>,
    Path(household_id): Path<String>,
    axum::Json(request): axum::Json<DocumentReplacement>,
) -> Response
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    respond(
        StatusCode::OK,
        service.replace_documents(&HouseholdId(household_id), request.documents, Utc::now()),
    )
}

pub(crate) async fn preview_documents_handler<R, N, V>(
    State(service): State<SharedService<R, N, V>>,
    Path(household_id): Path<String>,
    axum::Json(request): axum::Json<DocumentReplacement>,
) -> Response
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    respond(
        StatusCode::OK,
        service.preview_documents(&HouseholdId(household_id), &request.documents, Utc::now()),
    )
}

pub(crate) async fn reconcile_handler<R, N, V>(
    State(service): State<SharedService<R, N, V>>,
    Path(household_id): Path<String>,
) -> Response
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    respond(
        StatusCode::OK,
        service.reconcile(&HouseholdId(household_id), Utc::now()),
    )
}

pub(crate) async fn verification_handler<R, N, V>(
    State(service): State<SharedService<R, N, V>>,
    Path(queue): Path<String>,
) -> Response
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    match VerificationQueue::parse(&queue) {
        Some(queue) => respond(StatusCode::OK, service.verification_queue(queue)),
        None => {
            let payload = json!({
                "error": format!("unknown verification queue '{queue}'"),
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn add_program_handler<R, N, V>(
    State(service): State<SharedService<R, N, V>>,
    axum::Json(program): axum::Json<IqProgram>,
) -> Response
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    respond(StatusCode::CREATED, service.add_program(program, Utc::now()))
}

pub(crate) async fn update_program_handler<R, N, V>(
    State(service): State<SharedService<R, N, V>>,
    Path(program_name): Path<String>,
    axum::Json(program): axum::Json<IqProgram>,
) -> Response
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    if program.id.0 != program_name {
        let payload = json!({
            "error": "program name in path and body must match",
        });
        return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
    }
    respond(StatusCode::OK, service.update_program(program, Utc::now()))
}

pub(crate) async fn remove_program_handler<R, N, V>(
    State(service): State<SharedService<R, N, V>>,
    Path(program_name): Path<String>,
) -> Response
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    respond(
        StatusCode::OK,
        service.remove_program(&ProgramId(program_name)),
    )
}

pub(crate) async fn notification_status_handler<R, N, V>(
    State(service): State<SharedService<R, N, V>>,
) -> Response
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    respond(StatusCode::OK, service.notification_statuses())
}

pub(crate) async fn sweep_handler<R, N, V>(
    State(service): State<SharedService<R, N, V>>,
) -> Response
where
    R: HouseholdRepository + 'static,
    N: Notifier + 'static,
    V: AddressValidator + 'static,
{
    respond(StatusCode::OK, service.sweep_renewals(Utc::now()))
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, EnrollmentServiceError>) -> Response {
    match result {
        Ok(body) => (status, axum::Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) fn error_status(error: &EnrollmentServiceError) -> StatusCode {
    match error {
        EnrollmentServiceError::Conflict(_)
        | EnrollmentServiceError::AlreadyApplied(_)
        | EnrollmentServiceError::RenewalInProgress
        | EnrollmentServiceError::Repository(RepositoryError::Conflict)
        | EnrollmentServiceError::Repository(RepositoryError::StaleRevision { .. })
        | EnrollmentServiceError::Catalog(CatalogError::Duplicate(_))
        | EnrollmentServiceError::Catalog(CatalogError::ProgramHasEnrollments { .. }) => {
            StatusCode::CONFLICT
        }
        EnrollmentServiceError::HouseholdNotFound(_)
        | EnrollmentServiceError::EnrollmentNotFound(_)
        | EnrollmentServiceError::Repository(RepositoryError::NotFound)
        | EnrollmentServiceError::Catalog(CatalogError::UnknownProgram(_)) => StatusCode::NOT_FOUND,
        EnrollmentServiceError::Catalog(_)
        | EnrollmentServiceError::Validation(_)
        | EnrollmentServiceError::NotEligible { .. }
        | EnrollmentServiceError::IncompleteApplication { .. }
        | EnrollmentServiceError::NotFinalized
        | EnrollmentServiceError::NoRenewalInProgress => StatusCode::UNPROCESSABLE_ENTITY,
        EnrollmentServiceError::AddressValidation(_) => StatusCode::BAD_GATEWAY,
        EnrollmentServiceError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub(crate) fn error_response(error: EnrollmentServiceError) -> Response {
    let status = error_status(&error);
    let payload = match &error {
        EnrollmentServiceError::Conflict(conflict) => json!({
            "error": error.to_string(),
            "household_id": conflict.household,
            "programs": conflict.programs,
        }),
        EnrollmentServiceError::NotEligible { program, reasons } => json!({
            "error": error.to_string(),
            "program": program,
            "reasons": reasons,
        }),
        EnrollmentServiceError::IncompleteApplication { next_step } => json!({
            "error": error.to_string(),
            "next_step": next_step,
        }),
        _ => json!({
            "error": error.to_string(),
        }),
    };
    (status, axum::Json(payload)).into_response()
}
