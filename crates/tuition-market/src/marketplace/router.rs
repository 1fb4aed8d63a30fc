use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::applications::ApplicationService;
use super::domain::{
    Actor, ApplicationDraft, ApplicationId, ApplicationPatch, PaymentId, Role, TuitionDraft,
    TuitionId, TuitionPatch, TuitionStatus, UserId,
};
use super::repository::{
    ApplicationRepository, PageRequest, PaymentLedger, SettlementStore, SortOrder, TuitionFilter,
    TuitionRepository,
};
use super::settlement::{ConfirmRequest, PaymentGateway, SettlementService};
use super::tuitions::TuitionService;
use super::MarketplaceError;

/// Bundle of the three service facades shared as router state.
pub struct MarketplaceServices<S, G> {
    pub tuitions: Arc<TuitionService<S>>,
    pub applications: Arc<ApplicationService<S>>,
    pub settlement: Arc<SettlementService<S, G>>,
}

impl<S, G> Clone for MarketplaceServices<S, G> {
    fn clone(&self) -> Self {
        Self {
            tuitions: Arc::clone(&self.tuitions),
            applications: Arc::clone(&self.applications),
            settlement: Arc::clone(&self.settlement),
        }
    }
}

/// Router builder exposing the marketplace HTTP surface.
pub fn marketplace_router<S, G>(services: MarketplaceServices<S, G>) -> Router
where
    S: SettlementStore + ApplicationRepository + TuitionRepository + PaymentLedger + 'static,
    G: PaymentGateway + 'static,
{
    Router::new()
        .route("/api/v1/tuitions", post(create_tuition::<S, G>))
        .route("/api/v1/tuitions", get(list_tuitions::<S, G>))
        .route("/api/v1/tuitions/mine", get(my_tuitions::<S, G>))
        .route("/api/v1/tuitions/:id", get(get_tuition::<S, G>))
        .route("/api/v1/tuitions/:id", put(update_tuition::<S, G>))
        .route("/api/v1/tuitions/:id", delete(delete_tuition::<S, G>))
        .route(
            "/api/v1/tuitions/:id/status",
            patch(set_tuition_status::<S, G>),
        )
        .route("/api/v1/admin/tuitions", get(admin_tuitions::<S, G>))
        .route("/api/v1/admin/analytics", get(admin_analytics::<S, G>))
        .route("/api/v1/applications", post(create_application::<S, G>))
        .route("/api/v1/applications/mine", get(my_applications::<S, G>))
        .route(
            "/api/v1/applications/tuition/:id",
            get(tuition_applications::<S, G>),
        )
        .route("/api/v1/applications/:id", get(get_application::<S, G>))
        .route("/api/v1/applications/:id", put(update_application::<S, G>))
        .route(
            "/api/v1/applications/:id",
            delete(delete_application::<S, G>),
        )
        .route(
            "/api/v1/applications/:id/reject",
            patch(reject_application::<S, G>),
        )
        .route("/api/v1/payments/intent", post(create_intent::<S, G>))
        .route("/api/v1/payments/confirm", post(confirm_payment::<S, G>))
        .route("/api/v1/payments/history", get(payment_history::<S, G>))
        .route("/api/v1/payments/revenue", get(tutor_revenue::<S, G>))
        .route("/api/v1/payments", get(list_payments::<S, G>))
        .route("/api/v1/payments/:id", get(get_payment::<S, G>))
        .with_state(services)
}

impl IntoResponse for MarketplaceError {
    fn into_response(self) -> Response {
        let status = match &self {
            MarketplaceError::Validation(_) => StatusCode::BAD_REQUEST,
            MarketplaceError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            MarketplaceError::Forbidden(_) => StatusCode::FORBIDDEN,
            MarketplaceError::NotFound(_) => StatusCode::NOT_FOUND,
            MarketplaceError::Conflict(_) | MarketplaceError::InvalidState(_) => {
                StatusCode::CONFLICT
            }
            MarketplaceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            MarketplaceError::Gateway(_) => StatusCode::BAD_GATEWAY,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Reads the identity collaborator's verdict from the forwarded headers.
/// The core trusts these verbatim; authentication itself happens upstream.
fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, MarketplaceError> {
    let id = headers
        .get("x-actor-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(MarketplaceError::Unauthenticated("missing x-actor-id header"))?;

    let role = headers
        .get("x-actor-role")
        .and_then(|value| value.to_str().ok())
        .ok_or(MarketplaceError::Unauthenticated(
            "missing x-actor-role header",
        ))?;
    let role = Role::parse(role).ok_or(MarketplaceError::Unauthenticated(
        "unrecognized actor role",
    ))?;

    Ok(Actor {
        id: UserId(id.to_string()),
        role,
    })
}

#[derive(Debug, Default, Deserialize)]
struct TuitionListQuery {
    subject: Option<String>,
    #[serde(rename = "class")]
    class_level: Option<String>,
    location: Option<String>,
    status: Option<String>,
    page: Option<usize>,
    limit: Option<usize>,
    #[serde(rename = "sortOrder")]
    sort_order: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SetStatusBody {
    status: String,
}

#[derive(Debug, Deserialize)]
struct IntentBody {
    amount: f64,
}

#[derive(Debug, Default, Deserialize)]
struct StatusQuery {
    status: Option<String>,
}

fn parse_status(raw: &str) -> Result<TuitionStatus, MarketplaceError> {
    TuitionStatus::parse(raw).ok_or_else(|| {
        MarketplaceError::Validation(
            "invalid status, must be: pending, approved, or rejected".to_string(),
        )
    })
}

async fn create_tuition<S, G>(
    State(services): State<MarketplaceServices<S, G>>,
    headers: HeaderMap,
    Json(draft): Json<TuitionDraft>,
) -> Result<Response, MarketplaceError>
where
    S: SettlementStore + ApplicationRepository + TuitionRepository + PaymentLedger + 'static,
    G: PaymentGateway + 'static,
{
    let actor = actor_from_headers(&headers)?;
    let tuition = services.tuitions.create(&actor, draft)?;
    Ok((StatusCode::CREATED, Json(tuition)).into_response())
}

async fn list_tuitions<S, G>(
    State(services): State<MarketplaceServices<S, G>>,
    Query(query): Query<TuitionListQuery>,
) -> Result<Response, MarketplaceError>
where
    S: SettlementStore + ApplicationRepository + TuitionRepository + PaymentLedger + 'static,
    G: PaymentGateway + 'static,
{
    if let (Some(page), Some(limit)) = (query.page, query.limit) {
        let order = match query.sort_order.as_deref() {
            Some("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        };
        let page = services.tuitions.list_page(PageRequest {
            page: page.max(1),
            limit: limit.max(1),
            order,
        })?;
        return Ok(Json(page).into_response());
    }

    let status = match query.status.as_deref() {
        Some(raw) => Some(parse_status(raw)?),
        // The public board only shows approved listings unless asked otherwise.
        None => Some(TuitionStatus::Approved),
    };
    let filter = TuitionFilter {
        status,
        subject: query.subject,
        class_level: query.class_level,
        location: query.location,
        student_id: None,
    };
    let tuitions = services.tuitions.list(&filter)?;
    Ok(Json(json!({ "count": tuitions.len(), "tuitions": tuitions })).into_response())
}

async fn my_tuitions<S, G>(
    State(services): State<MarketplaceServices<S, G>>,
    headers: HeaderMap,
) -> Result<Response, MarketplaceError>
where
    S: SettlementStore + ApplicationRepository + TuitionRepository + PaymentLedger + 'static,
    G: PaymentGateway + 'static,
{
    let actor = actor_from_headers(&headers)?;
    let tuitions = services.tuitions.list_for_student(&actor)?;
    Ok(Json(json!({ "count": tuitions.len(), "tuitions": tuitions })).into_response())
}

async fn get_tuition<S, G>(
    State(services): State<MarketplaceServices<S, G>>,
    Path(id): Path<String>,
) -> Result<Response, MarketplaceError>
where
    S: SettlementStore + ApplicationRepository + TuitionRepository + PaymentLedger + 'static,
    G: PaymentGateway + 'static,
{
    let tuition = services.tuitions.get(&TuitionId(id))?;
    Ok(Json(tuition).into_response())
}

async fn update_tuition<S, G>(
    State(services): State<MarketplaceServices<S, G>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<TuitionPatch>,
) -> Result<Response, MarketplaceError>
where
    S: SettlementStore + ApplicationRepository + TuitionRepository + PaymentLedger + 'static,
    G: PaymentGateway + 'static,
{
    let actor = actor_from_headers(&headers)?;
    let tuition = services.tuitions.update(&TuitionId(id), &actor, patch)?;
    Ok(Json(tuition).into_response())
}

async fn delete_tuition<S, G>(
    State(services): State<MarketplaceServices<S, G>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, MarketplaceError>
where
    S: SettlementStore + ApplicationRepository + TuitionRepository + PaymentLedger + 'static,
    G: PaymentGateway + 'static,
{
    let actor = actor_from_headers(&headers)?;
    services.tuitions.delete(&TuitionId(id), &actor)?;
    Ok(Json(json!({ "message": "tuition deleted" })).into_response())
}

async fn set_tuition_status<S, G>(
    State(services): State<MarketplaceServices<S, G>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<SetStatusBody>,
) -> Result<Response, MarketplaceError>
where
    S: SettlementStore + ApplicationRepository + TuitionRepository + PaymentLedger + 'static,
    G: PaymentGateway + 'static,
{
    let actor = actor_from_headers(&headers)?;
    let status = parse_status(&body.status)?;
    let tuition = services
        .tuitions
        .set_status(&TuitionId(id), &actor, status)?;
    Ok(Json(tuition).into_response())
}

async fn admin_tuitions<S, G>(
    State(services): State<MarketplaceServices<S, G>>,
    headers: HeaderMap,
    Query(query): Query<StatusQuery>,
) -> Result<Response, MarketplaceError>
where
    S: SettlementStore + ApplicationRepository + TuitionRepository + PaymentLedger + 'static,
    G: PaymentGateway + 'static,
{
    let actor = actor_from_headers(&headers)?;
    match actor.role {
        Role::Admin => {}
        Role::Student | Role::Tutor => {
            return Err(MarketplaceError::Forbidden("admin access required"))
        }
    }

    let status = match query.status.as_deref() {
        Some(raw) => Some(parse_status(raw)?),
        None => None,
    };
    let filter = TuitionFilter {
        status,
        ..TuitionFilter::default()
    };
    let tuitions = services.tuitions.list(&filter)?;
    Ok(Json(json!({ "count": tuitions.len(), "tuitions": tuitions })).into_response())
}

async fn admin_analytics<S, G>(
    State(services): State<MarketplaceServices<S, G>>,
    headers: HeaderMap,
) -> Result<Response, MarketplaceError>
where
    S: SettlementStore + ApplicationRepository + TuitionRepository + PaymentLedger + 'static,
    G: PaymentGateway + 'static,
{
    let actor = actor_from_headers(&headers)?;
    let analytics = services.settlement.platform_analytics(&actor)?;
    Ok(Json(analytics).into_response())
}

async fn create_application<S, G>(
    State(services): State<MarketplaceServices<S, G>>,
    headers: HeaderMap,
    Json(draft): Json<ApplicationDraft>,
) -> Result<Response, MarketplaceError>
where
    S: SettlementStore + ApplicationRepository + TuitionRepository + PaymentLedger + 'static,
    G: PaymentGateway + 'static,
{
    let actor = actor_from_headers(&headers)?;
    let application = services.applications.apply(&actor, draft)?;
    Ok((StatusCode::CREATED, Json(application)).into_response())
}

async fn my_applications<S, G>(
    State(services): State<MarketplaceServices<S, G>>,
    headers: HeaderMap,
) -> Result<Response, MarketplaceError>
where
    S: SettlementStore + ApplicationRepository + TuitionRepository + PaymentLedger + 'static,
    G: PaymentGateway + 'static,
{
    let actor = actor_from_headers(&headers)?;
    let applications = services.applications.list_for_tutor(&actor)?;
    Ok(Json(json!({ "count": applications.len(), "applications": applications })).into_response())
}

async fn tuition_applications<S, G>(
    State(services): State<MarketplaceServices<S, G>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, MarketplaceError>
where
    S: SettlementStore + ApplicationRepository + TuitionRepository + PaymentLedger + 'static,
    G: PaymentGateway + 'static,
{
    let actor = actor_from_headers(&headers)?;
    let applications = services
        .applications
        .list_for_tuition(&TuitionId(id), &actor)?;
    Ok(Json(json!({ "count": applications.len(), "applications": applications })).into_response())
}

async fn get_application<S, G>(
    State(services): State<MarketplaceServices<S, G>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, MarketplaceError>
where
    S: SettlementStore + ApplicationRepository + TuitionRepository + PaymentLedger + 'static,
    G: PaymentGateway + 'static,
{
    let actor = actor_from_headers(&headers)?;
    let application = services.applications.get(&ApplicationId(id), &actor)?;
    Ok(Json(application).into_response())
}

async fn update_application<S, G>(
    State(services): State<MarketplaceServices<S, G>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<ApplicationPatch>,
) -> Result<Response, MarketplaceError>
where
    S: SettlementStore + ApplicationRepository + TuitionRepository + PaymentLedger + 'static,
    G: PaymentGateway + 'static,
{
    let actor = actor_from_headers(&headers)?;
    let application = services
        .applications
        .update(&ApplicationId(id), &actor, patch)?;
    Ok(Json(application).into_response())
}

async fn delete_application<S, G>(
    State(services): State<MarketplaceServices<S, G>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, MarketplaceError>
where
    S: SettlementStore + ApplicationRepository + TuitionRepository + PaymentLedger + 'static,
    G: PaymentGateway + 'static,
{
    let actor = actor_from_headers(&headers)?;
    services.applications.delete(&ApplicationId(id), &actor)?;
    Ok(Json(json!({ "message": "application deleted" })).into_response())
}

async fn reject_application<S, G>(
    State(services): State<MarketplaceServices<S, G>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, MarketplaceError>
where
    S: SettlementStore + ApplicationRepository + TuitionRepository + PaymentLedger + 'static,
    G: PaymentGateway + 'static,
{
    let actor = actor_from_headers(&headers)?;
    let application = services.applications.reject(&ApplicationId(id), &actor)?;
    Ok(Json(application).into_response())
}

async fn create_intent<S, G>(
    State(services): State<MarketplaceServices<S, G>>,
    headers: HeaderMap,
    Json(body): Json<IntentBody>,
) -> Result<Response, MarketplaceError>
where
    S: SettlementStore + ApplicationRepository + TuitionRepository + PaymentLedger + 'static,
    G: PaymentGateway + 'static,
{
    let actor = actor_from_headers(&headers)?;
    let receipt = services.settlement.create_intent(&actor, body.amount)?;
    Ok(Json(receipt).into_response())
}

async fn confirm_payment<S, G>(
    State(services): State<MarketplaceServices<S, G>>,
    headers: HeaderMap,
    Json(request): Json<ConfirmRequest>,
) -> Result<Response, MarketplaceError>
where
    S: SettlementStore + ApplicationRepository + TuitionRepository + PaymentLedger + 'static,
    G: PaymentGateway + 'static,
{
    let actor = actor_from_headers(&headers)?;
    let payment = services.settlement.confirm(&actor, request)?;
    Ok((StatusCode::CREATED, Json(payment)).into_response())
}

async fn payment_history<S, G>(
    State(services): State<MarketplaceServices<S, G>>,
    headers: HeaderMap,
) -> Result<Response, MarketplaceError>
where
    S: SettlementStore + ApplicationRepository + TuitionRepository + PaymentLedger + 'static,
    G: PaymentGateway + 'static,
{
    let actor = actor_from_headers(&headers)?;
    let payments = services.settlement.history_for_student(&actor)?;
    Ok(Json(json!({ "count": payments.len(), "payments": payments })).into_response())
}

async fn tutor_revenue<S, G>(
    State(services): State<MarketplaceServices<S, G>>,
    headers: HeaderMap,
) -> Result<Response, MarketplaceError>
where
    S: SettlementStore + ApplicationRepository + TuitionRepository + PaymentLedger + 'static,
    G: PaymentGateway + 'static,
{
    let actor = actor_from_headers(&headers)?;
    let report = services.settlement.revenue_for_tutor(&actor)?;
    Ok(Json(report).into_response())
}

async fn list_payments<S, G>(
    State(services): State<MarketplaceServices<S, G>>,
    headers: HeaderMap,
) -> Result<Response, MarketplaceError>
where
    S: SettlementStore + ApplicationRepository + TuitionRepository + PaymentLedger + 'static,
    G: PaymentGateway + 'static,
{
    let actor = actor_from_headers(&headers)?;
    let payments = services.settlement.list_all(&actor)?;
    Ok(Json(json!({ "count": payments.len(), "payments": payments })).into_response())
}

async fn get_payment<S, G>(
    State(services): State<MarketplaceServices<S, G>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, MarketplaceError>
where
    S: SettlementStore + ApplicationRepository + TuitionRepository + PaymentLedger + 'static,
    G: PaymentGateway + 'static,
{
    let actor = actor_from_headers(&headers)?;
    let payment = services.settlement.get(&PaymentId(id), &actor)?;
    Ok(Json(payment).into_response())
}
