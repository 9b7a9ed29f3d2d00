//! API router with Swagger UI

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::FromRef,
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::application::{AvailabilitySearch, ReservationLedger};
use crate::domain::LedgerStore;
use crate::interfaces::http::common::ApiResponse;
use crate::interfaces::http::middleware::{auth_middleware, AuthState};
use crate::interfaces::http::modules::health::{self, HealthState};
use crate::interfaces::http::modules::metrics::{
    http_metrics_middleware, prometheus_metrics, MetricsState,
};
use crate::interfaces::http::modules::request_id::request_id_middleware;
use crate::interfaces::http::modules::reservations::{self, dto as history_dto, ReservationsState};
use crate::interfaces::http::modules::tools::{self, dto as tool_dto, ToolsState};

/// Everything the handlers need. Each handler extracts its own slice via
/// `FromRef`.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<ReservationLedger>,
    pub search: Arc<AvailabilitySearch>,
    pub store: Arc<dyn LedgerStore>,
    pub auth: AuthState,
    pub metrics: PrometheusHandle,
    pub started_at: Arc<Instant>,
}

impl FromRef<AppState> for ToolsState {
    fn from_ref(s: &AppState) -> Self {
        ToolsState {
            ledger: Arc::clone(&s.ledger),
            search: Arc::clone(&s.search),
            store: Arc::clone(&s.store),
        }
    }
}

impl FromRef<AppState> for ReservationsState {
    fn from_ref(s: &AppState) -> Self {
        ReservationsState {
            ledger: Arc::clone(&s.ledger),
        }
    }
}

impl FromRef<AppState> for HealthState {
    fn from_ref(s: &AppState) -> Self {
        HealthState {
            store: Arc::clone(&s.store),
            started_at: Arc::clone(&s.started_at),
            read_only: s.ledger.settings().read_only,
        }
    }
}

impl FromRef<AppState> for MetricsState {
    fn from_ref(s: &AppState) -> Self {
        MetricsState {
            handle: s.metrics.clone(),
        }
    }
}

impl FromRef<AppState> for AuthState {
    fn from_ref(s: &AppState) -> Self {
        s.auth.clone()
    }
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some("Shared API key sent as a bearer token"))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        tools::search_tee_times,
        tools::book_tee_time,
        tools::modify_reservation,
        tools::cancel_reservation,
        tools::get_reservation_details,
        tools::quote_reservation_change,
        tools::check_slot_capacity,
        reservations::reservation_history,
    ),
    components(
        schemas(
            ApiResponse<String>,
            health::HealthResponse,
            health::ComponentHealth,
            tool_dto::SearchTeeTimesRequest,
            tool_dto::TimeWindowDto,
            tool_dto::SearchTeeTimesResponse,
            tool_dto::TeeTimeOptionDto,
            tool_dto::PriceDto,
            tool_dto::FreshnessDto,
            tool_dto::BookTeeTimeRequest,
            tool_dto::ContactDto,
            tool_dto::ReservationDto,
            tool_dto::MutationDto,
            tool_dto::ModifyReservationRequest,
            tool_dto::ChangesDto,
            tool_dto::CancelReservationRequest,
            tool_dto::CancelReservationResponse,
            tool_dto::CancellationPolicyDto,
            tool_dto::GetReservationDetailsRequest,
            tool_dto::ReservationDetailsResponse,
            tool_dto::QuoteReservationChangeRequest,
            tool_dto::QuoteReservationChangeResponse,
            tool_dto::CheckSlotCapacityRequest,
            tool_dto::CheckSlotCapacityResponse,
            history_dto::HistoryResponse,
            history_dto::ChangeDto,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Liveness and storage reachability"),
        (name = "Tools", description = "Search, book, modify and cancel tee times"),
        (name = "Reservations", description = "Reservation audit trail"),
    ),
    info(
        title = "Tee-Time Reservation Ledger API",
        description = "Capacity-safe, idempotent tee-time reservations with an append-only audit trail",
    )
)]
pub struct ApiDoc;

pub fn create_api_router(state: AppState) -> Router {
    let tool_routes = Router::new()
        .route("/search-tee-times", post(tools::search_tee_times))
        .route("/book-tee-time", post(tools::book_tee_time))
        .route("/modify-reservation", post(tools::modify_reservation))
        .route("/cancel-reservation", post(tools::cancel_reservation))
        .route("/get-reservation-details", post(tools::get_reservation_details))
        .route("/quote-reservation-change", post(tools::quote_reservation_change))
        .route("/check-slot-capacity", post(tools::check_slot_capacity))
        .layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ));

    let reservation_routes = Router::new()
        .route("/{code}/history", get(reservations::reservation_history))
        .layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health::health_check))
        .route("/metrics", get(prometheus_metrics))
        .nest("/v1/tools", tool_routes)
        .nest("/v1/reservations", reservation_routes)
        .layer(middleware::from_fn(http_metrics_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}
