//! Tool endpoint handlers
//!
//! Thin adapters: validate the request shape, call the ledger or the search
//! projection, convert the result. All routes are POST with a JSON body.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use tracing::debug;

use crate::application::{
    AvailabilitySearch, BookRequest, CancelRequest, ModifyRequest, ReservationLedger, SearchQuery,
};
use crate::domain::{LedgerStore, Reservation};
use crate::interfaces::http::common::{ApiResponse, ApiResult, ValidatedJson};
use crate::shared::errors::{LedgerError, LedgerResult};

use super::dto::*;

#[derive(Clone)]
pub struct ToolsState {
    pub ledger: Arc<ReservationLedger>,
    pub search: Arc<AvailabilitySearch>,
    pub store: Arc<dyn LedgerStore>,
}

impl ToolsState {
    /// Resolve the slot and venue so the caller sees local date and time.
    async fn reservation_dto(&self, r: Reservation) -> LedgerResult<ReservationDto> {
        let slot = self
            .store
            .slot(r.slot_id)
            .await?
            .ok_or_else(|| LedgerError::InvariantViolation(format!("slot {} missing", r.slot_id)))?;
        let venue = self.store.venue(&slot.venue_id).await?.ok_or_else(|| {
            LedgerError::InvariantViolation(format!("venue {} missing", slot.venue_id))
        })?;
        let local = slot.start_time.with_timezone(&venue.offset()?);

        Ok(ReservationDto {
            reservation_id: r.reservation_id,
            confirmation_code: r.confirmation_code,
            status: r.status.as_str().to_string(),
            venue_id: venue.venue_id,
            slot_id: slot.slot_id,
            start_time: slot.start_time,
            date: local.date_naive(),
            start_local: local.format("%H:%M").to_string(),
            party_size: r.party_size,
            holes: r.holes,
            round_type: r.round_type.as_str().to_string(),
            customer_id: r.customer_id,
            version: r.version,
            created_at: r.created_at,
            updated_at: r.updated_at,
            cancelled_at: r.cancelled_at,
            created_by_call_id: r.created_by_call_id,
            updated_by_call_id: r.updated_by_call_id,
        })
    }
}

#[utoipa::path(
    post,
    path = "/v1/tools/search-tee-times",
    tag = "Tools",
    security(("bearer_auth" = [])),
    request_body = SearchTeeTimesRequest,
    responses(
        (status = 200, description = "Open tee times", body = ApiResponse<SearchTeeTimesResponse>),
        (status = 404, description = "Unknown venue"),
        (status = 422, description = "Invalid request")
    )
)]
pub async fn search_tee_times(
    State(state): State<ToolsState>,
    ValidatedJson(request): ValidatedJson<SearchTeeTimesRequest>,
) -> ApiResult<SearchTeeTimesResponse> {
    debug!(
        call_id = ?request.call_id,
        venue_id = %request.venue_id,
        date = %request.date,
        party_size = request.party_size,
        "Handling search_tee_times"
    );
    let query = SearchQuery {
        time_window: request.time_window()?,
        venue_id: request.venue_id,
        date: request.date,
        party_size: request.party_size,
        max_results: request.max_results,
    };
    let result = state.search.search(&query).await?;
    Ok(Json(ApiResponse::success(result.into())))
}

#[utoipa::path(
    post,
    path = "/v1/tools/book-tee-time",
    tag = "Tools",
    security(("bearer_auth" = [])),
    request_body = BookTeeTimeRequest,
    responses(
        (status = 200, description = "Booked, or the stored result of an earlier call with the same key", body = ApiResponse<MutationDto>),
        (status = 404, description = "Unknown slot"),
        (status = 409, description = "Slot full or closed, or key reused with another payload"),
        (status = 403, description = "Ledger is read-only"),
        (status = 503, description = "Lock contention, retry with the same key")
    )
)]
pub async fn book_tee_time(
    State(state): State<ToolsState>,
    ValidatedJson(request): ValidatedJson<BookTeeTimeRequest>,
) -> ApiResult<MutationDto> {
    debug!(
        call_id = ?request.call_id,
        slot_id = %request.slot_id,
        party_size = request.party_size,
        idempotency_key = %request.idempotency_key,
        "Handling book_tee_time"
    );
    let round_type = request.round_type()?;
    let result = state
        .ledger
        .book(BookRequest {
            slot_id: request.slot_id,
            party_size: request.party_size,
            round_type,
            holes: request.holes,
            contact: request.primary_contact.map(Into::into),
            idempotency_key: request.idempotency_key,
            call_id: request.call_id,
        })
        .await?;
    let reservation = state.reservation_dto(result.reservation).await?;
    Ok(Json(ApiResponse::success(MutationDto::new(result.outcome, reservation))))
}

#[utoipa::path(
    post,
    path = "/v1/tools/modify-reservation",
    tag = "Tools",
    security(("bearer_auth" = [])),
    request_body = ModifyReservationRequest,
    responses(
        (status = 200, description = "Modified, unchanged, or replayed", body = ApiResponse<MutationDto>),
        (status = 404, description = "Unknown confirmation code or target slot"),
        (status = 409, description = "Target full or closed, reservation cancelled, or key reused"),
        (status = 503, description = "Lock contention, retry with the same key")
    )
)]
pub async fn modify_reservation(
    State(state): State<ToolsState>,
    ValidatedJson(request): ValidatedJson<ModifyReservationRequest>,
) -> ApiResult<MutationDto> {
    debug!(
        call_id = ?request.call_id,
        code = %request.confirmation_code,
        idempotency_key = %request.idempotency_key,
        "Handling modify_reservation"
    );
    let changes = request.changes.into_changes()?;
    let result = state
        .ledger
        .modify(ModifyRequest {
            confirmation_code: request.confirmation_code,
            changes,
            idempotency_key: request.idempotency_key,
            call_id: request.call_id,
        })
        .await?;
    let reservation = state.reservation_dto(result.reservation).await?;
    Ok(Json(ApiResponse::success(MutationDto::new(result.outcome, reservation))))
}

#[utoipa::path(
    post,
    path = "/v1/tools/cancel-reservation",
    tag = "Tools",
    security(("bearer_auth" = [])),
    request_body = CancelReservationRequest,
    responses(
        (status = 200, description = "Cancelled (also when it already was)", body = ApiResponse<CancelReservationResponse>),
        (status = 404, description = "Unknown confirmation code"),
        (status = 503, description = "Lock contention, retry with the same key")
    )
)]
pub async fn cancel_reservation(
    State(state): State<ToolsState>,
    ValidatedJson(request): ValidatedJson<CancelReservationRequest>,
) -> ApiResult<CancelReservationResponse> {
    debug!(
        call_id = ?request.call_id,
        code = %request.confirmation_code,
        idempotency_key = %request.idempotency_key,
        "Handling cancel_reservation"
    );
    let result = state
        .ledger
        .cancel(CancelRequest {
            confirmation_code: request.confirmation_code,
            idempotency_key: request.idempotency_key,
            call_id: request.call_id,
        })
        .await?;
    let reservation = result.reservation;
    Ok(Json(ApiResponse::success(CancelReservationResponse {
        confirmation_code: reservation.confirmation_code,
        status: reservation.status.as_str().to_string(),
        cancelled_at: reservation.cancelled_at,
        outcome: result.outcome.as_str().to_string(),
        policy: CancellationPolicyDto {
            fee_applied: false,
            message: "Cancelled successfully.".to_string(),
        },
    })))
}

#[utoipa::path(
    post,
    path = "/v1/tools/get-reservation-details",
    tag = "Tools",
    security(("bearer_auth" = [])),
    request_body = GetReservationDetailsRequest,
    responses(
        (status = 200, description = "Current reservation state", body = ApiResponse<ReservationDetailsResponse>),
        (status = 404, description = "Unknown confirmation code")
    )
)]
pub async fn get_reservation_details(
    State(state): State<ToolsState>,
    ValidatedJson(request): ValidatedJson<GetReservationDetailsRequest>,
) -> ApiResult<ReservationDetailsResponse> {
    debug!(call_id = ?request.call_id, code = %request.confirmation_code, "Handling get_reservation_details");
    let reservation = state.ledger.get(&request.confirmation_code).await?;
    let reservation = state.reservation_dto(reservation).await?;
    Ok(Json(ApiResponse::success(ReservationDetailsResponse { reservation })))
}

#[utoipa::path(
    post,
    path = "/v1/tools/quote-reservation-change",
    tag = "Tools",
    security(("bearer_auth" = [])),
    request_body = QuoteReservationChangeRequest,
    responses(
        (status = 200, description = "Whether the change would fit right now", body = ApiResponse<QuoteReservationChangeResponse>),
        (status = 404, description = "Unknown confirmation code")
    )
)]
pub async fn quote_reservation_change(
    State(state): State<ToolsState>,
    ValidatedJson(request): ValidatedJson<QuoteReservationChangeRequest>,
) -> ApiResult<QuoteReservationChangeResponse> {
    debug!(call_id = ?request.call_id, code = %request.confirmation_code, "Handling quote_reservation_change");
    let changes = request.changes()?;
    let quote = state
        .ledger
        .quote_change(&request.confirmation_code, &changes)
        .await?;
    Ok(Json(ApiResponse::success(quote.into())))
}

#[utoipa::path(
    post,
    path = "/v1/tools/check-slot-capacity",
    tag = "Tools",
    security(("bearer_auth" = [])),
    request_body = CheckSlotCapacityRequest,
    responses(
        (status = 200, description = "Capacity snapshot for one slot", body = ApiResponse<CheckSlotCapacityResponse>),
        (status = 404, description = "Unknown slot")
    )
)]
pub async fn check_slot_capacity(
    State(state): State<ToolsState>,
    ValidatedJson(request): ValidatedJson<CheckSlotCapacityRequest>,
) -> ApiResult<CheckSlotCapacityResponse> {
    debug!(call_id = ?request.call_id, slot_id = %request.slot_id, "Handling check_slot_capacity");
    let check = state
        .search
        .check_capacity(request.slot_id, request.party_size)
        .await?;
    Ok(Json(ApiResponse::success(check.into())))
}
