//! Reservation audit history

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use tracing::error;

use crate::application::ReservationLedger;
use crate::interfaces::http::common::{ApiResponse, ApiResult};
use crate::shared::errors::LedgerError;

use super::dto::*;

#[derive(Clone)]
pub struct ReservationsState {
    pub ledger: Arc<ReservationLedger>,
}

#[utoipa::path(
    get,
    path = "/v1/reservations/{code}/history",
    tag = "Reservations",
    security(("bearer_auth" = [])),
    params(("code" = String, Path, description = "Confirmation code")),
    responses(
        (status = 200, description = "Audit trail, oldest first", body = ApiResponse<HistoryResponse>),
        (status = 404, description = "Unknown confirmation code")
    )
)]
pub async fn reservation_history(
    State(state): State<ReservationsState>,
    Path(code): Path<String>,
) -> ApiResult<HistoryResponse> {
    let reservation = state.ledger.get(&code).await?;
    let changes = state.ledger.history(&code).await?;
    let chain_valid = match state.ledger.audit().verify(reservation.reservation_id).await {
        Ok(_) => true,
        Err(LedgerError::InvariantViolation(reason)) => {
            error!(code = %reservation.confirmation_code, reason = %reason, "Audit chain broken");
            false
        }
        Err(e) => return Err(e.into()),
    };
    Ok(Json(ApiResponse::success(HistoryResponse {
        confirmation_code: reservation.confirmation_code,
        changes: changes.into_iter().map(Into::into).collect(),
        chain_valid,
    })))
}
