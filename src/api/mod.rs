pub mod holiday;
pub mod overtime;
pub mod payroll_batch;
pub mod undertime;

use crate::auth::auth::AuthUser;
use crate::model::time_request::{Decision, RequestKind};
use crate::utils::time_requests;
use actix_web::HttpResponse;
use actix_web::error::ErrorInternalServerError;
use chrono::NaiveDate;
use sqlx::MySqlPool;

/// Logs a database failure and hides it behind a generic 500.
pub(crate) fn internal_error(e: sqlx::Error, context: &'static str) -> actix_web::Error {
    tracing::error!(error = %e, "{}", context);
    ErrorInternalServerError("Internal Server Error")
}

pub(crate) fn invalid_inputs() -> HttpResponse {
    HttpResponse::UnprocessableEntity().json(serde_json::json!({
        "success": 0,
        "message": "Invalid inputs"
    }))
}

pub(crate) fn not_found(message: &str) -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({ "success": 0, "message": message }))
}

/// `YYYY-MM-DD`; blank or malformed input is `None`.
pub(crate) fn parse_day(value: Option<&str>) -> Option<NaiveDate> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok())
}

/// Approve/reject shared by the overtime and undertime endpoints.
pub(crate) async fn decide_request(
    auth: &AuthUser,
    pool: &MySqlPool,
    kind: RequestKind,
    request_id: u64,
    decision: Decision,
) -> actix_web::Result<HttpResponse> {
    auth.require_hr_or_admin()?;

    let found = time_requests::decide(pool, kind, request_id, decision, auth.user_id)
        .await
        .map_err(|e| internal_error(e, "Failed to record decision"))?;

    if !found {
        return Ok(not_found("Request not found"));
    }

    tracing::info!(request_id, ?kind, ?decision, actor = %auth.username, "Request decided");
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": 1,
        "status": decision.status()
    })))
}
