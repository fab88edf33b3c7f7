use crate::api::{decide_request, internal_error, invalid_inputs, not_found, parse_day};
use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::model::overtime::{
    OvertimeForm, OvertimeRecord, OvertimeUpdate, ScanForm, ScanOutcome, decide_scan,
    overtime_hours, parse_clock,
};
use crate::model::time_request::{Decision, RequestFilter, RequestKind};
use crate::payroll::deductions::round2;
use crate::utils::db_utils::bind_all_as;
use crate::utils::time_requests::{filter_clause, request_select};
use actix_web::error::ErrorInternalServerError;
use actix_web::{HttpResponse, Responder, web};
use chrono::{DateTime, FixedOffset, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

const KIND: RequestKind = RequestKind::Overtime;

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct DateRange {
    #[schema(example = "2024-05-01")]
    pub start_date: Option<String>,
    #[schema(example = "2024-05-31")]
    pub end_date: Option<String>,
}

/// Wall clock of the overtime scanner.
fn scanner_now(offset_hours: i32) -> actix_web::Result<DateTime<FixedOffset>> {
    let offset = FixedOffset::east_opt(offset_hours * 3600)
        .ok_or_else(|| ErrorInternalServerError("Invalid scanner timezone"))?;
    Ok(Utc::now().with_timezone(&offset))
}

fn positive(hours: Option<Decimal>) -> Option<Decimal> {
    hours.filter(|h| *h > Decimal::ZERO).map(round2)
}

/// Explicit hours win; otherwise they are worked out from the clock times.
fn resolve_hours(
    hours: Option<Decimal>,
    start: Option<NaiveTime>,
    end: Option<NaiveTime>,
) -> Option<Decimal> {
    positive(hours).or_else(|| overtime_hours(start?, end?))
}

async fn list_where(
    pool: &MySqlPool,
    filter: &RequestFilter,
    approved_only: bool,
    order: &str,
) -> Result<Vec<OvertimeRecord>, sqlx::Error> {
    let (clause, values) = filter_clause(filter, approved_only);
    let sql = format!("{} {} ORDER BY {}", request_select(KIND), clause, order);
    bind_all_as(sqlx::query_as::<_, OvertimeRecord>(&sql), values)
        .fetch_all(pool)
        .await
}

/// File an overtime request; hours are an estimate until the scans come in
#[utoipa::path(
    post,
    path = "/api/overtime",
    request_body = OvertimeForm,
    responses(
        (status = 201, description = "Request filed", body = Object, example = json!({
            "success": 1, "ot_id": 7, "status": "pending"
        })),
        (status = 422, description = "No employee or work date", body = Object, example = json!({
            "success": 0, "message": "Invalid inputs"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
pub async fn request_overtime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<OvertimeForm>,
) -> actix_web::Result<impl Responder> {
    let employee_id = payload.employee_id.filter(|id| *id > 0).or(auth.employee_id);
    let (Some(employee_id), Some(work_date)) = (employee_id, parse_day(payload.work_date.as_deref()))
    else {
        return Ok(invalid_inputs());
    };
    auth.require_self_or_staff(employee_id)?;

    let reason = payload.reason.as_deref().map(str::trim);
    let result = sqlx::query(
        r#"
        INSERT INTO overtime_requests (employee_id, work_date, hours, reason, status)
        VALUES (?, ?, ?, ?, 'pending')
        "#,
    )
    .bind(employee_id)
    .bind(work_date)
    .bind(positive(payload.hours))
    .bind(reason)
    .execute(pool.get_ref())
    .await
    .map_err(|e| internal_error(e, "Failed to create overtime request"))?;

    info!(employee_id, work_date = %work_date, "Overtime requested");
    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": 1,
        "ot_id": result.last_insert_id(),
        "status": "pending"
    })))
}

/// Edit a request while it is still pending
#[utoipa::path(
    put,
    path = "/api/overtime/{ot_id}",
    params(("ot_id" = u64, Path, description = "Overtime request ID")),
    request_body = OvertimeUpdate,
    responses(
        (status = 200, description = "Request updated", body = Object, example = json!({ "success": 1 })),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request already decided"),
        (status = 422, description = "Missing work date"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
pub async fn update_overtime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<OvertimeUpdate>,
) -> actix_web::Result<impl Responder> {
    let ot_id = path.into_inner();

    let current: Option<(u64, String)> =
        sqlx::query_as("SELECT employee_id, status FROM overtime_requests WHERE ot_id = ? LIMIT 1")
            .bind(ot_id)
            .fetch_optional(pool.get_ref())
            .await
            .map_err(|e| internal_error(e, "Failed to load overtime request"))?;

    let Some((employee_id, status)) = current else {
        return Ok(not_found("Request not found"));
    };
    auth.require_self_or_staff(employee_id)?;

    let Some(work_date) = parse_day(payload.work_date.as_deref()) else {
        return Ok(invalid_inputs());
    };
    if status != "pending" {
        return Ok(HttpResponse::Conflict().json(serde_json::json!({
            "success": 0,
            "message": "Only pending requests can be edited"
        })));
    }

    let start = payload.start_time.as_deref().and_then(parse_clock);
    let end = payload.end_time.as_deref().and_then(parse_clock);
    let hours = resolve_hours(payload.hours, start, end);

    sqlx::query(
        r#"
        UPDATE overtime_requests
        SET work_date = ?, start_time = ?, end_time = ?, hours = ?, reason = ?
        WHERE ot_id = ? AND status = 'pending'
        "#,
    )
    .bind(work_date)
    .bind(start)
    .bind(end)
    .bind(hours)
    .bind(payload.reason.as_deref().map(str::trim))
    .bind(ot_id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| internal_error(e, "Failed to update overtime request"))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": 1 })))
}

/// Latest 50 requests of one employee
#[utoipa::path(
    get,
    path = "/api/overtime/employee/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Requests, newest first", body = [OvertimeRecord]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
pub async fn list_by_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let employee_id = path.into_inner();
    auth.require_self_or_staff(employee_id)?;

    let sql = format!(
        "{} WHERE r.employee_id = ? ORDER BY r.created_at DESC LIMIT 50",
        request_select(KIND)
    );
    let rows = sqlx::query_as::<_, OvertimeRecord>(&sql)
        .bind(employee_id)
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| internal_error(e, "Failed to list overtime requests"))?;

    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/overtime/pending",
    responses(
        (status = 200, description = "Pending requests, oldest first", body = [OvertimeRecord]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
pub async fn list_pending(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let sql = format!("{} WHERE r.status = 'pending' ORDER BY r.created_at ASC", request_select(KIND));
    let rows = sqlx::query_as::<_, OvertimeRecord>(&sql)
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| internal_error(e, "Failed to list pending overtime"))?;

    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/overtime/approved",
    params(DateRange),
    responses(
        (status = 200, description = "Approved requests, latest work date first", body = [OvertimeRecord]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
pub async fn list_approved(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<DateRange>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let query = query.into_inner();
    let filter = RequestFilter {
        start_date: query.start_date,
        end_date: query.end_date,
        ..RequestFilter::default()
    };
    let rows = list_where(pool.get_ref(), &filter, true, "r.work_date DESC, r.ot_id DESC")
        .await
        .map_err(|e| internal_error(e, "Failed to list approved overtime"))?;

    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/overtime",
    params(RequestFilter),
    responses(
        (status = 200, description = "Matching requests, newest first", body = [OvertimeRecord]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
pub async fn list_all(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<RequestFilter>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let rows = list_where(pool.get_ref(), &query, false, "r.created_at DESC, r.ot_id DESC")
        .await
        .map_err(|e| internal_error(e, "Failed to list overtime requests"))?;

    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    put,
    path = "/api/overtime/{ot_id}/approve",
    params(("ot_id" = u64, Path, description = "Overtime request ID")),
    responses(
        (status = 200, description = "Request approved", body = Object, example = json!({
            "success": 1, "status": "approved"
        })),
        (status = 404, description = "Request not found"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
pub async fn approve_overtime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    decide_request(&auth, pool.get_ref(), KIND, path.into_inner(), Decision::Approve).await
}

#[utoipa::path(
    put,
    path = "/api/overtime/{ot_id}/reject",
    params(("ot_id" = u64, Path, description = "Overtime request ID")),
    responses(
        (status = 200, description = "Request rejected", body = Object, example = json!({
            "success": 1, "status": "rejected"
        })),
        (status = 404, description = "Request not found"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
pub async fn reject_overtime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    decide_request(&auth, pool.get_ref(), KIND, path.into_inner(), Decision::Reject).await
}

/// QR scan at the overtime station: time-in first, time-out at closing
#[utoipa::path(
    post,
    path = "/api/overtime/scan",
    request_body = ScanForm,
    responses(
        (status = 200, description = "Scan recorded", body = Object, example = json!({
            "success": 1, "action": "out", "time": "22:00:00", "hours": "1.25"
        })),
        (status = 404, description = "No approved request for the day", body = Object, example = json!({
            "success": 0, "message": "No approved overtime request for today"
        })),
        (status = 422, description = "Outside the scan window", body = Object, example = json!({
            "success": 0, "message": "Overtime scan allowed only between 8:30 PM and 10:00 PM"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
pub async fn log_scan(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    payload: web::Json<ScanForm>,
) -> actix_web::Result<impl Responder> {
    let employee_id = payload.employee_id;
    if employee_id == 0 {
        return Ok(invalid_inputs());
    }
    auth.require_self_or_staff(employee_id)?;

    let now = scanner_now(config.scan_timezone_offset_hours)?;
    let work_date = parse_day(payload.work_date.as_deref()).unwrap_or(now.date_naive());

    let approved: Option<(u64, Option<NaiveTime>, Option<NaiveTime>)> = sqlx::query_as(
        r#"
        SELECT ot_id, start_time, end_time FROM overtime_requests
        WHERE employee_id = ? AND work_date = ? AND status = 'approved'
        ORDER BY ot_id DESC LIMIT 1
        "#,
    )
    .bind(employee_id)
    .bind(work_date)
    .fetch_optional(pool.get_ref())
    .await
    .map_err(|e| internal_error(e, "Failed to load approved overtime"))?;

    let Some((ot_id, start, end)) = approved else {
        return Ok(not_found("No approved overtime request for today"));
    };

    match decide_scan(now.time(), start, end) {
        ScanOutcome::Rejected(message) => Ok(HttpResponse::UnprocessableEntity()
            .json(serde_json::json!({ "success": 0, "message": message }))),
        ScanOutcome::TimeIn { time } => {
            sqlx::query("UPDATE overtime_requests SET start_time = ? WHERE ot_id = ?")
                .bind(time)
                .bind(ot_id)
                .execute(pool.get_ref())
                .await
                .map_err(|e| internal_error(e, "Failed to record overtime time-in"))?;

            info!(employee_id, ot_id, time = %time, "Overtime time-in");
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "success": 1,
                "action": "in",
                "time": time
            })))
        }
        ScanOutcome::TimeOut { time, hours } => {
            sqlx::query("UPDATE overtime_requests SET end_time = ?, hours = ? WHERE ot_id = ?")
                .bind(time)
                .bind(hours)
                .bind(ot_id)
                .execute(pool.get_ref())
                .await
                .map_err(|e| internal_error(e, "Failed to record overtime time-out"))?;

            info!(employee_id, ot_id, time = %time, ?hours, "Overtime time-out");
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "success": 1,
                "action": "out",
                "time": time,
                "hours": hours
            })))
        }
        ScanOutcome::Done => Ok(HttpResponse::Ok().json(serde_json::json!({
            "success": 1,
            "action": "done",
            "message": "Overtime already completed"
        }))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn at(h: u32, m: u32) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(h, m, 0)
    }

    #[test]
    fn explicit_hours_win_over_clock_times() {
        assert_eq!(resolve_hours(Some(dec!(2.345)), at(20, 30), at(22, 0)), Some(dec!(2.35)));
        assert_eq!(resolve_hours(Some(dec!(0)), at(20, 30), at(22, 0)), Some(dec!(1.50)));
        assert_eq!(resolve_hours(None, at(20, 30), None), None);
    }

    #[test]
    fn scanner_clock_uses_the_configured_offset() {
        let manila = scanner_now(8).unwrap();
        assert_eq!(manila.offset().local_minus_utc(), 8 * 3600);
        assert!(scanner_now(30).is_err());
    }
}
