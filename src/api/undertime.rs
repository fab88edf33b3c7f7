use crate::api::{decide_request, internal_error, invalid_inputs, not_found, parse_day};
use crate::auth::auth::AuthUser;
use crate::model::overtime::parse_clock;
use crate::model::time_request::{Decision, RequestFilter, RequestKind, RequestStatus};
use crate::model::undertime::{UndertimeForm, UndertimeRecord};
use crate::payroll::deductions::round2;
use crate::utils::db_utils::bind_all_as;
use crate::utils::time_requests::{filter_clause, request_select};
use actix_web::{HttpResponse, Responder, web};
use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use sqlx::MySqlPool;
use std::str::FromStr;
use tracing::info;

const KIND: RequestKind = RequestKind::Undertime;

/// Validated request body shared by create and edit.
#[derive(Debug, PartialEq)]
struct UndertimeEntry {
    employee_id: u64,
    work_date: NaiveDate,
    hours: Decimal,
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
    reason: Option<String>,
}

impl UndertimeEntry {
    /// `fallback_employee` is used when the body names no employee.
    fn from_form(form: &UndertimeForm, fallback_employee: Option<u64>) -> Option<Self> {
        let employee_id = form.employee_id.filter(|id| *id > 0).or(fallback_employee)?;
        Some(Self {
            employee_id,
            work_date: parse_day(form.work_date.as_deref())?,
            hours: round2(form.valid_hours()?),
            start_time: form.start_time.as_deref().and_then(parse_clock),
            end_time: form.end_time.as_deref().and_then(parse_clock),
            reason: form.reason.as_deref().map(|r| r.trim().to_string()),
        })
    }
}

/// Only these states may still be edited.
fn editable(status: &str) -> bool {
    matches!(
        RequestStatus::from_str(status),
        Ok(RequestStatus::Pending | RequestStatus::Approved)
    )
}

#[utoipa::path(
    post,
    path = "/api/undertime",
    request_body = UndertimeForm,
    responses(
        (status = 201, description = "Request filed", body = Object, example = json!({
            "success": 1, "ut_id": 3, "status": "pending"
        })),
        (status = 422, description = "Missing employee, work date or positive hours", body = Object, example = json!({
            "success": 0, "message": "Invalid inputs"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Undertime"
)]
pub async fn request_undertime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<UndertimeForm>,
) -> actix_web::Result<impl Responder> {
    let Some(entry) = UndertimeEntry::from_form(&payload, auth.employee_id) else {
        return Ok(invalid_inputs());
    };
    auth.require_self_or_staff(entry.employee_id)?;

    let result = sqlx::query(
        r#"
        INSERT INTO undertime_requests
            (employee_id, work_date, hours, start_time, end_time, reason, status)
        VALUES (?, ?, ?, ?, ?, ?, 'pending')
        "#,
    )
    .bind(entry.employee_id)
    .bind(entry.work_date)
    .bind(entry.hours)
    .bind(entry.start_time)
    .bind(entry.end_time)
    .bind(&entry.reason)
    .execute(pool.get_ref())
    .await
    .map_err(|e| internal_error(e, "Failed to create undertime request"))?;

    info!(employee_id = entry.employee_id, work_date = %entry.work_date, "Undertime requested");
    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": 1,
        "ut_id": result.last_insert_id(),
        "status": "pending"
    })))
}

/// Edit a request that is pending or already approved
#[utoipa::path(
    put,
    path = "/api/undertime/{ut_id}",
    params(("ut_id" = u64, Path, description = "Undertime request ID")),
    request_body = UndertimeForm,
    responses(
        (status = 200, description = "Request updated", body = Object, example = json!({ "success": 1 })),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request was rejected"),
        (status = 422, description = "Invalid inputs"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Undertime"
)]
pub async fn update_undertime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UndertimeForm>,
) -> actix_web::Result<impl Responder> {
    let ut_id = path.into_inner();

    let current: Option<(u64, String)> =
        sqlx::query_as("SELECT employee_id, status FROM undertime_requests WHERE ut_id = ? LIMIT 1")
            .bind(ut_id)
            .fetch_optional(pool.get_ref())
            .await
            .map_err(|e| internal_error(e, "Failed to load undertime request"))?;

    let Some((current_employee, status)) = current else {
        return Ok(not_found("Request not found"));
    };
    auth.require_self_or_staff(current_employee)?;

    let fallback = auth.employee_id.or(Some(current_employee));
    let Some(entry) = UndertimeEntry::from_form(&payload, fallback) else {
        return Ok(invalid_inputs());
    };
    auth.require_self_or_staff(entry.employee_id)?;

    if !editable(&status) {
        return Ok(HttpResponse::Conflict().json(serde_json::json!({
            "success": 0,
            "message": "Only pending or approved requests can be edited"
        })));
    }

    sqlx::query(
        r#"
        UPDATE undertime_requests
        SET employee_id = ?, work_date = ?, hours = ?, start_time = ?, end_time = ?, reason = ?
        WHERE ut_id = ? AND status IN ('pending', 'approved')
        "#,
    )
    .bind(entry.employee_id)
    .bind(entry.work_date)
    .bind(entry.hours)
    .bind(entry.start_time)
    .bind(entry.end_time)
    .bind(&entry.reason)
    .bind(ut_id)
    .execute(pool.get_ref())
    .await
    .map_err(|e| internal_error(e, "Failed to update undertime request"))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": 1 })))
}

#[utoipa::path(
    get,
    path = "/api/undertime/employee/{employee_id}",
    params(("employee_id" = u64, Path, description = "Employee ID")),
    responses(
        (status = 200, description = "Latest 50 requests", body = [UndertimeRecord]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Undertime"
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
    let rows = sqlx::query_as::<_, UndertimeRecord>(&sql)
        .bind(employee_id)
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| internal_error(e, "Failed to list undertime requests"))?;

    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/undertime/pending",
    responses(
        (status = 200, description = "Pending requests, oldest first", body = [UndertimeRecord]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Undertime"
)]
pub async fn list_pending(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let sql = format!("{} WHERE r.status = 'pending' ORDER BY r.created_at ASC", request_select(KIND));
    let rows = sqlx::query_as::<_, UndertimeRecord>(&sql)
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| internal_error(e, "Failed to list pending undertime"))?;

    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    get,
    path = "/api/undertime",
    params(RequestFilter),
    responses(
        (status = 200, description = "Matching requests, newest first", body = [UndertimeRecord]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Undertime"
)]
pub async fn list_all(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<RequestFilter>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let (clause, values) = filter_clause(&query, false);
    let sql = format!(
        "{} {} ORDER BY r.created_at DESC, r.ut_id DESC",
        request_select(KIND),
        clause
    );
    let rows = bind_all_as(sqlx::query_as::<_, UndertimeRecord>(&sql), values)
        .fetch_all(pool.get_ref())
        .await
        .map_err(|e| internal_error(e, "Failed to list undertime requests"))?;

    Ok(HttpResponse::Ok().json(rows))
}

#[utoipa::path(
    put,
    path = "/api/undertime/{ut_id}/approve",
    params(("ut_id" = u64, Path, description = "Undertime request ID")),
    responses(
        (status = 200, description = "Request approved", body = Object, example = json!({
            "success": 1, "status": "approved"
        })),
        (status = 404, description = "Request not found"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Undertime"
)]
pub async fn approve_undertime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    decide_request(&auth, pool.get_ref(), KIND, path.into_inner(), Decision::Approve).await
}

#[utoipa::path(
    put,
    path = "/api/undertime/{ut_id}/reject",
    params(("ut_id" = u64, Path, description = "Undertime request ID")),
    responses(
        (status = 200, description = "Request rejected", body = Object, example = json!({
            "success": 1, "status": "rejected"
        })),
        (status = 404, description = "Request not found"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Undertime"
)]
pub async fn reject_undertime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    decide_request(&auth, pool.get_ref(), KIND, path.into_inner(), Decision::Reject).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn form(employee_id: Option<u64>, hours: Option<Decimal>) -> UndertimeForm {
        UndertimeForm {
            employee_id,
            work_date: Some("2024-05-20".into()),
            hours,
            start_time: Some("15:00".into()),
            end_time: Some("".into()),
            reason: Some(" dentist ".into()),
        }
    }

    #[test]
    fn entry_falls_back_to_the_callers_employee() {
        let entry = UndertimeEntry::from_form(&form(None, Some(dec!(2))), Some(9)).unwrap();

        assert_eq!(entry.employee_id, 9);
        assert_eq!(entry.start_time, NaiveTime::from_hms_opt(15, 0, 0));
        assert_eq!(entry.end_time, None);
        assert_eq!(entry.reason.as_deref(), Some("dentist"));
    }

    #[test]
    fn entry_needs_employee_and_positive_hours() {
        assert!(UndertimeEntry::from_form(&form(None, Some(dec!(2))), None).is_none());
        assert!(UndertimeEntry::from_form(&form(Some(4), Some(dec!(0))), None).is_none());
        assert!(UndertimeEntry::from_form(&form(Some(4), None), None).is_none());
    }

    #[test]
    fn rejected_requests_are_frozen() {
        assert!(editable("pending"));
        assert!(editable("approved"));
        assert!(!editable("rejected"));
        assert!(!editable("unknown"));
    }
}
