//! SQL shared by the overtime and undertime workflows.

use chrono::NaiveDate;
use sqlx::MySqlPool;
use tracing::{debug, warn};

use crate::model::time_request::{Decision, RequestFilter, RequestKind};
use crate::utils::db_utils::SqlValue;

/// Row selection with the employee's name and the approver/rejecter usernames.
pub fn request_select(kind: RequestKind) -> String {
    format!(
        r#"
        SELECT r.*, e.first_name, e.last_name,
               u1.username AS approved_by_username,
               u2.username AS rejected_by_username
        FROM {} r
        LEFT JOIN employees e ON e.id = r.employee_id
        LEFT JOIN users u1 ON u1.id = r.approved_by
        LEFT JOIN users u2 ON u2.id = r.rejected_by
        "#,
        kind.table()
    )
}

fn parse_day(value: Option<&str>) -> Option<NaiveDate> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok())
}

/// WHERE clause for the listing filters; unparsable dates are ignored.
pub fn filter_clause(filter: &RequestFilter, approved_only: bool) -> (String, Vec<SqlValue>) {
    let mut conditions = Vec::new();
    let mut bindings = Vec::new();

    if approved_only {
        conditions.push("r.status = 'approved'");
    }
    if let Some(start) = parse_day(filter.start_date.as_deref()) {
        conditions.push("r.work_date >= ?");
        bindings.push(SqlValue::Date(start));
    }
    if let Some(end) = parse_day(filter.end_date.as_deref()) {
        conditions.push("r.work_date <= ?");
        bindings.push(SqlValue::Date(end));
    }
    if !approved_only {
        if let Some(employee_id) = filter.employee_id.filter(|id| *id > 0) {
            conditions.push("r.employee_id = ?");
            bindings.push(SqlValue::U64(employee_id));
        }
        if let Some(status) = filter.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            conditions.push("r.status = ?");
            bindings.push(SqlValue::String(status.to_string()));
        }
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    (clause, bindings)
}

/// Status change with its audit columns; the opposite decision's pair is cleared.
pub fn decision_sql(kind: RequestKind, decision: Decision) -> String {
    let audit = match decision {
        Decision::Approve => {
            "approved_by = ?, approved_at = NOW(), rejected_by = NULL, rejected_at = NULL"
        }
        Decision::Reject => {
            "rejected_by = ?, rejected_at = NOW(), approved_by = NULL, approved_at = NULL"
        }
    };

    format!(
        "UPDATE {} SET status = ?, {} WHERE {} = ?",
        kind.table(),
        audit,
        kind.id_column()
    )
}

/// Applies the decision and notifies the employee. `false` when no request
/// matched. A failed notification is logged and otherwise ignored.
pub async fn decide(
    pool: &MySqlPool,
    kind: RequestKind,
    request_id: u64,
    decision: Decision,
    actor_user_id: u64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(&decision_sql(kind, decision))
        .bind(decision.status().to_string())
        .bind(actor_user_id)
        .bind(request_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Ok(false);
    }

    if let Err(e) = notify_employee(pool, kind, request_id, decision, actor_user_id).await {
        warn!(error = %e, request_id, ?kind, "Failed to notify employee");
    }

    Ok(true)
}

async fn notify_employee(
    pool: &MySqlPool,
    kind: RequestKind,
    request_id: u64,
    decision: Decision,
    actor_user_id: u64,
) -> Result<(), sqlx::Error> {
    let sql = format!(
        "SELECT employee_id FROM {} WHERE {} = ? LIMIT 1",
        kind.table(),
        kind.id_column()
    );
    let employee_id: Option<u64> = sqlx::query_scalar(&sql)
        .bind(request_id)
        .fetch_optional(pool)
        .await?;

    let Some(employee_id) = employee_id.filter(|id| *id > 0) else {
        return Ok(());
    };

    sqlx::query(
        "INSERT INTO notifications (employee_id, message, type, actor_user_id) VALUES (?, ?, ?, ?)",
    )
    .bind(employee_id)
    .bind(kind.notification(decision))
    .bind(decision.status().to_string())
    .bind(actor_user_id)
    .execute(pool)
    .await?;

    debug!(employee_id, request_id, ?kind, "Employee notified");
    Ok(())
}
