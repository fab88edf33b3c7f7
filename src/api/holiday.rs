use crate::api::{internal_error, not_found, parse_day};
use crate::auth::auth::AuthUser;
use crate::model::holiday::{
    CreateHoliday, GenerateRecurring, Holiday, HolidayEntry, UpdateHoliday, expand_recurring,
    month_range,
};
use crate::utils::db_utils::{SqlValue, build_update_sql, execute_update};
use actix_web::{HttpResponse, Responder, web};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

const HOLIDAY_COLUMNS: &str = "id, holiday_date, holiday_name, description, is_recurring, \
                               original_date, created_at, updated_at";

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct HolidayQuery {
    /// With `end_date`, overrides month/year
    #[schema(example = "2024-12-01")]
    pub start_date: Option<String>,
    #[schema(example = "2024-12-31")]
    pub end_date: Option<String>,
    #[schema(example = 12)]
    pub month: Option<u32>,
    #[schema(example = 2024)]
    pub year: Option<i32>,
}

impl HolidayQuery {
    fn range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let explicit = (
            parse_day(self.start_date.as_deref()),
            parse_day(self.end_date.as_deref()),
        );
        match explicit {
            (Some(start), Some(end)) => (start, end),
            _ => month_range(self.month, self.year, today),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct HolidayListResponse {
    #[schema(example = 1)]
    pub success: u8,
    pub data: Vec<HolidayEntry>,
}

#[derive(Serialize, ToSchema)]
pub struct GenerateRecurringResponse {
    #[schema(example = 1)]
    pub success: u8,
    #[schema(example = "Generated 12 holidays for 2025")]
    pub message: String,
    pub created: u32,
    pub skipped: u32,
    pub errors: Vec<String>,
}

fn unprocessable(message: &str) -> HttpResponse {
    HttpResponse::UnprocessableEntity().json(serde_json::json!({ "success": 0, "message": message }))
}

/// Columns an edit may touch. Blank names and unparsable dates are ignored.
fn update_fields(payload: &UpdateHoliday) -> Vec<(&'static str, SqlValue)> {
    let mut fields = Vec::new();

    if let Some(date) = parse_day(payload.holiday_date.as_deref()) {
        fields.push(("holiday_date", SqlValue::Date(date)));
    }
    if let Some(name) = payload.holiday_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        fields.push(("holiday_name", SqlValue::String(name.to_string())));
    }
    if let Some(description) = payload.description.as_deref() {
        fields.push(("description", SqlValue::String(description.trim().to_string())));
    }

    fields
}

async fn fetch_holiday(pool: &MySqlPool, id: u64) -> Result<Option<Holiday>, sqlx::Error> {
    sqlx::query_as::<_, Holiday>(&format!("SELECT {} FROM holidays WHERE id = ?", HOLIDAY_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await
}

async fn holiday_exists(pool: &MySqlPool, date: NaiveDate, name: &str) -> Result<bool, sqlx::Error> {
    let found: Option<u64> =
        sqlx::query_scalar("SELECT id FROM holidays WHERE holiday_date = ? AND holiday_name = ? LIMIT 1")
            .bind(date)
            .bind(name)
            .fetch_optional(pool)
            .await?;
    Ok(found.is_some())
}

async fn recurring_templates(pool: &MySqlPool) -> Result<Vec<Holiday>, sqlx::Error> {
    sqlx::query_as::<_, Holiday>(&format!(
        "SELECT {} FROM holidays WHERE is_recurring = 1",
        HOLIDAY_COLUMNS
    ))
    .fetch_all(pool)
    .await
}

/// Holidays in a date range, recurring ones filled in for the range's year
#[utoipa::path(
    get,
    path = "/api/holidays",
    params(HolidayQuery),
    responses(
        (status = 200, description = "Holidays sorted by date", body = HolidayListResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Holiday"
)]
pub async fn list_holidays(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<HolidayQuery>,
) -> actix_web::Result<impl Responder> {
    let (start, end) = query.range(Utc::now().date_naive());

    let sql = format!(
        "SELECT {} FROM holidays WHERE holiday_date BETWEEN ? AND ? ORDER BY holiday_date ASC, id ASC",
        HOLIDAY_COLUMNS
    );
    let (actual, recurring) = futures::try_join!(
        sqlx::query_as::<_, Holiday>(&sql)
            .bind(start)
            .bind(end)
            .fetch_all(pool.get_ref()),
        recurring_templates(pool.get_ref())
    )
    .map_err(|e| internal_error(e, "Failed to list holidays"))?;

    Ok(HttpResponse::Ok().json(HolidayListResponse {
        success: 1,
        data: expand_recurring(actual, &recurring, start, end),
    }))
}

#[utoipa::path(
    get,
    path = "/api/holidays/{id}",
    params(("id" = u64, Path, description = "Holiday ID")),
    responses(
        (status = 200, description = "Holiday found", body = Holiday),
        (status = 404, description = "Holiday not found"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Holiday"
)]
pub async fn get_holiday(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();

    let holiday = fetch_holiday(pool.get_ref(), id)
        .await
        .map_err(|e| internal_error(e, "Failed to fetch holiday"))?;

    match holiday {
        Some(h) => Ok(HttpResponse::Ok().json(serde_json::json!({ "success": 1, "data": h }))),
        None => Ok(not_found("Holiday not found")),
    }
}

#[utoipa::path(
    post,
    path = "/api/holidays",
    request_body = CreateHoliday,
    responses(
        (status = 201, description = "Holiday created", body = Object, example = json!({
            "success": 1, "data": {"id": 4, "holiday_date": "2024-04-09", "holiday_name": "Araw ng Kagitingan"}
        })),
        (status = 409, description = "Same holiday already on that date", body = Object, example = json!({
            "success": 0, "message": "Holiday already exists for this date"
        })),
        (status = 422, description = "Invalid date or missing name"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Holiday"
)]
pub async fn create_holiday(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateHoliday>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let Some(date) = parse_day(payload.holiday_date.as_deref()) else {
        return Ok(unprocessable("Valid date (YYYY-MM-DD) is required"));
    };
    let name = payload.holiday_name.as_deref().map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Ok(unprocessable("Holiday name is required"));
    }

    let exists = holiday_exists(pool.get_ref(), date, name)
        .await
        .map_err(|e| internal_error(e, "Failed to check holiday"))?;
    if exists {
        return Ok(HttpResponse::Conflict().json(serde_json::json!({
            "success": 0,
            "message": "Holiday already exists for this date"
        })));
    }

    let description = payload.description.as_deref().map(str::trim);
    let result = sqlx::query(
        r#"
        INSERT INTO holidays (holiday_date, holiday_name, description, is_recurring, original_date)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(date)
    .bind(name)
    .bind(description)
    .bind(payload.is_recurring)
    .bind(date)
    .execute(pool.get_ref())
    .await
    .map_err(|e| internal_error(e, "Failed to create holiday"))?;

    let holiday = fetch_holiday(pool.get_ref(), result.last_insert_id())
        .await
        .map_err(|e| internal_error(e, "Failed to fetch holiday"))?;

    info!(holiday_date = %date, holiday_name = name, by = %auth.username, "Holiday created");
    Ok(HttpResponse::Created().json(serde_json::json!({ "success": 1, "data": holiday })))
}

/// Partial edit; only non-empty, valid fields are written
#[utoipa::path(
    put,
    path = "/api/holidays/{id}",
    params(("id" = u64, Path, description = "Holiday ID")),
    request_body = UpdateHoliday,
    responses(
        (status = 200, description = "Holiday updated, or nothing to update", body = Object, example = json!({
            "success": 0, "message": "Nothing to update"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Holiday"
)]
pub async fn update_holiday(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<UpdateHoliday>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    let Some(update) = build_update_sql("holidays", update_fields(&payload), "id", id) else {
        return Ok(HttpResponse::Ok().json(serde_json::json!({
            "success": 0,
            "message": "Nothing to update"
        })));
    };

    execute_update(pool.get_ref(), update)
        .await
        .map_err(|e| internal_error(e, "Failed to update holiday"))?;

    let holiday = fetch_holiday(pool.get_ref(), id)
        .await
        .map_err(|e| internal_error(e, "Failed to fetch holiday"))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": 1, "data": holiday })))
}

#[utoipa::path(
    delete,
    path = "/api/holidays/{id}",
    params(("id" = u64, Path, description = "Holiday ID")),
    responses(
        (status = 200, description = "Holiday deleted", body = Object, example = json!({ "success": 1 })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Holiday"
)]
pub async fn delete_holiday(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    sqlx::query("DELETE FROM holidays WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| internal_error(e, "Failed to delete holiday"))?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": 1 })))
}

/// Copies every recurring holiday into `year`
#[utoipa::path(
    post,
    path = "/api/holidays/generate-recurring",
    request_body = GenerateRecurring,
    responses(
        (status = 200, description = "Generation report", body = GenerateRecurringResponse),
        (status = 422, description = "Year outside 1970..=9999", body = Object, example = json!({
            "success": 0, "message": "Valid year is required"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Holiday"
)]
pub async fn generate_recurring(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<GenerateRecurring>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let year = payload.year;
    if !(1970..=9999).contains(&year) {
        return Ok(unprocessable("Valid year is required"));
    }

    let templates = recurring_templates(pool.get_ref())
        .await
        .map_err(|e| internal_error(e, "Failed to load recurring holidays"))?;

    let mut created = 0u32;
    let mut skipped = 0u32;
    let mut errors = Vec::new();

    for template in &templates {
        let Some(date) = template.recurrence_in(year) else {
            errors.push(format!(
                "Failed to create {}: {} has no such day",
                template.holiday_name, year
            ));
            continue;
        };

        let exists = holiday_exists(pool.get_ref(), date, &template.holiday_name)
            .await
            .map_err(|e| internal_error(e, "Failed to check holiday"))?;
        if exists {
            skipped += 1;
            continue;
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO holidays (holiday_date, holiday_name, description, is_recurring, original_date)
            VALUES (?, ?, ?, 0, ?)
            "#,
        )
        .bind(date)
        .bind(&template.holiday_name)
        .bind(&template.description)
        .bind(template.anchor_date())
        .execute(pool.get_ref())
        .await;

        match inserted {
            Ok(_) => created += 1,
            Err(e) => {
                warn!(error = %e, holiday_id = template.id, year, "Failed to generate holiday");
                errors.push(format!("Failed to create {}: {}", template.holiday_name, e));
            }
        }
    }

    info!(year, created, skipped, failed = errors.len(), by = %auth.username, "Recurring holidays generated");
    Ok(HttpResponse::Ok().json(GenerateRecurringResponse {
        success: 1,
        message: format!("Generated {} holidays for {}", created, year),
        created,
        skipped,
        errors,
    }))
}
