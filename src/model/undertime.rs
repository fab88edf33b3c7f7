use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct UndertimeRecord {
    pub ut_id: u64,
    pub employee_id: u64,
    #[schema(value_type = String, format = "date")]
    pub work_date: NaiveDate,
    #[schema(value_type = String, example = "2.00")]
    pub hours: Decimal,
    #[schema(value_type = Option<String>, example = "15:00:00")]
    pub start_time: Option<NaiveTime>,
    #[schema(value_type = Option<String>, example = "17:00:00")]
    pub end_time: Option<NaiveTime>,
    pub reason: Option<String>,
    #[schema(example = "pending")]
    pub status: String,
    pub approved_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub approved_at: Option<NaiveDateTime>,
    pub rejected_by: Option<u64>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub rejected_at: Option<NaiveDateTime>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub approved_by_username: Option<String>,
    pub rejected_by_username: Option<String>,
}

/// Used for both new requests and edits.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UndertimeForm {
    /// defaults to the caller's linked employee
    pub employee_id: Option<u64>,
    #[schema(example = "2024-05-20")]
    pub work_date: Option<String>,
    #[schema(value_type = Option<f64>, example = 2.0)]
    pub hours: Option<Decimal>,
    #[schema(example = "15:00")]
    pub start_time: Option<String>,
    #[schema(example = "17:00")]
    pub end_time: Option<String>,
    pub reason: Option<String>,
}

impl UndertimeForm {
    /// Hours must be present and positive.
    pub fn valid_hours(&self) -> Option<Decimal> {
        self.hours.filter(|h| *h > Decimal::ZERO)
    }
}
