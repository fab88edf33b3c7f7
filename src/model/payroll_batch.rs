use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl BatchStatus {
    /// The list view's status button only flips between these two.
    pub fn toggled(self) -> Self {
        match self {
            BatchStatus::Completed => BatchStatus::Processing,
            _ => BatchStatus::Completed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(
    example = json!({
        "batch_id": 12,
        "batch_name": "May 2024 - 2nd cutoff",
        "payroll_period_start": "2024-05-16",
        "payroll_period_end": "2024-05-31",
        "department": "Finance",
        "status": "completed",
        "total_employees": 14,
        "total_amount": "412530.75",
        "created_at": "2024-06-01T09:30:00",
        "notes": null
    })
)]
pub struct PayrollBatch {
    pub batch_id: u64,
    pub batch_name: String,
    #[schema(value_type = String, format = "date")]
    pub payroll_period_start: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub payroll_period_end: NaiveDate,
    pub department: Option<String>,
    pub status: BatchStatus,
    pub total_employees: u32,
    #[schema(value_type = String, example = "412530.75")]
    pub total_amount: Decimal,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
    pub notes: Option<String>,
}

/// One employee's pay snapshot inside a batch. Owned by the payroll service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct BatchEmployeeRecord {
    pub employee_id: u64,
    pub first_name: String,
    pub last_name: String,
    pub department: Option<String>,
    #[schema(value_type = String, example = "30000.00")]
    pub basic_salary: Decimal,
    #[schema(value_type = String, example = "1500.00")]
    pub overtime_pay: Decimal,
    #[schema(value_type = String, example = "3155.00")]
    pub deductions: Decimal,
    #[schema(value_type = String, example = "28345.00")]
    pub net_pay: Decimal,
}

impl BatchEmployeeRecord {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Validated input for creating a batch or replacing its editable fields.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchDraft {
    pub batch_name: String,
    pub payroll_period_start: NaiveDate,
    pub payroll_period_end: NaiveDate,
    pub department: Option<String>,
    pub notes: Option<String>,
}

/// Create/edit form as submitted. Dates arrive as `YYYY-MM-DD` strings so an
/// empty field can be reported as a validation failure rather than a parse error.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct BatchForm {
    #[schema(example = "May 2024 - 2nd cutoff")]
    pub batch_name: Option<String>,
    #[schema(example = "2024-05-16", format = "date")]
    pub payroll_period_start: Option<String>,
    #[schema(example = "2024-05-31", format = "date")]
    pub payroll_period_end: Option<String>,
    /// empty means all departments
    #[schema(example = "Finance")]
    pub department: Option<String>,
    pub notes: Option<String>,
}

/// List filters; also the key of the cached list view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BatchFilter {
    pub search: Option<String>,
    pub status: Option<BatchStatus>,
    pub date: Option<NaiveDate>,
}
