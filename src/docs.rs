use crate::api::holiday::{GenerateRecurringResponse, HolidayListResponse, HolidayQuery};
use crate::api::overtime::DateRange;
use crate::api::payroll_batch::{
    BatchListQuery, BatchListResponse, DownloadManifest, DownloadProgress, ManifestFile,
    StatusChange,
};
use crate::model::holiday::{CreateHoliday, GenerateRecurring, Holiday, HolidayEntry, UpdateHoliday};
use crate::model::overtime::{OvertimeForm, OvertimeRecord, OvertimeUpdate, ScanForm};
use crate::model::payroll_batch::{
    BatchEmployeeRecord, BatchForm, BatchStatus, PayrollBatch,
};
use crate::model::time_request::{RequestFilter, RequestStatus};
use crate::model::undertime::{UndertimeForm, UndertimeRecord};
use crate::payroll::batch::{BatchDetail, BatchEmployeeView};
use crate::payroll::deductions::DeductionBreakdown;
use crate::payroll::progress::ArchiveProgress;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "HRM Payroll API",
        version = "1.0.0",
        description = r#"
## HRM Payroll Service

Batch payroll for the HR system: statutory deductions, payslips and batch downloads,
plus the holiday calendar and overtime/undertime requests that feed payroll.

### 🔹 Key Features
- **Payroll Batches**
  - Create a batch from a pay period, edit it, complete it, list and filter batches
  - Download every payslip of a completed batch as one zip
- **Deductions**
  - SSS, provident fund, PhilHealth, Pag-IBIG and withholding tax for a monthly gross
- **Holidays**
  - Calendar with recurring holidays filled in per year
- **Overtime / Undertime**
  - Requests, approvals, and overtime QR scans

### 🔐 Security
Every endpoint expects a **JWT Bearer** access token issued by the HR auth service.
Batch and approval operations are limited to **Admin** and **HR**.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::payroll_batch::list_batches,
        crate::api::payroll_batch::create_batch,
        crate::api::payroll_batch::get_batch,
        crate::api::payroll_batch::update_batch,
        crate::api::payroll_batch::set_batch_status,
        crate::api::payroll_batch::toggle_batch_status,
        crate::api::payroll_batch::batch_employees,
        crate::api::payroll_batch::preview_deductions,
        crate::api::payroll_batch::download_batch,
        crate::api::payroll_batch::download_progress,
        crate::api::payroll_batch::download_payslip,

        crate::api::holiday::list_holidays,
        crate::api::holiday::get_holiday,
        crate::api::holiday::create_holiday,
        crate::api::holiday::update_holiday,
        crate::api::holiday::delete_holiday,
        crate::api::holiday::generate_recurring,

        crate::api::overtime::request_overtime,
        crate::api::overtime::update_overtime,
        crate::api::overtime::list_by_employee,
        crate::api::overtime::list_pending,
        crate::api::overtime::list_approved,
        crate::api::overtime::list_all,
        crate::api::overtime::approve_overtime,
        crate::api::overtime::reject_overtime,
        crate::api::overtime::log_scan,

        crate::api::undertime::request_undertime,
        crate::api::undertime::update_undertime,
        crate::api::undertime::list_by_employee,
        crate::api::undertime::list_pending,
        crate::api::undertime::list_all,
        crate::api::undertime::approve_undertime,
        crate::api::undertime::reject_undertime
    ),
    components(
        schemas(
            PayrollBatch,
            BatchStatus,
            BatchForm,
            BatchEmployeeRecord,
            BatchEmployeeView,
            BatchDetail,
            BatchListQuery,
            BatchListResponse,
            StatusChange,
            DeductionBreakdown,
            DownloadManifest,
            ManifestFile,
            DownloadProgress,
            ArchiveProgress,
            Holiday,
            HolidayEntry,
            HolidayQuery,
            HolidayListResponse,
            CreateHoliday,
            UpdateHoliday,
            GenerateRecurring,
            GenerateRecurringResponse,
            RequestStatus,
            RequestFilter,
            DateRange,
            OvertimeRecord,
            OvertimeForm,
            OvertimeUpdate,
            ScanForm,
            UndertimeRecord,
            UndertimeForm
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Payroll Batch", description = "Payroll batch lifecycle and downloads"),
        (name = "Holiday", description = "Holiday calendar APIs"),
        (name = "Overtime", description = "Overtime requests and scans"),
        (name = "Undertime", description = "Undertime requests"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
