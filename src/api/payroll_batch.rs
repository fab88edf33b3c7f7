use std::str::FromStr;

use actix_web::http::header::ContentDisposition;
use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::error::PayrollError;
use crate::model::payroll_batch::{BatchFilter, BatchForm, BatchStatus, PayrollBatch};
use crate::payroll::archive::{ArchiveBuilder, BatchDownload};
use crate::payroll::batch::{BatchDetail, BatchManager};
use crate::payroll::deductions::{DeductionBreakdown, compute_deductions, parse_gross};
use crate::payroll::progress::{ArchiveProgress, ProgressBoard, ProgressReporter};
use crate::utils::pagination::Page;

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct BatchListQuery {
    /// Matches anywhere in the batch name
    #[schema(example = "May")]
    pub search: Option<String>,
    /// pending, processing, completed or failed; empty for all
    #[schema(example = "completed")]
    pub status: Option<String>,
    /// Batches whose period contains this date
    #[schema(example = "2024-05-20")]
    pub date: Option<String>,
    #[schema(example = 1)]
    pub page: Option<usize>,
    #[schema(example = 10)]
    pub per_page: Option<usize>,
}

impl BatchListQuery {
    fn filter(&self) -> Result<BatchFilter, PayrollError> {
        let status = match self.status.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(raw) => Some(
                BatchStatus::from_str(raw)
                    .map_err(|_| PayrollError::Validation(format!("Invalid status: {}", raw)))?,
            ),
        };

        let date = match self.date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|_| PayrollError::Validation(format!("Invalid date: {}", raw)))?,
            ),
        };

        Ok(BatchFilter {
            search: self.search.clone(),
            status,
            date,
        })
    }
}

#[derive(Serialize, ToSchema)]
pub struct BatchListResponse {
    pub data: Vec<PayrollBatch>,
    #[schema(example = 1)]
    pub page: usize,
    #[schema(example = 10)]
    pub per_page: usize,
    #[schema(example = 3)]
    pub pages: usize,
    #[schema(example = 25)]
    pub total: usize,
    #[schema(example = 1)]
    pub showing_from: usize,
    #[schema(example = 10)]
    pub showing_to: usize,
}

impl From<Page<PayrollBatch>> for BatchListResponse {
    fn from(page: Page<PayrollBatch>) -> Self {
        Self {
            data: page.data,
            page: page.page,
            per_page: page.per_page,
            pages: page.pages,
            total: page.total,
            showing_from: page.showing_from,
            showing_to: page.showing_to,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct StatusChange {
    pub status: BatchStatus,
}

#[derive(Deserialize, IntoParams)]
pub struct DeductionQuery {
    /// Monthly gross pay; anything non-numeric counts as zero
    pub gross: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ManifestFile {
    pub employee_id: u64,
    #[schema(example = "payslip_santos_2024-05-31.jpg")]
    pub filename: String,
    #[schema(example = "/api/payroll-batch/12/payslips/2")]
    pub url: String,
}

/// Returned instead of an archive when zipping is switched off.
#[derive(Serialize, ToSchema)]
pub struct DownloadManifest {
    #[schema(example = "Zipping not available. Payslips will be downloaded individually.")]
    pub notice: String,
    pub files: Vec<ManifestFile>,
}

#[derive(Serialize, ToSchema)]
pub struct DownloadProgress {
    #[schema(example = 1)]
    pub success: u8,
    pub progress: ArchiveProgress,
}

/// List payroll batches, one page at a time
#[utoipa::path(
    get,
    path = "/api/payroll-batch",
    params(BatchListQuery),
    responses(
        (status = 200, description = "Page of batches, newest first", body = BatchListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 422, description = "Invalid filter")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll Batch"
)]
pub async fn list_batches(
    auth: AuthUser,
    manager: web::Data<BatchManager>,
    query: web::Query<BatchListQuery>,
) -> actix_web::Result<HttpResponse> {
    auth.require_hr_or_admin()?;

    let batches = manager.list(query.filter()?).await?;
    let page = Page::slice(&batches, query.page, query.per_page);

    Ok(HttpResponse::Ok().json(BatchListResponse::from(page)))
}

/// Create a batch from the payroll rows of its period
#[utoipa::path(
    post,
    path = "/api/payroll-batch",
    request_body = BatchForm,
    responses(
        (status = 201, description = "Batch created", body = Object, example = json!({
            "success": 1, "batch_id": 12, "message": "Payroll batch created"
        })),
        (status = 422, description = "Missing name or period", body = Object, example = json!({
            "success": 0, "message": "Please enter a batch name"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll Batch"
)]
pub async fn create_batch(
    auth: AuthUser,
    manager: web::Data<BatchManager>,
    payload: web::Json<BatchForm>,
) -> actix_web::Result<HttpResponse> {
    auth.require_hr_or_admin()?;

    let batch = manager.create(payload.into_inner()).await?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": 1,
        "batch_id": batch.batch_id,
        "message": "Payroll batch created"
    })))
}

#[utoipa::path(
    get,
    path = "/api/payroll-batch/{batch_id}",
    params(("batch_id" = u64, Path, description = "Batch ID")),
    responses(
        (status = 200, description = "Batch found", body = Object, example = json!({
            "success": 1, "batch": {"batch_id": 12, "status": "completed"}
        })),
        (status = 404, description = "Batch not found"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll Batch"
)]
pub async fn get_batch(
    auth: AuthUser,
    manager: web::Data<BatchManager>,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    auth.require_hr_or_admin()?;

    let batch = manager.get(path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": 1, "batch": batch })))
}

/// Edit name, period, department or notes; fields left out keep their value
#[utoipa::path(
    put,
    path = "/api/payroll-batch/{batch_id}",
    params(("batch_id" = u64, Path, description = "Batch ID")),
    request_body = BatchForm,
    responses(
        (status = 200, description = "Batch updated", body = PayrollBatch),
        (status = 404, description = "Batch not found"),
        (status = 409, description = "Batch already completed"),
        (status = 422, description = "Name or period left empty"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll Batch"
)]
pub async fn update_batch(
    auth: AuthUser,
    manager: web::Data<BatchManager>,
    path: web::Path<u64>,
    payload: web::Json<BatchForm>,
) -> actix_web::Result<HttpResponse> {
    auth.require_hr_or_admin()?;

    let batch = manager.update(path.into_inner(), payload.into_inner()).await?;

    Ok(HttpResponse::Ok().json(batch))
}

#[utoipa::path(
    put,
    path = "/api/payroll-batch/{batch_id}/status",
    params(("batch_id" = u64, Path, description = "Batch ID")),
    request_body = StatusChange,
    responses(
        (status = 200, description = "Status changed", body = Object, example = json!({
            "success": 1, "status": "completed"
        })),
        (status = 404, description = "Batch not found"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll Batch"
)]
pub async fn set_batch_status(
    auth: AuthUser,
    manager: web::Data<BatchManager>,
    path: web::Path<u64>,
    payload: web::Json<StatusChange>,
) -> actix_web::Result<HttpResponse> {
    auth.require_hr_or_admin()?;

    let status = payload.status;
    manager.set_status(path.into_inner(), status).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": 1, "status": status })))
}

/// Flip between processing and completed
#[utoipa::path(
    put,
    path = "/api/payroll-batch/{batch_id}/toggle-status",
    params(("batch_id" = u64, Path, description = "Batch ID")),
    responses(
        (status = 200, description = "Status flipped", body = Object, example = json!({
            "success": 1, "status": "processing"
        })),
        (status = 404, description = "Batch not found"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll Batch"
)]
pub async fn toggle_batch_status(
    auth: AuthUser,
    manager: web::Data<BatchManager>,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    auth.require_hr_or_admin()?;

    let status = manager.toggle_status(path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": 1, "status": status })))
}

/// Batch with its employee pay rows
#[utoipa::path(
    get,
    path = "/api/payroll-batch/{batch_id}/employees",
    params(("batch_id" = u64, Path, description = "Batch ID")),
    responses(
        (status = 200, description = "Batch detail", body = BatchDetail),
        (status = 404, description = "Batch not found"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll Batch"
)]
pub async fn batch_employees(
    auth: AuthUser,
    manager: web::Data<BatchManager>,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    auth.require_hr_or_admin()?;

    let detail = manager.detail(path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(detail))
}

/// Statutory deductions for a monthly gross pay
#[utoipa::path(
    get,
    path = "/api/payroll-batch/deductions",
    params(DeductionQuery),
    responses(
        (status = 200, description = "Deduction breakdown", body = DeductionBreakdown),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll Batch"
)]
pub async fn preview_deductions(
    _auth: AuthUser,
    query: web::Query<DeductionQuery>,
) -> actix_web::Result<HttpResponse> {
    let gross = parse_gross(query.gross.as_deref().unwrap_or_default());

    Ok(HttpResponse::Ok().json(compute_deductions(gross)))
}

/// All payslips of a completed batch as one zip
#[utoipa::path(
    get,
    path = "/api/payroll-batch/{batch_id}/download",
    params(("batch_id" = u64, Path, description = "Batch ID")),
    responses(
        (status = 200, description = "`batch_{id}_payslips.zip`, or a manifest of single downloads when zipping is off",
         content_type = "application/zip", body = DownloadManifest),
        (status = 404, description = "Batch not found"),
        (status = 409, description = "Batch not completed, or a download is already being built"),
        (status = 422, description = "Batch has no employees"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll Batch"
)]
pub async fn download_batch(
    auth: AuthUser,
    builder: web::Data<ArchiveBuilder>,
    board: web::Data<ProgressBoard>,
    config: web::Data<Config>,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    auth.require_hr_or_admin()?;
    let batch_id = path.into_inner();

    let (reporter, progress) = ProgressReporter::channel();
    let (download, ()) = futures::join!(
        builder.build_archive(batch_id, reporter),
        board.follow(batch_id, progress)
    );

    match download? {
        BatchDownload::Archive(archive) => Ok(HttpResponse::Ok()
            .content_type("application/zip")
            .insert_header(ContentDisposition::attachment(archive.filename))
            .insert_header(("X-Payslips-Included", archive.entries.to_string()))
            .insert_header(("X-Payslips-Skipped", archive.skipped.to_string()))
            .body(archive.content)),
        BatchDownload::Individual(downloads) => {
            let files = downloads
                .payslips
                .into_iter()
                .map(|link| ManifestFile {
                    url: format!(
                        "{}/payroll-batch/{}/payslips/{}",
                        config.api_prefix, batch_id, link.employee_id
                    ),
                    employee_id: link.employee_id,
                    filename: link.filename,
                })
                .collect();

            Ok(HttpResponse::Ok().json(DownloadManifest {
                notice: downloads.notice.to_string(),
                files,
            }))
        }
    }
}

/// Latest progress of a batch download, for polling while the zip is built
#[utoipa::path(
    get,
    path = "/api/payroll-batch/{batch_id}/download/progress",
    params(("batch_id" = u64, Path, description = "Batch ID")),
    responses(
        (status = 200, description = "Last reported phase", body = DownloadProgress),
        (status = 404, description = "No download started for this batch"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll Batch"
)]
pub async fn download_progress(
    auth: AuthUser,
    board: web::Data<ProgressBoard>,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    auth.require_hr_or_admin()?;
    let batch_id = path.into_inner();

    let progress = board
        .latest(batch_id)
        .await
        .ok_or_else(|| PayrollError::NotFound("No download started for this batch".into()))?;

    Ok(HttpResponse::Ok().json(DownloadProgress {
        success: 1,
        progress,
    }))
}

/// One employee's payslip from a completed batch
#[utoipa::path(
    get,
    path = "/api/payroll-batch/{batch_id}/payslips/{employee_id}",
    params(
        ("batch_id" = u64, Path, description = "Batch ID"),
        ("employee_id" = u64, Path, description = "Employee ID")
    ),
    responses(
        (status = 200, description = "JPEG payslip", content_type = "image/jpeg"),
        (status = 404, description = "Batch or employee not found"),
        (status = 409, description = "Batch not completed"),
        (status = 500, description = "Payslip could not be rendered"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll Batch"
)]
pub async fn download_payslip(
    auth: AuthUser,
    builder: web::Data<ArchiveBuilder>,
    path: web::Path<(u64, u64)>,
) -> actix_web::Result<HttpResponse> {
    let (batch_id, employee_id) = path.into_inner();
    auth.require_self_or_staff(employee_id)?;

    let payslip = builder.render_one(batch_id, employee_id).await?;

    Ok(HttpResponse::Ok()
        .content_type("image/jpeg")
        .insert_header(ContentDisposition::attachment(payslip.filename))
        .body(payslip.content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::middleware::auth_middleware;
    use crate::model::role::Role;
    use crate::payroll::archive::FALLBACK_NOTICE;
    use crate::routes::payroll_batch_routes;
    use crate::test_utils::{
        FakeRenderer, InMemoryPayrollApi, bearer_token, sample_batch, sample_employee, test_config,
    };
    use actix_web::middleware::from_fn;
    use actix_web::{App, http::StatusCode, test};
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;

    macro_rules! app {
        ($api:expr, $compression:expr) => {{
            let api: Arc<InMemoryPayrollApi> = $api;
            let manager = BatchManager::new(api.clone(), Duration::from_secs(60));
            let builder = ArchiveBuilder::new(api, Arc::new(FakeRenderer::default()), $compression);
            test::init_service(
                App::new()
                    .app_data(web::Data::new(test_config()))
                    .app_data(web::Data::new(manager))
                    .app_data(web::Data::new(builder))
                    .app_data(web::Data::new(ProgressBoard::default()))
                    .service(
                        web::scope("/api")
                            .wrap(from_fn(auth_middleware))
                            .configure(payroll_batch_routes),
                    ),
            )
            .await
        }};
    }

    fn seeded() -> Arc<InMemoryPayrollApi> {
        let api = InMemoryPayrollApi::default();
        for id in 1..=25 {
            api.insert_batch(sample_batch(id, BatchStatus::Processing), Vec::new());
        }
        api.insert_batch(
            sample_batch(30, BatchStatus::Completed),
            vec![sample_employee(1, "Juan", "Dela Cruz"), sample_employee(2, "Maria", "Santos")],
        );
        Arc::new(api)
    }

    fn hr() -> (&'static str, String) {
        ("Authorization", bearer_token(Role::Hr, None))
    }

    #[actix_web::test]
    async fn list_clamps_page_and_reports_range() {
        let app = app!(seeded(), true);

        let req = test::TestRequest::get()
            .uri("/api/payroll-batch?status=processing&page=9&per_page=10")
            .insert_header(hr())
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["page"], 3);
        assert_eq!(body["pages"], 3);
        assert_eq!(body["total"], 25);
        assert_eq!(body["showing_from"], 21);
        assert_eq!(body["showing_to"], 25);
        assert_eq!(body["data"].as_array().unwrap().len(), 5);
    }

    #[actix_web::test]
    async fn requests_without_token_or_role_are_refused() {
        let app = app!(seeded(), true);

        let req = test::TestRequest::get().uri("/api/payroll-batch").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get()
            .uri("/api/payroll-batch")
            .insert_header(("Authorization", bearer_token(Role::Employee, Some(1))))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn create_validates_and_reports_new_id() {
        let app = app!(seeded(), true);

        let req = test::TestRequest::post()
            .uri("/api/payroll-batch")
            .insert_header(hr())
            .set_json(serde_json::json!({"batch_name": "", "payroll_period_start": "2024-06-01"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, serde_json::json!({"success": 0, "message": "Please enter a batch name"}));

        let req = test::TestRequest::post()
            .uri("/api/payroll-batch")
            .insert_header(hr())
            .set_json(serde_json::json!({
                "batch_name": "June 2024",
                "payroll_period_start": "2024-06-01",
                "payroll_period_end": "2024-06-15"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], 1);
        assert_eq!(body["batch_id"], 31);
    }

    #[actix_web::test]
    async fn toggle_and_missing_batch() {
        let app = app!(seeded(), true);

        let req = test::TestRequest::put()
            .uri("/api/payroll-batch/30/toggle-status")
            .insert_header(hr())
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "processing");

        let req = test::TestRequest::get()
            .uri("/api/payroll-batch/404")
            .insert_header(hr())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn download_streams_zip_for_completed_batch() {
        let app = app!(seeded(), true);

        let req = test::TestRequest::get()
            .uri("/api/payroll-batch/30/download")
            .insert_header(hr())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("content-type").unwrap(), "application/zip");
        let disposition = resp.headers().get("content-disposition").unwrap().to_str().unwrap();
        assert!(disposition.contains("batch_30_payslips.zip"));
        assert_eq!(resp.headers().get("x-payslips-included").unwrap(), "2");
        assert_eq!(resp.headers().get("x-payslips-skipped").unwrap(), "0");

        let req = test::TestRequest::get()
            .uri("/api/payroll-batch/5/download")
            .insert_header(hr())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn progress_is_readable_after_a_download() {
        let app = app!(seeded(), true);

        let progress_of = |id: u64| {
            test::TestRequest::get()
                .uri(&format!("/api/payroll-batch/{}/download/progress", id))
                .insert_header(hr())
                .to_request()
        };
        let resp = test::call_service(&app, progress_of(30)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get()
            .uri("/api/payroll-batch/30/download")
            .insert_header(hr())
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let body: Value = test::call_and_read_body_json(&app, progress_of(30)).await;
        assert_eq!(
            body,
            serde_json::json!({"success": 1, "progress": {"phase": "compressing", "percent": 100}})
        );
    }

    #[actix_web::test]
    async fn download_without_compression_returns_manifest() {
        let app = app!(seeded(), false);

        let req = test::TestRequest::get()
            .uri("/api/payroll-batch/30/download")
            .insert_header(hr())
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["notice"], FALLBACK_NOTICE);
        assert_eq!(body["files"][1]["url"], "/api/payroll-batch/30/payslips/2");
        assert_eq!(body["files"][1]["filename"], "payslip_santos_2024-05-31.jpg");
    }

    #[actix_web::test]
    async fn employee_can_fetch_only_own_payslip() {
        let app = app!(seeded(), true);

        let req = test::TestRequest::get()
            .uri("/api/payroll-batch/30/payslips/2")
            .insert_header(("Authorization", bearer_token(Role::Employee, Some(2))))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("content-type").unwrap(), "image/jpeg");
        let body = test::read_body(resp).await;
        assert_eq!(body.as_ref(), FakeRenderer::content_for(2).as_slice());

        let req = test::TestRequest::get()
            .uri("/api/payroll-batch/30/payslips/1")
            .insert_header(("Authorization", bearer_token(Role::Employee, Some(2))))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn deduction_preview_uses_the_schedule() {
        let app = app!(seeded(), true);

        let req = test::TestRequest::get()
            .uri("/api/payroll-batch/deductions?gross=50000")
            .insert_header(("Authorization", bearer_token(Role::Employee, Some(2))))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        let amount = |key: &str| body[key].as_str().and_then(|v| v.parse::<rust_decimal::Decimal>().ok());
        assert_eq!(amount("tax"), Some(rust_decimal_macros::dec!(6666.75)));
        assert_eq!(amount("philhealth"), Some(rust_decimal_macros::dec!(1250)));
    }
}
