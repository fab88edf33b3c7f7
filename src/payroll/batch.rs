//! Batch lifecycle: create, list, edit and status changes on payroll batches.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use moka::future::Cache;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, instrument};
use utoipa::ToSchema;

use crate::error::{PayrollError, Result};
use crate::model::payroll_batch::{
    BatchDraft, BatchEmployeeRecord, BatchFilter, BatchForm, BatchStatus, PayrollBatch,
};
use crate::payroll::gateway::PayrollApi;

const LIST_CACHE_CAPACITY: u64 = 256;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchEmployeeView {
    #[serde(flatten)]
    pub record: BatchEmployeeRecord,
    /// `paid` once the batch is completed
    #[schema(example = "paid")]
    pub pay_status: &'static str,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchDetail {
    pub batch: PayrollBatch,
    pub employees: Vec<BatchEmployeeView>,
    #[schema(value_type = String, example = "412530.75")]
    pub total_net_pay: Decimal,
}

pub struct BatchManager {
    api: Arc<dyn PayrollApi>,
    list_cache: Cache<BatchFilter, Arc<Vec<PayrollBatch>>>,
}

impl BatchManager {
    pub fn new(api: Arc<dyn PayrollApi>, list_ttl: Duration) -> Self {
        let list_cache = Cache::builder()
            .max_capacity(LIST_CACHE_CAPACITY)
            .time_to_live(list_ttl)
            .build();

        Self { api, list_cache }
    }

    #[instrument(skip(self, form))]
    pub async fn create(&self, form: BatchForm) -> Result<PayrollBatch> {
        let draft = validate_form(form)?;
        let batch = self.api.create_batch(&draft).await?;

        info!(batch_id = batch.batch_id, employees = batch.total_employees, "Payroll batch created");
        self.refresh_list_view();
        Ok(batch)
    }

    /// Served from the list cache until a mutation or the TTL clears it.
    pub async fn list(&self, filter: BatchFilter) -> Result<Arc<Vec<PayrollBatch>>> {
        let filter = normalize_filter(filter);

        if let Some(hit) = self.list_cache.get(&filter).await {
            debug!(filter = ?filter, "Batch list served from cache");
            return Ok(hit);
        }

        let batches = Arc::new(self.api.list_batches(&filter).await?);
        self.list_cache.insert(filter, batches.clone()).await;
        Ok(batches)
    }

    pub async fn get(&self, batch_id: u64) -> Result<PayrollBatch> {
        self.api
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| PayrollError::NotFound("Batch not found".into()))
    }

    pub async fn list_employees(&self, batch_id: u64) -> Result<Vec<BatchEmployeeRecord>> {
        self.api.list_batch_employees(batch_id).await
    }

    pub async fn detail(&self, batch_id: u64) -> Result<BatchDetail> {
        let (batch, records) =
            futures::try_join!(self.get(batch_id), self.list_employees(batch_id))?;

        let pay_status = if batch.status == BatchStatus::Completed {
            "paid"
        } else {
            "pending"
        };
        let total_net_pay = records.iter().map(|r| r.net_pay).sum();
        let employees = records
            .into_iter()
            .map(|record| BatchEmployeeView { record, pay_status })
            .collect();

        Ok(BatchDetail {
            batch,
            employees,
            total_net_pay,
        })
    }

    /// Fields left out of `changes` keep their stored value; a field sent
    /// empty is a validation failure.
    #[instrument(skip(self, changes))]
    pub async fn update(&self, batch_id: u64, changes: BatchForm) -> Result<PayrollBatch> {
        let current = self.get(batch_id).await?;

        let merged = BatchForm {
            batch_name: changes.batch_name.or(Some(current.batch_name.clone())),
            payroll_period_start: changes
                .payroll_period_start
                .or_else(|| Some(current.payroll_period_start.to_string())),
            payroll_period_end: changes
                .payroll_period_end
                .or_else(|| Some(current.payroll_period_end.to_string())),
            department: changes.department.or(current.department.clone()),
            notes: changes.notes.or(current.notes.clone()),
        };
        let draft = validate_form(merged)?;

        if current.status == BatchStatus::Completed {
            return Err(PayrollError::Locked(batch_id));
        }

        if !self.api.update_batch(batch_id, &draft).await? {
            return Err(PayrollError::NotFound("Batch not found".into()));
        }

        info!(batch_id, "Payroll batch updated");
        self.refresh_list_view();
        self.get(batch_id).await
    }

    /// Any status is accepted; there is no transition table.
    #[instrument(skip(self))]
    pub async fn set_status(&self, batch_id: u64, status: BatchStatus) -> Result<()> {
        if !self.api.set_batch_status(batch_id, status).await? {
            return Err(PayrollError::NotFound("Batch not found".into()));
        }

        info!(batch_id, status = %status, "Payroll batch status changed");
        self.refresh_list_view();
        Ok(())
    }

    pub async fn toggle_status(&self, batch_id: u64) -> Result<BatchStatus> {
        let next = self.get(batch_id).await?.status.toggled();
        self.set_status(batch_id, next).await?;
        Ok(next)
    }

    fn refresh_list_view(&self) {
        self.list_cache.invalidate_all();
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| PayrollError::Validation(format!("Invalid date: {}", value)))
}

fn validate_form(form: BatchForm) -> Result<BatchDraft> {
    let batch_name = non_blank(form.batch_name)
        .ok_or_else(|| PayrollError::Validation("Please enter a batch name".into()))?;

    let (Some(start), Some(end)) = (
        non_blank(form.payroll_period_start),
        non_blank(form.payroll_period_end),
    ) else {
        return Err(PayrollError::Validation(
            "Please select both start and end dates".into(),
        ));
    };

    Ok(BatchDraft {
        batch_name,
        payroll_period_start: parse_date(&start)?,
        payroll_period_end: parse_date(&end)?,
        department: non_blank(form.department),
        notes: non_blank(form.notes),
    })
}

fn normalize_filter(filter: BatchFilter) -> BatchFilter {
    BatchFilter {
        search: non_blank(filter.search),
        ..filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{InMemoryPayrollApi, sample_batch, sample_employee};
    use rust_decimal_macros::dec;

    fn manager(api: Arc<InMemoryPayrollApi>) -> BatchManager {
        BatchManager::new(api, Duration::from_secs(60))
    }

    fn form(name: &str, start: &str, end: &str) -> BatchForm {
        BatchForm {
            batch_name: Some(name.into()),
            payroll_period_start: Some(start.into()),
            payroll_period_end: Some(end.into()),
            ..Default::default()
        }
    }

    #[actix_web::test]
    async fn create_requires_name_and_both_dates() {
        let api = Arc::new(InMemoryPayrollApi::default());
        let manager = manager(api.clone());

        let err = manager.create(form("  ", "2024-05-16", "2024-05-31")).await.unwrap_err();
        assert!(matches!(err, PayrollError::Validation(ref m) if m == "Please enter a batch name"));

        let err = manager.create(form("May", "2024-05-16", "")).await.unwrap_err();
        assert!(
            matches!(err, PayrollError::Validation(ref m) if m == "Please select both start and end dates")
        );

        assert!(api.batches().is_empty());

        let batch = manager.create(form("May", "2024-05-16", "2024-05-31")).await.unwrap();
        assert_eq!(batch.status, BatchStatus::Pending);
        assert_eq!(batch.payroll_period_end, NaiveDate::from_ymd_opt(2024, 5, 31).unwrap());
    }

    #[actix_web::test]
    async fn get_is_stable_and_missing_batch_is_not_found() {
        let api = Arc::new(InMemoryPayrollApi::with_batch(
            sample_batch(4, BatchStatus::Pending),
            Vec::new(),
        ));
        let manager = manager(api);

        assert_eq!(manager.get(4).await.unwrap(), manager.get(4).await.unwrap());
        assert!(matches!(manager.get(99).await, Err(PayrollError::NotFound(_))));
    }

    #[actix_web::test]
    async fn update_with_empty_name_leaves_batch_unchanged() {
        let api = Arc::new(InMemoryPayrollApi::with_batch(
            sample_batch(4, BatchStatus::Processing),
            Vec::new(),
        ));
        let manager = manager(api.clone());
        let before = manager.get(4).await.unwrap();

        let changes = BatchForm {
            batch_name: Some(String::new()),
            ..Default::default()
        };
        let err = manager.update(4, changes).await.unwrap_err();

        assert!(matches!(err, PayrollError::Validation(_)));
        assert_eq!(manager.get(4).await.unwrap(), before);
    }

    #[actix_web::test]
    async fn update_merges_fields_and_rejects_completed_batches() {
        let api = Arc::new(InMemoryPayrollApi::with_batch(
            sample_batch(4, BatchStatus::Pending),
            Vec::new(),
        ));
        api.insert_batch(sample_batch(5, BatchStatus::Completed), Vec::new());
        let manager = manager(api);

        let changes = BatchForm {
            batch_name: Some("Renamed".into()),
            department: Some("".into()),
            ..Default::default()
        };
        let updated = manager.update(4, changes.clone()).await.unwrap();
        assert_eq!(updated.batch_name, "Renamed");
        assert_eq!(updated.department, None);
        assert_eq!(updated.payroll_period_start, NaiveDate::from_ymd_opt(2024, 5, 16).unwrap());

        assert!(matches!(manager.update(5, changes).await, Err(PayrollError::Locked(5))));
    }

    #[actix_web::test]
    async fn list_is_cached_until_a_mutation() {
        let api = Arc::new(InMemoryPayrollApi::with_batch(
            sample_batch(1, BatchStatus::Pending),
            Vec::new(),
        ));
        let manager = manager(api.clone());

        assert_eq!(manager.list(BatchFilter::default()).await.unwrap().len(), 1);
        assert_eq!(manager.list(BatchFilter::default()).await.unwrap().len(), 1);
        assert_eq!(api.list_calls(), 1);

        // bypasses the manager, so the cached view is stale
        api.insert_batch(sample_batch(2, BatchStatus::Pending), Vec::new());
        assert_eq!(manager.list(BatchFilter::default()).await.unwrap().len(), 1);

        manager.set_status(1, BatchStatus::Processing).await.unwrap();
        assert_eq!(manager.list(BatchFilter::default()).await.unwrap().len(), 2);
        assert_eq!(api.list_calls(), 2);
    }

    #[actix_web::test]
    async fn toggle_flips_completed_and_processing() {
        let api = Arc::new(InMemoryPayrollApi::with_batch(
            sample_batch(7, BatchStatus::Completed),
            Vec::new(),
        ));
        let manager = manager(api);

        assert_eq!(manager.toggle_status(7).await.unwrap(), BatchStatus::Processing);
        assert_eq!(manager.toggle_status(7).await.unwrap(), BatchStatus::Completed);
        assert!(matches!(manager.set_status(8, BatchStatus::Failed).await, Err(PayrollError::NotFound(_))));
    }

    #[actix_web::test]
    async fn detail_sums_net_pay_and_marks_pay_status() {
        let mut high = sample_employee(2, "Maria", "Santos");
        high.net_pay = dec!(40000.50);
        let api = Arc::new(InMemoryPayrollApi::with_batch(
            sample_batch(3, BatchStatus::Completed),
            vec![sample_employee(1, "Juan", "Dela Cruz"), high],
        ));
        let manager = manager(api);

        let detail = manager.detail(3).await.unwrap();
        assert_eq!(detail.employees.len(), 2);
        assert!(detail.employees.iter().all(|e| e.pay_status == "paid"));
        assert_eq!(
            detail.total_net_pay,
            sample_employee(1, "Juan", "Dela Cruz").net_pay + dec!(40000.50)
        );
    }
}
