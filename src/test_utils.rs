//! Shared fixtures for unit and handler tests.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::NaiveDate;
use jsonwebtoken::{EncodingKey, Header, encode};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::Level;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{RenderError, Result};
use crate::model::payroll_batch::{
    BatchDraft, BatchEmployeeRecord, BatchFilter, BatchStatus, PayrollBatch,
};
use crate::model::role::Role;
use crate::models::{Claims, TokenType};
use crate::payroll::gateway::PayrollApi;
use crate::payroll::payslip::{GeneratedPayslip, PayslipRenderer, payslip_filename};

pub const TEST_JWT_SECRET: &str = "test-secret";

pub fn test_config() -> Config {
    Config {
        database_url: "mysql://localhost/hrm_test".into(),
        jwt_secret: TEST_JWT_SECRET.into(),
        server_addr: "127.0.0.1:0".into(),
        api_prefix: "/api".into(),
        rate_protected_per_min: 1000,
        log_level: Level::DEBUG,
        company_name: "Unitop".into(),
        payslip_font_path: PathBuf::from("does/not/exist.ttf"),
        payslip_bold_font_path: None,
        payslip_logo_path: None,
        archive_compression: true,
        batch_list_cache_ttl: Duration::from_secs(60),
        scan_timezone_offset_hours: 8,
    }
}

/// `Authorization` header value for a user with `role`.
pub fn bearer_token(role: Role, employee_id: Option<u64>) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as usize;

    let claims = Claims {
        user_id: 1,
        sub: "tester".into(),
        role: role as u8,
        exp: now + 900,
        jti: Uuid::new_v4().to_string(),
        token_type: TokenType::Access,
        employee_id,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .unwrap();

    format!("Bearer {}", token)
}

/// A batch covering 2024-05-16..2024-05-31, created 2024-06-01 09:30.
pub fn sample_batch(batch_id: u64, status: BatchStatus) -> PayrollBatch {
    PayrollBatch {
        batch_id,
        batch_name: format!("May 2024 - 2nd cutoff #{}", batch_id),
        payroll_period_start: NaiveDate::from_ymd_opt(2024, 5, 16).unwrap(),
        payroll_period_end: NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
        department: Some("Finance".into()),
        status,
        total_employees: 0,
        total_amount: Decimal::ZERO,
        created_at: NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap(),
        notes: None,
    }
}

/// Defaults: basic 30,000, overtime 1,500, deductions 3,155, net 28,345.
pub fn sample_employee(employee_id: u64, first_name: &str, last_name: &str) -> BatchEmployeeRecord {
    BatchEmployeeRecord {
        employee_id,
        first_name: first_name.into(),
        last_name: last_name.into(),
        department: Some("Finance".into()),
        basic_salary: dec!(30000.00),
        overtime_pay: dec!(1500.00),
        deductions: dec!(3155.00),
        net_pay: dec!(28345.00),
    }
}

#[derive(Default)]
struct Ledger {
    batches: BTreeMap<u64, PayrollBatch>,
    employees: HashMap<u64, Vec<BatchEmployeeRecord>>,
}

/// Payroll API kept in memory. Counts list calls so cache hits can be observed.
#[derive(Default)]
pub struct InMemoryPayrollApi {
    ledger: Mutex<Ledger>,
    list_calls: AtomicUsize,
}

impl InMemoryPayrollApi {
    pub fn with_batch(batch: PayrollBatch, employees: Vec<BatchEmployeeRecord>) -> Self {
        let api = Self::default();
        api.insert_batch(batch, employees);
        api
    }

    pub fn insert_batch(&self, mut batch: PayrollBatch, employees: Vec<BatchEmployeeRecord>) {
        batch.total_employees = employees.len() as u32;
        batch.total_amount = employees.iter().map(|e| e.net_pay).sum();

        let mut ledger = self.ledger.lock().unwrap();
        ledger.employees.insert(batch.batch_id, employees);
        ledger.batches.insert(batch.batch_id, batch);
    }

    pub fn batches(&self) -> Vec<PayrollBatch> {
        self.ledger.lock().unwrap().batches.values().cloned().collect()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PayrollApi for InMemoryPayrollApi {
    async fn list_batches(&self, filter: &BatchFilter) -> Result<Vec<PayrollBatch>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let ledger = self.ledger.lock().unwrap();

        let search = filter.search.as_deref().map(str::to_lowercase);
        Ok(ledger
            .batches
            .values()
            .rev()
            .filter(|b| {
                search
                    .as_deref()
                    .is_none_or(|s| b.batch_name.to_lowercase().contains(s))
            })
            .filter(|b| filter.status.is_none_or(|s| b.status == s))
            .filter(|b| {
                filter
                    .date
                    .is_none_or(|d| b.payroll_period_start <= d && d <= b.payroll_period_end)
            })
            .cloned()
            .collect())
    }

    async fn get_batch(&self, batch_id: u64) -> Result<Option<PayrollBatch>> {
        Ok(self.ledger.lock().unwrap().batches.get(&batch_id).cloned())
    }

    async fn list_batch_employees(&self, batch_id: u64) -> Result<Vec<BatchEmployeeRecord>> {
        Ok(self
            .ledger
            .lock()
            .unwrap()
            .employees
            .get(&batch_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_batch(&self, draft: &BatchDraft) -> Result<PayrollBatch> {
        let batch_id = {
            let ledger = self.ledger.lock().unwrap();
            ledger.batches.keys().next_back().map_or(1, |id| id + 1)
        };

        let mut batch = sample_batch(batch_id, BatchStatus::Pending);
        batch.batch_name = draft.batch_name.clone();
        batch.payroll_period_start = draft.payroll_period_start;
        batch.payroll_period_end = draft.payroll_period_end;
        batch.department = draft.department.clone();
        batch.notes = draft.notes.clone();

        self.insert_batch(batch.clone(), Vec::new());
        Ok(batch)
    }

    async fn update_batch(&self, batch_id: u64, draft: &BatchDraft) -> Result<bool> {
        let mut ledger = self.ledger.lock().unwrap();
        let Some(batch) = ledger.batches.get_mut(&batch_id) else {
            return Ok(false);
        };

        batch.batch_name = draft.batch_name.clone();
        batch.payroll_period_start = draft.payroll_period_start;
        batch.payroll_period_end = draft.payroll_period_end;
        batch.department = draft.department.clone();
        batch.notes = draft.notes.clone();
        Ok(true)
    }

    async fn set_batch_status(&self, batch_id: u64, status: BatchStatus) -> Result<bool> {
        let mut ledger = self.ledger.lock().unwrap();
        match ledger.batches.get_mut(&batch_id) {
            Some(batch) => {
                batch.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Renders a few marker bytes instead of an image; fails for one employee on request.
#[derive(Default)]
pub struct FakeRenderer {
    fail_for: Option<u64>,
}

impl FakeRenderer {
    pub fn failing_for(employee_id: Option<u64>) -> Self {
        Self {
            fail_for: employee_id,
        }
    }

    pub fn content_for(employee_id: u64) -> Vec<u8> {
        format!("payslip-{}", employee_id).into_bytes()
    }
}

impl PayslipRenderer for FakeRenderer {
    fn render(
        &self,
        employee: &BatchEmployeeRecord,
        batch: &PayrollBatch,
    ) -> std::result::Result<GeneratedPayslip, RenderError> {
        if self.fail_for == Some(employee.employee_id) {
            return Err(RenderError::Surface("simulated failure".into()));
        }

        Ok(GeneratedPayslip {
            employee_id: employee.employee_id,
            filename: payslip_filename(employee, batch),
            content: Self::content_for(employee.employee_id),
        })
    }
}
