//! The Payroll API the batch pipeline consumes, and its MySQL adapter.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use sqlx::{FromRow, MySqlPool};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::{PayrollError, Result};
use crate::model::payroll_batch::{
    BatchDraft, BatchEmployeeRecord, BatchFilter, BatchStatus, PayrollBatch,
};
use crate::utils::db_utils::{SqlValue, bind_all_as, build_update_sql, execute_update};

#[async_trait]
pub trait PayrollApi: Send + Sync {
    async fn list_batches(&self, filter: &BatchFilter) -> Result<Vec<PayrollBatch>>;

    async fn get_batch(&self, batch_id: u64) -> Result<Option<PayrollBatch>>;

    async fn list_batch_employees(&self, batch_id: u64) -> Result<Vec<BatchEmployeeRecord>>;

    async fn create_batch(&self, draft: &BatchDraft) -> Result<PayrollBatch>;

    /// `false` when no batch matched.
    async fn update_batch(&self, batch_id: u64, draft: &BatchDraft) -> Result<bool>;

    /// `false` when no batch matched.
    async fn set_batch_status(&self, batch_id: u64, status: BatchStatus) -> Result<bool>;
}

#[derive(FromRow)]
struct BatchRow {
    batch_id: u64,
    batch_name: String,
    payroll_period_start: NaiveDate,
    payroll_period_end: NaiveDate,
    department: Option<String>,
    status: String,
    total_employees: u32,
    total_amount: Decimal,
    created_at: NaiveDateTime,
    notes: Option<String>,
}

impl From<BatchRow> for PayrollBatch {
    fn from(row: BatchRow) -> Self {
        let status = BatchStatus::from_str(&row.status).unwrap_or_else(|_| {
            warn!(batch_id = row.batch_id, status = %row.status, "Unknown batch status, treating as pending");
            BatchStatus::Pending
        });

        PayrollBatch {
            batch_id: row.batch_id,
            batch_name: row.batch_name,
            payroll_period_start: row.payroll_period_start,
            payroll_period_end: row.payroll_period_end,
            department: row.department,
            status,
            total_employees: row.total_employees,
            total_amount: row.total_amount,
            created_at: row.created_at,
            notes: row.notes,
        }
    }
}

const BATCH_COLUMNS: &str = r#"
    batch_id, batch_name, payroll_period_start, payroll_period_end, department,
    status, total_employees, total_amount, created_at, notes
"#;

pub struct MySqlPayrollApi {
    pool: MySqlPool,
}

impl MySqlPayrollApi {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PayrollApi for MySqlPayrollApi {
    async fn list_batches(&self, filter: &BatchFilter) -> Result<Vec<PayrollBatch>> {
        let mut conditions = Vec::new();
        let mut bindings: Vec<SqlValue> = Vec::new();

        if let Some(search) = &filter.search {
            conditions.push("batch_name LIKE ?");
            bindings.push(SqlValue::String(format!("%{}%", search)));
        }

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            bindings.push(SqlValue::String(status.to_string()));
        }

        if let Some(date) = filter.date {
            conditions.push("? BETWEEN payroll_period_start AND payroll_period_end");
            bindings.push(SqlValue::Date(date));
        }

        let where_clause = if conditions.is_empty() {
            "".to_string()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT {} FROM payroll_batches {} ORDER BY created_at DESC, batch_id DESC",
            BATCH_COLUMNS, where_clause
        );
        debug!(sql = %sql, bindings = ?bindings, "Listing payroll batches");

        let rows = bind_all_as(sqlx::query_as::<_, BatchRow>(&sql), bindings)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(PayrollBatch::from).collect())
    }

    async fn get_batch(&self, batch_id: u64) -> Result<Option<PayrollBatch>> {
        let sql = format!("SELECT {} FROM payroll_batches WHERE batch_id = ?", BATCH_COLUMNS);

        let row = sqlx::query_as::<_, BatchRow>(&sql)
            .bind(batch_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(PayrollBatch::from))
    }

    async fn list_batch_employees(&self, batch_id: u64) -> Result<Vec<BatchEmployeeRecord>> {
        let rows = sqlx::query_as::<_, BatchEmployeeRecord>(
            r#"
            SELECT
                be.employee_id,
                e.first_name,
                e.last_name,
                d.name AS department,
                be.basic_salary,
                be.overtime_pay,
                be.deductions,
                be.net_pay
            FROM payroll_batch_employees be
            INNER JOIN employees e ON e.id = be.employee_id
            LEFT JOIN departments d ON d.id = e.department_id
            WHERE be.batch_id = ?
            ORDER BY e.last_name ASC, e.first_name ASC
            "#,
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn create_batch(&self, draft: &BatchDraft) -> Result<PayrollBatch> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO payroll_batches
            (batch_name, payroll_period_start, payroll_period_end, department, status, notes)
            VALUES (?, ?, ?, ?, 'pending', ?)
            "#,
        )
        .bind(&draft.batch_name)
        .bind(draft.payroll_period_start)
        .bind(draft.payroll_period_end)
        .bind(&draft.department)
        .bind(&draft.notes)
        .execute(&mut *tx)
        .await?;

        let batch_id = inserted.last_insert_id();

        // snapshot the pay rows of the period into the batch
        let snapshot = sqlx::query(
            r#"
            INSERT INTO payroll_batch_employees
            (batch_id, employee_id, basic_salary, overtime_pay, deductions, net_pay)
            SELECT ?, p.employee_id, p.basic_salary, p.overtime_pay, p.deductions, p.net_pay
            FROM payroll p
            INNER JOIN employees e ON e.id = p.employee_id
            LEFT JOIN departments d ON d.id = e.department_id
            WHERE p.month BETWEEN ? AND ?
            AND (? IS NULL OR d.name = ?)
            "#,
        )
        .bind(batch_id)
        .bind(draft.payroll_period_start)
        .bind(draft.payroll_period_end)
        .bind(&draft.department)
        .bind(&draft.department)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE payroll_batches
            SET total_employees = ?,
                total_amount = (
                    SELECT COALESCE(SUM(net_pay), 0)
                    FROM payroll_batch_employees
                    WHERE batch_id = ?
                )
            WHERE batch_id = ?
            "#,
        )
        .bind(snapshot.rows_affected() as u32)
        .bind(batch_id)
        .bind(batch_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(batch_id, employees = snapshot.rows_affected(), "Payroll batch created");

        self.get_batch(batch_id)
            .await?
            .ok_or_else(|| PayrollError::NotFound(format!("Batch {} not found", batch_id)))
    }

    async fn update_batch(&self, batch_id: u64, draft: &BatchDraft) -> Result<bool> {
        let fields = vec![
            ("batch_name", SqlValue::String(draft.batch_name.clone())),
            ("payroll_period_start", SqlValue::Date(draft.payroll_period_start)),
            ("payroll_period_end", SqlValue::Date(draft.payroll_period_end)),
            ("department", SqlValue::from(draft.department.clone())),
            ("notes", SqlValue::from(draft.notes.clone())),
        ];

        let Some(update) = build_update_sql("payroll_batches", fields, "batch_id", batch_id) else {
            return Ok(false);
        };

        let affected = execute_update(&self.pool, update).await?;
        if affected > 0 {
            return Ok(true);
        }

        // MySQL reports 0 rows when nothing changed
        Ok(self.get_batch(batch_id).await?.is_some())
    }

    async fn set_batch_status(&self, batch_id: u64, status: BatchStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE payroll_batches SET status = ? WHERE batch_id = ?")
            .bind(status.to_string())
            .bind(batch_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        Ok(self.get_batch(batch_id).await?.is_some())
    }
}
