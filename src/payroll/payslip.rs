//! Payslip composition. Content is worked out here; pixels are the job of a
//! [`PayslipRenderer`] backend such as [`super::canvas::CanvasRenderer`].

use chrono::Datelike;
use rust_decimal::Decimal;

use crate::error::RenderError;
use crate::model::payroll_batch::{BatchEmployeeRecord, PayrollBatch};
use crate::payroll::deductions::{DeductionBreakdown, compute_deductions};

pub const PAYSLIP_TITLE: &str = "PAYSLIP";
pub const FOOTER_NOTE: &str = "This payslip is a system-generated document.";

/// A rendered payslip, held only until it lands in an archive or a response.
#[derive(Debug, Clone)]
pub struct GeneratedPayslip {
    pub employee_id: u64,
    pub filename: String,
    pub content: Vec<u8>,
}

pub trait PayslipRenderer: Send + Sync {
    fn render(
        &self,
        employee: &BatchEmployeeRecord,
        batch: &PayrollBatch,
    ) -> Result<GeneratedPayslip, RenderError>;
}

/// Everything printed on one payslip, already formatted.
#[derive(Debug, Clone, PartialEq)]
pub struct PayslipDocument {
    pub company: String,
    pub title: &'static str,
    pub pay_period: String,
    pub employee_info: Vec<(&'static str, String)>,
    pub earnings: Vec<(&'static str, Decimal)>,
    pub deductions: Vec<(&'static str, Decimal)>,
    pub gross_pay: Decimal,
    pub total_deductions: Decimal,
    pub net_pay: Decimal,
}

impl PayslipDocument {
    pub fn compose(company: &str, employee: &BatchEmployeeRecord, batch: &PayrollBatch) -> Self {
        // The stored row only keeps the deduction total, so the per-line split
        // is recovered from the gross it was taken from.
        let gross_pay = employee.net_pay + employee.deductions;
        let breakdown = compute_deductions(gross_pay);

        Self {
            company: company.to_string(),
            title: PAYSLIP_TITLE,
            pay_period: format_pay_period(batch),
            employee_info: vec![
                ("Employee Name", employee.full_name()),
                ("Employee ID", display_employee_id(employee, batch)),
                ("Batch ID", format!("B-{:03}", batch.batch_id)),
                (
                    "Processed Date",
                    batch.created_at.format("%B %-d, %Y %I:%M%P").to_string(),
                ),
            ],
            earnings: vec![
                ("Basic Salary", employee.basic_salary),
                ("Overtime Pay", employee.overtime_pay),
            ],
            deductions: deduction_lines(&breakdown, employee.deductions),
            gross_pay,
            total_deductions: employee.deductions,
            net_pay: employee.net_pay,
        }
    }
}

fn deduction_lines(breakdown: &DeductionBreakdown, stored_total: Decimal) -> Vec<(&'static str, Decimal)> {
    let other = (stored_total - breakdown.statutory_lines_total()).max(Decimal::ZERO);

    vec![
        ("SSS", breakdown.sss),
        ("PhilHealth", breakdown.philhealth),
        ("Pag-IBIG", breakdown.pagibig),
        ("Provident Fund", breakdown.provident_fund),
        ("Withholding Tax", breakdown.tax),
        ("Other Deductions", other),
    ]
}

/// `EMP{year}-{id:03}`, year taken from the period end.
pub fn display_employee_id(employee: &BatchEmployeeRecord, batch: &PayrollBatch) -> String {
    format!(
        "EMP{}-{:03}",
        batch.payroll_period_end.year(),
        employee.employee_id
    )
}

pub fn format_pay_period(batch: &PayrollBatch) -> String {
    format!(
        "{} \u{2192} {}",
        batch.payroll_period_start.format("%B %-d"),
        batch.payroll_period_end.format("%B %-d, %Y")
    )
}

/// `payslip_{last name slug}_{period end}.jpg`
pub fn payslip_filename(employee: &BatchEmployeeRecord, batch: &PayrollBatch) -> String {
    let name = match sanitize_name(&employee.last_name) {
        slug if slug.is_empty() => "employee".to_string(),
        slug => slug,
    };
    format!("payslip_{}_{}.jpg", name, batch.payroll_period_end.format("%Y-%m-%d"))
}

/// Lowercases, collapses every run of non-alphanumerics into one `_` and trims
/// leading/trailing underscores.
pub fn sanitize_name(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    let mut pending_separator = false;

    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    slug
}

/// `#,##0.00`
pub fn format_money(amount: Decimal) -> String {
    let rounded = crate::payroll::deductions::round2(amount);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = format!("{:.2}", rounded.abs());
    let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    format!("{}{}.{}", if negative { "-" } else { "" }, grouped, cents)
}
