//! Batch payroll: deductions, payslips, archives and the batch lifecycle.

pub mod archive;
pub mod batch;
pub mod canvas;
pub mod deductions;
pub mod gateway;
pub mod payslip;
pub mod progress;
