pub mod holiday;
pub mod overtime;
pub mod payroll_batch;
pub mod role;
pub mod time_request;
pub mod undertime;
