use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use thiserror::Error;

/// Failures of the payroll batch pipeline. Every variant is rendered to the
/// caller as `{"success": 0, "message": ...}`.
#[derive(Debug, Error)]
pub enum PayrollError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Batch is still processing. Complete the batch to enable download.")]
    NotReady(u64),

    #[error("This batch has no employees to generate payslips for.")]
    EmptyBatch(u64),

    #[error("Payslips for batch {0} are already being generated")]
    BuildInProgress(u64),

    #[error("Completed batches cannot be edited")]
    Locked(u64),

    #[error("Failed to render payslip: {0}")]
    Render(#[from] RenderError),

    #[error("Zipping not available")]
    CompressionUnavailable,

    #[error("Failed to prepare payslips download: {0}")]
    Archive(String),

    #[error("Payroll service unavailable: {0}")]
    Network(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, PayrollError>;

impl ResponseError for PayrollError {
    fn status_code(&self) -> StatusCode {
        match self {
            PayrollError::Validation(_) | PayrollError::EmptyBatch(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            PayrollError::NotFound(_) => StatusCode::NOT_FOUND,
            PayrollError::NotReady(_)
            | PayrollError::BuildInProgress(_)
            | PayrollError::Locked(_) => StatusCode::CONFLICT,
            PayrollError::Network(_) => StatusCode::BAD_GATEWAY,
            PayrollError::Render(_)
            | PayrollError::CompressionUnavailable
            | PayrollError::Archive(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // upstream details stay in the logs
        let message = match self {
            PayrollError::Network(_) => "Payroll service unavailable".to_string(),
            other => other.to_string(),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "success": 0,
            "message": message
        }))
    }
}

/// Failures of the payslip drawing backend.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("rendering backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("drawing surface unusable: {0}")]
    Surface(String),

    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}
