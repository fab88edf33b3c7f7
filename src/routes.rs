use crate::{
    api::{holiday, overtime, payroll_batch, undertime},
    auth::middleware::auth_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

pub type Limiter = Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>;

fn build_limiter(requests_per_min: u32) -> anyhow::Result<Governor<PeerIpKeyExtractor, NoOpMiddleware>> {
    let per_ms = if requests_per_min == 0 {
        1
    } else {
        (60_000 / requests_per_min as u64).max(1)
    };
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min.max(1))
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow::anyhow!("Invalid rate limit: {} per minute", requests_per_min))?;
    Ok(Governor::new(&cfg))
}

/// Builds the limiter once so a bad rate fails at startup, not per worker.
pub fn protected_limiter(config: &Config) -> anyhow::Result<Limiter> {
    build_limiter(config.rate_protected_per_min).map(Arc::new)
}

pub fn configure(
    cfg: &mut web::ServiceConfig,
    config: &Config,
    limiter: Limiter,
) {
    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(limiter) // rate limiting
            .configure(payroll_batch_routes)
            .configure(holiday_routes)
            .configure(overtime_routes)
            .configure(undertime_routes),
    );
}

pub fn payroll_batch_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/payroll-batch")
            // /payroll-batch
            .service(
                web::resource("")
                    .route(web::get().to(payroll_batch::list_batches))
                    .route(web::post().to(payroll_batch::create_batch)),
            )
            // before /{batch_id} so it is not taken for an id
            .service(
                web::resource("/deductions").route(web::get().to(payroll_batch::preview_deductions)),
            )
            // /payroll-batch/{batch_id}
            .service(
                web::resource("/{batch_id}")
                    .route(web::get().to(payroll_batch::get_batch))
                    .route(web::put().to(payroll_batch::update_batch)),
            )
            .service(
                web::resource("/{batch_id}/status")
                    .route(web::put().to(payroll_batch::set_batch_status)),
            )
            .service(
                web::resource("/{batch_id}/toggle-status")
                    .route(web::put().to(payroll_batch::toggle_batch_status)),
            )
            .service(
                web::resource("/{batch_id}/employees")
                    .route(web::get().to(payroll_batch::batch_employees)),
            )
            .service(
                web::resource("/{batch_id}/download")
                    .route(web::get().to(payroll_batch::download_batch)),
            )
            .service(
                web::resource("/{batch_id}/download/progress")
                    .route(web::get().to(payroll_batch::download_progress)),
            )
            .service(
                web::resource("/{batch_id}/payslips/{employee_id}")
                    .route(web::get().to(payroll_batch::download_payslip)),
            ),
    );
}

fn holiday_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/holidays")
            .service(
                web::resource("")
                    .route(web::get().to(holiday::list_holidays))
                    .route(web::post().to(holiday::create_holiday)),
            )
            .service(
                web::resource("/generate-recurring")
                    .route(web::post().to(holiday::generate_recurring)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(holiday::get_holiday))
                    .route(web::put().to(holiday::update_holiday))
                    .route(web::delete().to(holiday::delete_holiday)),
            ),
    );
}

fn overtime_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/overtime")
            .service(
                web::resource("")
                    .route(web::get().to(overtime::list_all))
                    .route(web::post().to(overtime::request_overtime)),
            )
            .service(web::resource("/pending").route(web::get().to(overtime::list_pending)))
            .service(web::resource("/approved").route(web::get().to(overtime::list_approved)))
            .service(web::resource("/scan").route(web::post().to(overtime::log_scan)))
            .service(
                web::resource("/employee/{employee_id}")
                    .route(web::get().to(overtime::list_by_employee)),
            )
            .service(web::resource("/{ot_id}").route(web::put().to(overtime::update_overtime)))
            .service(
                web::resource("/{ot_id}/approve").route(web::put().to(overtime::approve_overtime)),
            )
            .service(
                web::resource("/{ot_id}/reject").route(web::put().to(overtime::reject_overtime)),
            ),
    );
}

fn undertime_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/undertime")
            .service(
                web::resource("")
                    .route(web::get().to(undertime::list_all))
                    .route(web::post().to(undertime::request_undertime)),
            )
            .service(web::resource("/pending").route(web::get().to(undertime::list_pending)))
            .service(
                web::resource("/employee/{employee_id}")
                    .route(web::get().to(undertime::list_by_employee)),
            )
            .service(web::resource("/{ut_id}").route(web::put().to(undertime::update_undertime)))
            .service(
                web::resource("/{ut_id}/approve")
                    .route(web::put().to(undertime::approve_undertime)),
            )
            .service(
                web::resource("/{ut_id}/reject").route(web::put().to(undertime::reject_undertime)),
            ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_config;

    #[test]
    fn limiter_accepts_configured_rates() {
        assert!(build_limiter(1000).is_ok());
        assert!(build_limiter(0).is_ok());
        assert!(protected_limiter(&test_config()).is_ok());
    }
}
