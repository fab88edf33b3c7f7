use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod models;
mod payroll;
mod routes;
mod utils;

#[cfg(test)]
mod test_utils;

use config::Config;
use db::init_db;

use crate::docs::ApiDoc;
use crate::payroll::archive::ArchiveBuilder;
use crate::payroll::batch::BatchManager;
use crate::payroll::canvas::CanvasRenderer;
use crate::payroll::gateway::{MySqlPayrollApi, PayrollApi};
use crate::payroll::payslip::PayslipRenderer;
use crate::payroll::progress::ProgressBoard;
use tracing::{info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "HRM payroll service"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(config.log_level)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let pool = init_db(&config.database_url).await?;

    let payroll_api: Arc<dyn PayrollApi> = Arc::new(MySqlPayrollApi::new(pool.clone()));

    let canvas = CanvasRenderer::new(
        config.company_name.clone(),
        &config.payslip_font_path,
        config.payslip_bold_font_path.as_deref(),
        config.payslip_logo_path.as_deref(),
    );
    if !canvas.is_available() {
        warn!("Payslip fonts missing; payslip downloads will fail until PAYSLIP_FONT_PATH is fixed");
    }
    let renderer: Arc<dyn PayslipRenderer> = Arc::new(canvas);

    let batches = Data::new(BatchManager::new(
        payroll_api.clone(),
        config.batch_list_cache_ttl,
    ));
    let archives = Data::new(ArchiveBuilder::new(
        payroll_api,
        renderer,
        config.archive_compression,
    ));
    let progress = Data::new(ProgressBoard::default());
    let limiter = routes::protected_limiter(&config)?;

    let server_addr = config.server_addr.clone();
    let config_data = Data::new(config);
    let pool_data = Data::new(pool);

    HttpServer::new(move || {
        let config = config_data.clone();
        let limiter = limiter.clone();
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(pool_data.clone())
            .app_data(config.clone())
            .app_data(batches.clone())
            .app_data(archives.clone())
            .app_data(progress.clone())
            .service(index)
            .configure(|cfg| routes::configure(cfg, &config, limiter))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {}", server_addr))?
    .run()
    .await?;

    Ok(())
}
