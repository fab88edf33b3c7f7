//! Batch archive builder: renders every payslip of a completed batch and packs
//! them into one zip, reporting progress as it goes.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};

use actix_web::web;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{PayrollError, Result};
use crate::model::payroll_batch::{BatchEmployeeRecord, BatchStatus, PayrollBatch};
use crate::payroll::gateway::PayrollApi;
use crate::payroll::payslip::{GeneratedPayslip, PayslipRenderer, payslip_filename};
use crate::payroll::progress::{ArchiveProgress, ProgressReporter};

pub const FALLBACK_NOTICE: &str =
    "Zipping not available. Payslips will be downloaded individually.";

const MAX_DEFLATE_LEVEL: i32 = 9;
const COMPRESS_CHUNK_BYTES: usize = 64 * 1024;

pub fn archive_filename(batch_id: u64) -> String {
    format!("batch_{}_payslips.zip", batch_id)
}

#[derive(Debug)]
pub enum BatchDownload {
    Archive(BatchArchive),
    /// Compression is switched off; payslips are fetched one at a time.
    Individual(IndividualDownloads),
}

#[derive(Debug)]
pub struct BatchArchive {
    pub filename: String,
    pub entries: usize,
    pub skipped: usize,
    pub content: Vec<u8>,
}

#[derive(Debug)]
pub struct IndividualDownloads {
    pub notice: &'static str,
    pub payslips: Vec<PayslipLink>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayslipLink {
    pub employee_id: u64,
    pub filename: String,
}

/// In-memory container of rendered payslips, stored as-is under one folder.
struct ArchiveContainer {
    folder: String,
    entries: Vec<GeneratedPayslip>,
}

impl ArchiveContainer {
    fn new(batch_id: u64) -> Self {
        Self {
            folder: format!("batch_{}", batch_id),
            entries: Vec::new(),
        }
    }

    fn store(&mut self, payslip: GeneratedPayslip) {
        debug!(employee_id = payslip.employee_id, filename = %payslip.filename, "Payslip staged");
        self.entries.push(payslip);
    }

    fn entry_name(&self, payslip: &GeneratedPayslip) -> String {
        format!("{}/{}", self.folder, payslip.filename)
    }

    fn stored_bytes(&self) -> usize {
        self.entries.iter().map(|e| e.content.len()).sum()
    }
}

fn archive_err(e: impl std::fmt::Display) -> PayrollError {
    PayrollError::Archive(e.to_string())
}

/// Writes the container as a deflate zip at maximum level, feeding it in
/// chunks so progress can be reported while it runs.
fn compress(container: &ArchiveContainer, progress: &ProgressReporter) -> Result<Vec<u8>> {
    let total = container.stored_bytes().max(1);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(MAX_DEFLATE_LEVEL));

    let mut writer = ZipWriter::new(Cursor::new(Vec::with_capacity(total / 2)));
    writer
        .add_directory(container.folder.as_str(), options)
        .map_err(archive_err)?;

    let mut written = 0usize;
    let mut last_percent = None;
    for entry in &container.entries {
        writer
            .start_file(container.entry_name(entry), options)
            .map_err(archive_err)?;

        for chunk in entry.content.chunks(COMPRESS_CHUNK_BYTES) {
            writer.write_all(chunk).map_err(archive_err)?;
            written += chunk.len();

            let percent = (written * 100 / total).min(100) as u8;
            if last_percent != Some(percent) {
                progress.report(ArchiveProgress::Compressing { percent });
                last_percent = Some(percent);
            }
        }
    }

    let cursor = writer.finish().map_err(archive_err)?;
    if last_percent != Some(100) {
        progress.report(ArchiveProgress::Compressing { percent: 100 });
    }

    Ok(cursor.into_inner())
}

/// One build per batch at a time. The lease releases the batch on drop, so a
/// failed build never leaves it locked.
#[derive(Debug, Clone, Default)]
pub struct BuildLocks {
    held: Arc<Mutex<HashMap<u64, Uuid>>>,
}

#[derive(Debug)]
pub struct BuildLease {
    held: Arc<Mutex<HashMap<u64, Uuid>>>,
    batch_id: u64,
    token: Uuid,
}

impl BuildLocks {
    pub fn acquire(&self, batch_id: u64) -> Result<BuildLease> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| PayrollError::Archive("build lock poisoned".into()))?;

        if held.contains_key(&batch_id) {
            return Err(PayrollError::BuildInProgress(batch_id));
        }

        let token = Uuid::new_v4();
        held.insert(batch_id, token);

        Ok(BuildLease {
            held: self.held.clone(),
            batch_id,
            token,
        })
    }
}

impl Drop for BuildLease {
    fn drop(&mut self) {
        if let Ok(mut held) = self.held.lock() {
            if held.get(&self.batch_id) == Some(&self.token) {
                held.remove(&self.batch_id);
            }
        }
    }
}

pub struct ArchiveBuilder {
    api: Arc<dyn PayrollApi>,
    renderer: Arc<dyn PayslipRenderer>,
    compression_enabled: bool,
    locks: BuildLocks,
}

impl ArchiveBuilder {
    pub fn new(
        api: Arc<dyn PayrollApi>,
        renderer: Arc<dyn PayslipRenderer>,
        compression_enabled: bool,
    ) -> Self {
        Self {
            api,
            renderer,
            compression_enabled,
            locks: BuildLocks::default(),
        }
    }

    #[cfg(test)]
    pub fn locks(&self) -> &BuildLocks {
        &self.locks
    }

    fn ensure_compression(&self) -> Result<()> {
        if self.compression_enabled {
            Ok(())
        } else {
            Err(PayrollError::CompressionUnavailable)
        }
    }

    async fn load(&self, batch_id: u64) -> Result<(PayrollBatch, Vec<BatchEmployeeRecord>)> {
        let (batch, employees) = futures::try_join!(
            self.api.get_batch(batch_id),
            self.api.list_batch_employees(batch_id)
        )?;

        let batch = batch.ok_or_else(|| PayrollError::NotFound("Batch not found".into()))?;
        if batch.status != BatchStatus::Completed {
            return Err(PayrollError::NotReady(batch_id));
        }

        Ok((batch, employees))
    }

    async fn render(
        &self,
        employee: BatchEmployeeRecord,
        batch: Arc<PayrollBatch>,
    ) -> Result<GeneratedPayslip> {
        let renderer = self.renderer.clone();
        let payslip = web::block(move || renderer.render(&employee, &batch))
            .await
            .map_err(archive_err)??;
        Ok(payslip)
    }

    #[instrument(skip(self, progress))]
    pub async fn build_archive(
        &self,
        batch_id: u64,
        progress: ProgressReporter,
    ) -> Result<BatchDownload> {
        let _lease = self.locks.acquire(batch_id)?;

        let (batch, employees) = self.load(batch_id).await?;
        if employees.is_empty() {
            return Err(PayrollError::EmptyBatch(batch_id));
        }

        if let Err(e) = self.ensure_compression() {
            warn!(batch_id, error = %e, "Falling back to individual payslip downloads");
            let payslips = employees
                .iter()
                .map(|employee| PayslipLink {
                    employee_id: employee.employee_id,
                    filename: payslip_filename(employee, &batch),
                })
                .collect();
            return Ok(BatchDownload::Individual(IndividualDownloads {
                notice: FALLBACK_NOTICE,
                payslips,
            }));
        }

        let total = employees.len();
        let batch = Arc::new(batch);
        let mut container = ArchiveContainer::new(batch_id);
        progress.report(ArchiveProgress::Generating { done: 0, total });

        let mut last_failure = None;
        for (index, employee) in employees.into_iter().enumerate() {
            let employee_id = employee.employee_id;
            match self.render(employee, batch.clone()).await {
                Ok(payslip) => container.store(payslip),
                Err(e) => {
                    warn!(batch_id, employee_id, error = %e, "Skipping payslip");
                    last_failure = Some(e);
                }
            }
            progress.report(ArchiveProgress::Generating {
                done: index + 1,
                total,
            });
        }

        let entries = container.entries.len();
        // nothing rendered: the backend is down, not a single bad payslip
        if entries == 0 {
            if let Some(e) = last_failure {
                error!(batch_id, error = %e, "No payslip could be rendered");
                return Err(e);
            }
        }
        let reporter = progress.clone();
        let content = web::block(move || compress(&container, &reporter))
            .await
            .map_err(archive_err)??;

        info!(batch_id, entries, skipped = total - entries, bytes = content.len(), "Payslip archive built");

        Ok(BatchDownload::Archive(BatchArchive {
            filename: archive_filename(batch_id),
            entries,
            skipped: total - entries,
            content,
        }))
    }

    /// Single payslip of a completed batch, used by the individual download path.
    pub async fn render_one(&self, batch_id: u64, employee_id: u64) -> Result<GeneratedPayslip> {
        let (batch, employees) = self.load(batch_id).await?;

        let employee = employees
            .into_iter()
            .find(|e| e.employee_id == employee_id)
            .ok_or_else(|| PayrollError::NotFound("Employee not found in batch".into()))?;

        self.render(employee, Arc::new(batch)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeRenderer, InMemoryPayrollApi, sample_batch, sample_employee};
    use crate::error::RenderError;
    use crate::payroll::canvas::CanvasRenderer;
    use actix_web::ResponseError;
    use actix_web::http::StatusCode;
    use futures::StreamExt;
    use std::io::Read;
    use std::path::Path;

    fn employees() -> Vec<BatchEmployeeRecord> {
        vec![
            sample_employee(1, "Juan", "Dela Cruz"),
            sample_employee(2, "Maria", "Santos"),
            sample_employee(3, "Jose", "O'Brien Jr."),
        ]
    }

    fn builder(status: BatchStatus, staff: Vec<BatchEmployeeRecord>, fail_for: Option<u64>) -> ArchiveBuilder {
        let api = Arc::new(InMemoryPayrollApi::with_batch(sample_batch(12, status), staff));
        ArchiveBuilder::new(api, Arc::new(FakeRenderer::failing_for(fail_for)), true)
    }

    fn entry_names(content: &[u8]) -> Vec<String> {
        let archive = zip::ZipArchive::new(Cursor::new(content)).unwrap();
        let mut names: Vec<String> = archive
            .file_names()
            .filter(|n| !n.ends_with('/'))
            .map(str::to_string)
            .collect();
        names.sort();
        names
    }

    #[actix_web::test]
    async fn one_failed_render_is_skipped() {
        let builder = builder(BatchStatus::Completed, employees(), Some(2));
        let (reporter, rx) = ProgressReporter::channel();

        let download = builder.build_archive(12, reporter).await.unwrap();
        let BatchDownload::Archive(archive) = download else {
            panic!("expected an archive");
        };

        assert_eq!(archive.filename, "batch_12_payslips.zip");
        assert_eq!((archive.entries, archive.skipped), (2, 1));
        assert_eq!(
            entry_names(&archive.content),
            vec![
                "batch_12/payslip_dela_cruz_2024-05-31.jpg",
                "batch_12/payslip_o_brien_jr_2024-05-31.jpg",
            ]
        );

        let seen: Vec<ArchiveProgress> = rx.collect().await;
        assert_eq!(seen.first(), Some(&ArchiveProgress::Generating { done: 0, total: 3 }));
        assert!(seen.contains(&ArchiveProgress::Generating { done: 3, total: 3 }));
        assert_eq!(seen.last(), Some(&ArchiveProgress::Compressing { percent: 100 }));
    }

    #[actix_web::test]
    async fn entries_keep_rendered_bytes() {
        let builder = builder(BatchStatus::Completed, employees(), None);
        let BatchDownload::Archive(archive) =
            builder.build_archive(12, ProgressReporter::silent()).await.unwrap()
        else {
            panic!("expected an archive");
        };

        let mut zip = zip::ZipArchive::new(Cursor::new(archive.content)).unwrap();
        let mut entry = zip.by_name("batch_12/payslip_santos_2024-05-31.jpg").unwrap();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();

        assert_eq!(content, FakeRenderer::content_for(2));
    }

    #[actix_web::test]
    async fn missing_render_backend_fails_the_whole_build() {
        let api = Arc::new(InMemoryPayrollApi::with_batch(
            sample_batch(12, BatchStatus::Completed),
            employees()[..2].to_vec(),
        ));
        let renderer = CanvasRenderer::new("Unitop", Path::new("nope.ttf"), None, None);
        let builder = ArchiveBuilder::new(api, Arc::new(renderer), true);

        let err = builder.build_archive(12, ProgressReporter::silent()).await.unwrap_err();
        assert!(matches!(
            err,
            PayrollError::Render(RenderError::BackendUnavailable(_))
        ));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(builder.locks().acquire(12).is_ok());
    }

    #[actix_web::test]
    async fn empty_batch_produces_no_file() {
        let builder = builder(BatchStatus::Completed, Vec::new(), None);

        let err = builder.build_archive(12, ProgressReporter::silent()).await.unwrap_err();
        assert!(matches!(err, PayrollError::EmptyBatch(12)));
    }

    #[actix_web::test]
    async fn batch_must_be_completed() {
        let builder = builder(BatchStatus::Processing, employees(), None);

        let err = builder.build_archive(12, ProgressReporter::silent()).await.unwrap_err();
        assert!(matches!(err, PayrollError::NotReady(12)));
        assert!(matches!(
            builder.render_one(12, 1).await,
            Err(PayrollError::NotReady(12))
        ));
    }

    #[actix_web::test]
    async fn concurrent_build_is_rejected_until_the_lease_drops() {
        let builder = builder(BatchStatus::Completed, employees(), None);

        let lease = builder.locks().acquire(12).unwrap();
        let err = builder.build_archive(12, ProgressReporter::silent()).await.unwrap_err();
        assert!(matches!(err, PayrollError::BuildInProgress(12)));
        drop(lease);

        assert!(builder.build_archive(12, ProgressReporter::silent()).await.is_ok());
        // released after success too
        assert!(builder.locks().acquire(12).is_ok());
    }

    #[actix_web::test]
    async fn failed_build_releases_the_lock() {
        let builder = builder(BatchStatus::Pending, employees(), None);

        assert!(builder.build_archive(12, ProgressReporter::silent()).await.is_err());
        assert!(builder.locks().acquire(12).is_ok());
    }

    #[actix_web::test]
    async fn disabled_compression_falls_back_to_individual_downloads() {
        let api = Arc::new(InMemoryPayrollApi::with_batch(
            sample_batch(12, BatchStatus::Completed),
            employees(),
        ));
        let builder = ArchiveBuilder::new(api, Arc::new(FakeRenderer::default()), false);

        let BatchDownload::Individual(downloads) =
            builder.build_archive(12, ProgressReporter::silent()).await.unwrap()
        else {
            panic!("expected individual downloads");
        };

        assert_eq!(downloads.notice, FALLBACK_NOTICE);
        assert_eq!(downloads.payslips.len(), 3);
        assert_eq!(
            downloads.payslips[1],
            PayslipLink {
                employee_id: 2,
                filename: "payslip_santos_2024-05-31.jpg".into()
            }
        );
    }

    #[actix_web::test]
    async fn render_one_finds_the_employee() {
        let builder = builder(BatchStatus::Completed, employees(), None);

        let payslip = builder.render_one(12, 3).await.unwrap();
        assert_eq!(payslip.filename, "payslip_o_brien_jr_2024-05-31.jpg");
        assert!(matches!(
            builder.render_one(12, 42).await,
            Err(PayrollError::NotFound(_))
        ));
    }
}
