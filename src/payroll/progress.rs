use std::time::Duration;

use futures::StreamExt;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use moka::future::Cache;
use serde::Serialize;
use tracing::debug;
use utoipa::ToSchema;

const PROGRESS_TTL: Duration = Duration::from_secs(10 * 60);

/// Progress of one archive build.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
#[serde(tag = "phase", rename_all = "lowercase")]
pub enum ArchiveProgress {
    Generating { done: usize, total: usize },
    Compressing { percent: u8 },
}

/// Fire-and-forget progress sink handed to the archive builder. Sending never
/// waits, and a dropped receiver is not an error.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    tx: Option<UnboundedSender<ArchiveProgress>>,
}

impl ProgressReporter {
    pub fn channel() -> (Self, UnboundedReceiver<ArchiveProgress>) {
        let (tx, rx) = unbounded();
        (Self { tx: Some(tx) }, rx)
    }

    /// A reporter nobody listens to.
    #[cfg(test)]
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn report(&self, progress: ArchiveProgress) {
        if let Some(tx) = &self.tx {
            let _ = tx.unbounded_send(progress);
        }
    }
}

/// Latest progress per batch, read by clients polling a running download.
/// Entries expire a while after the last report.
#[derive(Clone)]
pub struct ProgressBoard {
    latest: Cache<u64, ArchiveProgress>,
}

impl Default for ProgressBoard {
    fn default() -> Self {
        Self::new(PROGRESS_TTL)
    }
}

impl ProgressBoard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            latest: Cache::builder().max_capacity(1_000).time_to_live(ttl).build(),
        }
    }

    pub async fn latest(&self, batch_id: u64) -> Option<ArchiveProgress> {
        self.latest.get(&batch_id).await
    }

    /// Posts every report of one build until its reporters are dropped.
    pub async fn follow(&self, batch_id: u64, mut rx: UnboundedReceiver<ArchiveProgress>) {
        while let Some(update) = rx.next().await {
            debug!(batch_id, progress = ?update, "Payslip archive progress");
            self.latest.insert(batch_id, update).await;
        }
    }
}
