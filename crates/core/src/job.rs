//! Core job types and state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{CollectionId, CompanyId, JobId};

/// Job kind for routing to the appropriate processor.
///
/// Currently a single variant; submission records it so the job table stays
/// forward-compatible with other bulk operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Move companies from one collection into another.
    BulkMove,
}

/// Job execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, waiting to be picked up.
    Pending,
    /// Currently being executed.
    Processing,
    /// Finished; every resolved item was classified.
    Completed,
    /// Aborted by a fault that escaped the per-item boundary.
    Failed,
    /// Stopped at an item boundary after a cancellation request.
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

/// Which companies a job operates on, captured verbatim at creation time so
/// that later resolution is reproducible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Selection {
    /// An explicit, ordered list of company identifiers.
    Explicit { ids: Vec<CompanyId> },
    /// Every company matching a saved filter over the source collection.
    ///
    /// The filter payload is carried opaquely; `snapshot_total` is the
    /// client's count of matches at submission time, used only as an
    /// estimate until resolution produces the authoritative total.
    AllMatching {
        filter: Option<serde_json::Value>,
        snapshot_total: Option<u64>,
    },
}

impl Selection {
    /// Submission-time size estimate. Replaced by the resolved count once the
    /// processor materializes the work list.
    pub fn estimated_total(&self) -> u64 {
        match self {
            Selection::Explicit { ids } => ids.len() as u64,
            Selection::AllMatching { snapshot_total, .. } => snapshot_total.unwrap_or(0),
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Selection::Explicit { .. } => "explicit",
            Selection::AllMatching { .. } => "all_matching",
        }
    }
}

/// Per-item outcome counters.
///
/// `processed == added + skipped + failed` holds at every checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
    pub processed: u64,
    pub added: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl JobCounters {
    pub fn is_consistent(&self) -> bool {
        self.processed == self.added + self.skipped + self.failed
    }
}

/// A durable record of one bulk-move operation and its progress/status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID.
    pub id: JobId,
    /// Job kind for routing.
    pub kind: JobKind,
    /// Deduplicates logically-equal submissions; unique across all jobs.
    pub idempotency_key: String,
    /// Selection snapshot captured at creation time.
    pub selection: Selection,
    pub source_collection_id: CollectionId,
    pub target_collection_id: CollectionId,
    /// Estimate until resolution; authoritative resolved count afterwards.
    pub total_items: u64,
    pub counters: JobCounters,
    pub status: JobStatus,
    /// Set by a cancellation request; read cooperatively by the processor.
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Diagnostic recorded only alongside `Failed`.
    pub error_message: Option<String>,
}

impl Job {
    /// Create a new pending job from a submission.
    pub fn new(
        idempotency_key: impl Into<String>,
        selection: Selection,
        source_collection_id: CollectionId,
        target_collection_id: CollectionId,
    ) -> Self {
        let total_items = selection.estimated_total();
        Self {
            id: JobId::new(),
            kind: JobKind::BulkMove,
            idempotency_key: idempotency_key.into(),
            selection,
            source_collection_id,
            target_collection_id,
            total_items,
            counters: JobCounters::default(),
            status: JobStatus::Pending,
            cancel_requested: false,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    /// Progress as a percentage; exactly 0.0 when nothing was ever estimated.
    pub fn progress_pct(&self) -> f64 {
        if self.total_items == 0 {
            return 0.0;
        }
        (self.counters.processed as f64 / self.total_items as f64) * 100.0
    }

    /// Mark the job as processing; stamps `started_at` on the first entry.
    pub fn mark_processing(&mut self) {
        self.status = JobStatus::Processing;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    /// Transition into a terminal status, stamping `completed_at`.
    pub fn mark_terminal(&mut self, status: JobStatus, error_message: Option<String>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.completed_at = Some(Utc::now());
        if error_message.is_some() {
            self.error_message = error_message;
        }
    }

    /// Reset a failed/cancelled job in place for retry.
    ///
    /// Counters are zeroed, the cancellation flag and timestamps cleared, and
    /// the total recomputed from the retrying request's estimate.
    pub fn reset_for_retry(&mut self, estimated_total: u64) {
        self.status = JobStatus::Pending;
        self.cancel_requested = false;
        self.counters = JobCounters::default();
        self.total_items = estimated_total;
        self.started_at = None;
        self.completed_at = None;
        self.error_message = None;
    }
}
