//! Job storage: persistence and state transitions for job records.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use curator_core::{Job, JobCounters, JobId, JobStatus};

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job {job_id} is already terminal ({status:?})")]
    AlreadyTerminal { job_id: JobId, status: JobStatus },
    /// Backend fault. The in-memory store never produces this; it is the
    /// variant a SQL-backed implementation maps connection/query errors into.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Result of `create_or_get`: the effective job row plus whether this call
/// inserted it.
#[derive(Debug, Clone)]
pub struct CreateOrGet {
    pub job: Job,
    pub created: bool,
}

/// Job store abstraction.
///
/// All status/counter mutations go through here; the processor never holds a
/// mutable job across a suspension point. The store owns the
/// Pending→Processing guard (`try_begin`) so that duplicate dispatches of the
/// same job cannot both enter the execution loop.
pub trait JobStore: Send + Sync {
    /// Insert a new pending job, or return the existing row for its
    /// idempotency key.
    ///
    /// An existing Pending/Processing/Completed job is returned unchanged
    /// (idempotent replay). An existing Failed/Cancelled job is reset in
    /// place to Pending with counters zeroed and the total recomputed from
    /// the candidate's estimate (the retry path).
    fn create_or_get(&self, candidate: Job) -> Result<CreateOrGet, JobStoreError>;

    /// Point lookup; `None` is a normal, reportable outcome.
    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Atomically transition Pending→Processing, stamping `started_at`.
    ///
    /// Returns `false` if the job is not Pending; exactly one of two racing
    /// dispatches observes `true`.
    fn try_begin(&self, job_id: JobId) -> Result<bool, JobStoreError>;

    /// Overwrite the total once resolution has produced the authoritative
    /// count.
    fn set_total(&self, job_id: JobId, total: u64) -> Result<(), JobStoreError>;

    /// Overwrite all four progress counters atomically (last writer wins;
    /// the processor is the sole progress writer for a running job).
    fn checkpoint_progress(
        &self,
        job_id: JobId,
        counters: JobCounters,
    ) -> Result<(), JobStoreError>;

    /// Transition status. Entering a terminal status stamps `completed_at`;
    /// an error message is recorded alongside the transition and never
    /// cleared implicitly.
    fn set_status(
        &self,
        job_id: JobId,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<(), JobStoreError>;

    /// Set the cancellation flag; rejected once the job is terminal.
    fn request_cancel(&self, job_id: JobId) -> Result<(), JobStoreError>;

    /// Live read of the cancellation flag (the processor polls this at item
    /// boundaries).
    fn cancel_requested(&self, job_id: JobId) -> Result<bool, JobStoreError>;
}

impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    fn create_or_get(&self, candidate: Job) -> Result<CreateOrGet, JobStoreError> {
        (**self).create_or_get(candidate)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(job_id)
    }

    fn try_begin(&self, job_id: JobId) -> Result<bool, JobStoreError> {
        (**self).try_begin(job_id)
    }

    fn set_total(&self, job_id: JobId, total: u64) -> Result<(), JobStoreError> {
        (**self).set_total(job_id, total)
    }

    fn checkpoint_progress(
        &self,
        job_id: JobId,
        counters: JobCounters,
    ) -> Result<(), JobStoreError> {
        (**self).checkpoint_progress(job_id, counters)
    }

    fn set_status(
        &self,
        job_id: JobId,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<(), JobStoreError> {
        (**self).set_status(job_id, status, error_message)
    }

    fn request_cancel(&self, job_id: JobId) -> Result<(), JobStoreError> {
        (**self).request_cancel(job_id)
    }

    fn cancel_requested(&self, job_id: JobId) -> Result<bool, JobStoreError> {
        (**self).cancel_requested(job_id)
    }
}

/// In-memory job store for tests/dev and the default server wiring.
///
/// A single write lock covers lookup+insert in `create_or_get`, so the
/// idempotency-key uniqueness invariant is structural: of two racing
/// submissions with the same key, the loser observes the winner's row.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    by_key: RwLock<HashMap<String, JobId>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn with_job<T>(
        &self,
        job_id: JobId,
        f: impl FnOnce(&mut Job) -> T,
    ) -> Result<T, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        Ok(f(job))
    }
}

impl JobStore for InMemoryJobStore {
    fn create_or_get(&self, candidate: Job) -> Result<CreateOrGet, JobStoreError> {
        // Hold both locks for the whole lookup+insert so no second row for
        // the same key can ever appear.
        let mut jobs = self.jobs.write().unwrap();
        let mut by_key = self.by_key.write().unwrap();

        if let Some(&existing_id) = by_key.get(&candidate.idempotency_key) {
            let job = jobs
                .get_mut(&existing_id)
                .ok_or(JobStoreError::NotFound(existing_id))?;

            if matches!(job.status, JobStatus::Failed | JobStatus::Cancelled) {
                job.reset_for_retry(candidate.selection.estimated_total());
            }

            return Ok(CreateOrGet {
                job: job.clone(),
                created: false,
            });
        }

        let id = candidate.id;
        by_key.insert(candidate.idempotency_key.clone(), id);
        jobs.insert(id, candidate.clone());
        Ok(CreateOrGet {
            job: candidate,
            created: true,
        })
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().unwrap();
        Ok(jobs.get(&job_id).cloned())
    }

    fn try_begin(&self, job_id: JobId) -> Result<bool, JobStoreError> {
        self.with_job(job_id, |job| {
            if job.status != JobStatus::Pending {
                return false;
            }
            job.mark_processing();
            true
        })
    }

    fn set_total(&self, job_id: JobId, total: u64) -> Result<(), JobStoreError> {
        self.with_job(job_id, |job| {
            job.total_items = total;
        })
    }

    fn checkpoint_progress(
        &self,
        job_id: JobId,
        counters: JobCounters,
    ) -> Result<(), JobStoreError> {
        self.with_job(job_id, |job| {
            job.counters = counters;
        })
    }

    fn set_status(
        &self,
        job_id: JobId,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<(), JobStoreError> {
        self.with_job(job_id, |job| {
            if status.is_terminal() {
                job.mark_terminal(status, error_message);
            } else if status == JobStatus::Processing {
                job.mark_processing();
            } else {
                job.status = status;
            }
        })
    }

    fn request_cancel(&self, job_id: JobId) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        let job = jobs.get_mut(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        if job.status.is_terminal() {
            return Err(JobStoreError::AlreadyTerminal {
                job_id,
                status: job.status,
            });
        }
        job.cancel_requested = true;
        Ok(())
    }

    fn cancel_requested(&self, job_id: JobId) -> Result<bool, JobStoreError> {
        let jobs = self.jobs.read().unwrap();
        jobs.get(&job_id)
            .map(|j| j.cancel_requested)
            .ok_or(JobStoreError::NotFound(job_id))
    }
}
