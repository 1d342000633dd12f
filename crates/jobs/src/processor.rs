//! The bulk-move processing loop.
//!
//! One invocation drives a single job from Pending to a terminal status. The
//! processor never holds a job row across an await; every observation and
//! mutation goes through the job store, so crash/cancel leave a consistent
//! record behind.

use std::time::Duration;

use tracing::{debug, info, warn};

use curator_core::{CollectionId, CompanyId, JobCounters, JobId, JobStatus};
use curator_store::{CompanyStore, JobStore, JobStoreError, MembershipError, MembershipStore};

use crate::resolver::resolve_selection;

/// A fault that escapes the per-item boundary and aborts the whole job.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error(transparent)]
    Store(#[from] JobStoreError),
    #[error(transparent)]
    Membership(#[from] MembershipError),
}

/// Tunables for the processing loop.
#[derive(Debug, Clone, Copy)]
pub struct ProcessorConfig {
    /// Pause after each successful insert. Zero disables throttling.
    pub throttle: Duration,
    /// Persist counters every N processed items (and always at the end).
    pub checkpoint_every: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            throttle: Duration::from_millis(100),
            checkpoint_every: 10,
        }
    }
}

/// What happened to one company at the item boundary.
enum ItemOutcome {
    Added,
    Skipped,
    Failed,
}

/// Executes bulk-move jobs against the given stores.
#[derive(Debug, Clone)]
pub struct BulkMoveProcessor<J, C, M> {
    jobs: J,
    companies: C,
    memberships: M,
    config: ProcessorConfig,
}

impl<J, C, M> BulkMoveProcessor<J, C, M>
where
    J: JobStore,
    C: CompanyStore,
    M: MembershipStore,
{
    pub fn new(jobs: J, companies: C, memberships: M, config: ProcessorConfig) -> Self {
        Self {
            jobs,
            companies,
            memberships,
            config,
        }
    }

    /// Run the job to a terminal status.
    ///
    /// Faults that escape the item boundary are absorbed here: the job is
    /// marked Failed with the fault recorded, and the error does not
    /// propagate to the dispatch site.
    pub async fn run(&self, job_id: JobId) {
        if let Err(err) = self.execute(job_id).await {
            warn!(%job_id, error = %err, "bulk-move job aborted");
            if let Err(store_err) =
                self.jobs
                    .set_status(job_id, JobStatus::Failed, Some(err.to_string()))
            {
                warn!(%job_id, error = %store_err, "could not record job failure");
            }
        }
    }

    async fn execute(&self, job_id: JobId) -> Result<(), ProcessError> {
        let Some(job) = self.jobs.get(job_id)? else {
            debug!(%job_id, "job vanished before processing; nothing to do");
            return Ok(());
        };

        // Exactly one of two racing dispatches wins this transition.
        if !self.jobs.try_begin(job_id)? {
            debug!(%job_id, status = ?job.status, "job not pending; dispatch is a no-op");
            return Ok(());
        }

        let items = resolve_selection(&job, &self.companies, &self.memberships)?;
        self.jobs.set_total(job_id, items.len() as u64)?;
        info!(%job_id, total = items.len(), "bulk-move job started");

        let mut counters = JobCounters::default();
        if items.is_empty() {
            self.jobs.checkpoint_progress(job_id, counters)?;
            self.jobs.set_status(job_id, JobStatus::Completed, None)?;
            return Ok(());
        }

        let checkpoint_every = self.config.checkpoint_every.max(1);
        for company_id in items {
            if self.jobs.cancel_requested(job_id)? {
                self.jobs.checkpoint_progress(job_id, counters)?;
                self.jobs.set_status(job_id, JobStatus::Cancelled, None)?;
                info!(%job_id, processed = counters.processed, "bulk-move job cancelled");
                return Ok(());
            }

            match self.move_one(company_id, job.target_collection_id).await {
                ItemOutcome::Added => counters.added += 1,
                ItemOutcome::Skipped => counters.skipped += 1,
                ItemOutcome::Failed => counters.failed += 1,
            }
            counters.processed += 1;

            if counters.processed % checkpoint_every == 0 {
                self.jobs.checkpoint_progress(job_id, counters)?;
            }
        }

        self.jobs.checkpoint_progress(job_id, counters)?;
        self.jobs.set_status(job_id, JobStatus::Completed, None)?;
        info!(
            %job_id,
            added = counters.added,
            skipped = counters.skipped,
            failed = counters.failed,
            "bulk-move job completed"
        );
        Ok(())
    }

    /// Process one company. A fault here is contained to this item.
    async fn move_one(&self, company_id: CompanyId, target: CollectionId) -> ItemOutcome {
        match self.memberships.exists(company_id, target) {
            Ok(true) => ItemOutcome::Skipped,
            Ok(false) => match self.memberships.insert(company_id, target) {
                Ok(()) => {
                    if !self.config.throttle.is_zero() {
                        tokio::time::sleep(self.config.throttle).await;
                    }
                    ItemOutcome::Added
                }
                // Includes a uniqueness violation from a concurrent insert of
                // the same pair; the existence check above is not atomic with
                // the insert.
                Err(err) => {
                    warn!(%company_id, %target, error = %err, "item failed during insert");
                    ItemOutcome::Failed
                }
            },
            Err(err) => {
                warn!(%company_id, %target, error = %err, "item failed during membership check");
                ItemOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use curator_core::{Company, Job, Selection};
    use curator_store::{InMemoryCompanyStore, InMemoryJobStore, InMemoryMembershipStore};

    struct Fixture {
        jobs: Arc<InMemoryJobStore>,
        companies: Arc<InMemoryCompanyStore>,
        memberships: Arc<InMemoryMembershipStore>,
        source: CollectionId,
        target: CollectionId,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                jobs: InMemoryJobStore::arc(),
                companies: Arc::new(InMemoryCompanyStore::new()),
                memberships: Arc::new(InMemoryMembershipStore::new()),
                source: CollectionId::new(),
                target: CollectionId::new(),
            }
        }

        fn seed(&self, ids: &[i64]) {
            for &id in ids {
                self.companies
                    .insert(Company::new(CompanyId(id), format!("company-{id}")));
                self.memberships.insert(CompanyId(id), self.source).unwrap();
            }
        }

        fn processor(
            &self,
        ) -> BulkMoveProcessor<
            Arc<InMemoryJobStore>,
            Arc<InMemoryCompanyStore>,
            Arc<InMemoryMembershipStore>,
        > {
            BulkMoveProcessor::new(
                self.jobs.clone(),
                self.companies.clone(),
                self.memberships.clone(),
                ProcessorConfig {
                    throttle: Duration::ZERO,
                    checkpoint_every: 10,
                },
            )
        }

        fn submit_explicit(&self, ids: &[i64]) -> JobId {
            let job = Job::new(
                format!("key-{:?}", ids),
                Selection::Explicit {
                    ids: ids.iter().copied().map(CompanyId).collect(),
                },
                self.source,
                self.target,
            );
            self.jobs.create_or_get(job).unwrap().job.id
        }
    }

    #[tokio::test]
    async fn moves_every_company_and_completes() {
        let fx = Fixture::new();
        fx.seed(&[1, 2, 3]);
        let job_id = fx.submit_explicit(&[1, 2, 3]);

        fx.processor().run(job_id).await;

        let job = fx.jobs.get(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.total_items, 3);
        assert_eq!(job.counters.processed, 3);
        assert_eq!(job.counters.added, 3);
        assert!(job.counters.is_consistent());
        assert_eq!(job.progress_pct(), 100.0);
        assert!(job.completed_at.is_some());

        for id in [1, 2, 3] {
            assert!(fx.memberships.exists(CompanyId(id), fx.target).unwrap());
        }
    }

    #[tokio::test]
    async fn companies_already_in_target_are_skipped() {
        let fx = Fixture::new();
        fx.seed(&[1, 2]);
        fx.memberships.insert(CompanyId(2), fx.target).unwrap();
        let job_id = fx.submit_explicit(&[1, 2]);

        fx.processor().run(job_id).await;

        let job = fx.jobs.get(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.counters.added, 1);
        assert_eq!(job.counters.skipped, 1);
        assert_eq!(job.counters.failed, 0);
    }

    #[tokio::test]
    async fn fully_present_selection_is_all_skips_and_still_completes() {
        let fx = Fixture::new();
        fx.seed(&[1, 2, 3]);
        for id in [1, 2, 3] {
            fx.memberships.insert(CompanyId(id), fx.target).unwrap();
        }
        let job_id = fx.submit_explicit(&[1, 2, 3]);

        fx.processor().run(job_id).await;

        let job = fx.jobs.get(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.counters.added, 0);
        assert_eq!(job.counters.skipped, 3);
        assert_eq!(job.counters.processed, 3);
        assert_eq!(fx.memberships.count(fx.target).unwrap(), 3);
    }

    #[tokio::test]
    async fn rerunning_a_completed_job_changes_nothing() {
        let fx = Fixture::new();
        fx.seed(&[1]);
        let job_id = fx.submit_explicit(&[1]);

        fx.processor().run(job_id).await;
        let first = fx.jobs.get(job_id).unwrap().unwrap();

        fx.processor().run(job_id).await;
        let second = fx.jobs.get(job_id).unwrap().unwrap();

        assert_eq!(second, first);
        assert_eq!(fx.memberships.count(fx.target).unwrap(), 1);
    }

    #[tokio::test]
    async fn cancellation_stops_at_an_item_boundary() {
        let fx = Fixture::new();
        fx.seed(&[1, 2, 3]);
        let job_id = fx.submit_explicit(&[1, 2, 3]);

        // Flag is up before the loop starts, so the very first boundary check
        // stops the job with nothing processed.
        fx.jobs.request_cancel(job_id).unwrap();
        fx.processor().run(job_id).await;

        let job = fx.jobs.get(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.counters.processed, 0);
        assert!(job.counters.is_consistent());
        assert_eq!(fx.memberships.count(fx.target).unwrap(), 0);
    }

    /// Membership store that reports a pair as absent even when it exists,
    /// forcing the insert to hit the uniqueness violation the way a racing
    /// writer would.
    #[derive(Clone)]
    struct BlindExistsStore {
        inner: Arc<InMemoryMembershipStore>,
        blind_to: CompanyId,
    }

    impl curator_store::MembershipStore for BlindExistsStore {
        fn insert(
            &self,
            company_id: CompanyId,
            collection_id: CollectionId,
        ) -> Result<(), MembershipError> {
            self.inner.insert(company_id, collection_id)
        }

        fn exists(
            &self,
            company_id: CompanyId,
            collection_id: CollectionId,
        ) -> Result<bool, MembershipError> {
            if company_id == self.blind_to {
                return Ok(false);
            }
            self.inner.exists(company_id, collection_id)
        }

        fn members_of(
            &self,
            collection_id: CollectionId,
        ) -> Result<Vec<CompanyId>, MembershipError> {
            self.inner.members_of(collection_id)
        }

        fn count(&self, collection_id: CollectionId) -> Result<u64, MembershipError> {
            self.inner.count(collection_id)
        }
    }

    #[tokio::test]
    async fn conflicting_insert_is_classified_failed_not_fatal() {
        let fx = Fixture::new();
        fx.seed(&[1, 2]);
        // Company 2 is already in the target, but the store swears it is not.
        fx.memberships.insert(CompanyId(2), fx.target).unwrap();
        let job_id = fx.submit_explicit(&[1, 2]);

        let processor = BulkMoveProcessor::new(
            fx.jobs.clone(),
            fx.companies.clone(),
            BlindExistsStore {
                inner: fx.memberships.clone(),
                blind_to: CompanyId(2),
            },
            ProcessorConfig {
                throttle: Duration::ZERO,
                checkpoint_every: 10,
            },
        );
        processor.run(job_id).await;

        let job = fx.jobs.get(job_id).unwrap().unwrap();
        // The bad item is contained; the batch still completes.
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.counters.added, 1);
        assert_eq!(job.counters.failed, 1);
        assert!(job.counters.is_consistent());
        assert!(job.error_message.is_none());
    }

    /// Membership store with a dead backend; every call fails.
    #[derive(Clone)]
    struct UnavailableMembershipStore;

    impl curator_store::MembershipStore for UnavailableMembershipStore {
        fn insert(
            &self,
            _company_id: CompanyId,
            _collection_id: CollectionId,
        ) -> Result<(), MembershipError> {
            Err(MembershipError::Storage("record store unavailable".into()))
        }

        fn exists(
            &self,
            _company_id: CompanyId,
            _collection_id: CollectionId,
        ) -> Result<bool, MembershipError> {
            Err(MembershipError::Storage("record store unavailable".into()))
        }

        fn members_of(
            &self,
            _collection_id: CollectionId,
        ) -> Result<Vec<CompanyId>, MembershipError> {
            Err(MembershipError::Storage("record store unavailable".into()))
        }

        fn count(&self, _collection_id: CollectionId) -> Result<u64, MembershipError> {
            Err(MembershipError::Storage("record store unavailable".into()))
        }
    }

    #[tokio::test]
    async fn fault_during_resolution_fails_the_whole_job() {
        let fx = Fixture::new();
        fx.seed(&[1, 2]);

        // All-matching resolution has to read the source membership, which
        // escapes the per-item boundary when the store is down.
        let job = Job::new(
            "key-all-down",
            Selection::AllMatching {
                filter: None,
                snapshot_total: Some(2),
            },
            fx.source,
            fx.target,
        );
        let job_id = fx.jobs.create_or_get(job).unwrap().job.id;

        let processor = BulkMoveProcessor::new(
            fx.jobs.clone(),
            fx.companies.clone(),
            UnavailableMembershipStore,
            ProcessorConfig {
                throttle: Duration::ZERO,
                checkpoint_every: 10,
            },
        );
        processor.run(job_id).await;

        let job = fx.jobs.get(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.error_message.as_deref(),
            Some("storage error: record store unavailable")
        );
        assert!(job.completed_at.is_some());
        // Nothing was processed before the fault.
        assert_eq!(job.counters, JobCounters::default());
    }

    #[tokio::test]
    async fn empty_resolution_completes_immediately() {
        let fx = Fixture::new();
        // Companies named by the job do not exist.
        let job_id = fx.submit_explicit(&[41, 42]);

        fx.processor().run(job_id).await;

        let job = fx.jobs.get(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.total_items, 0);
        assert_eq!(job.counters.processed, 0);
        assert_eq!(job.progress_pct(), 0.0);
    }

    #[tokio::test]
    async fn all_matching_job_moves_current_members() {
        let fx = Fixture::new();
        fx.seed(&[5, 6, 7]);

        let job = Job::new(
            "key-all",
            Selection::AllMatching {
                filter: Some(serde_json::json!({"name_contains": "company"})),
                snapshot_total: Some(99),
            },
            fx.source,
            fx.target,
        );
        let job_id = fx.jobs.create_or_get(job).unwrap().job.id;

        fx.processor().run(job_id).await;

        let job = fx.jobs.get(job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        // Resolution overwrote the client's snapshot estimate.
        assert_eq!(job.total_items, 3);
        assert_eq!(job.counters.added, 3);
    }
}
