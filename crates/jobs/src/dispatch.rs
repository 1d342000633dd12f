//! Submission and dispatch policy.
//!
//! The dispatcher owns the write path for new jobs: it validates the
//! referenced collections, derives the idempotency key, records the job via
//! `create_or_get`, and then decides by estimated size whether to run the
//! processor inline or hand it to a background task.

use tracing::{debug, info};

use curator_core::{CollectionId, Job, JobStatus, Selection};
use curator_store::{CollectionStore, CompanyStore, JobStore, JobStoreError, MembershipStore};

use crate::idempotency::derive_idempotency_key;
use crate::processor::{BulkMoveProcessor, ProcessorConfig};

/// Actor recorded in derived idempotency keys until submissions carry an
/// authenticated principal.
pub const DEFAULT_ACTOR: &str = "default";

/// Dispatch tunables.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Selections at or below this estimate run inline in the caller's task;
    /// larger ones are spawned in the background.
    pub inline_threshold: u64,
    pub processor: ProcessorConfig,
    pub actor: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            inline_threshold: 50,
            processor: ProcessorConfig::default(),
            actor: DEFAULT_ACTOR.to_string(),
        }
    }
}

/// A validated bulk-move submission.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub source_collection_id: CollectionId,
    pub target_collection_id: CollectionId,
    pub selection: Selection,
    /// Client-supplied override; when absent the key is derived from the
    /// submission itself.
    pub idempotency_key: Option<String>,
}

/// Submission rejected before any job record was written.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("source collection not found: {0}")]
    SourceNotFound(CollectionId),
    #[error("target collection not found: {0}")]
    TargetNotFound(CollectionId),
    #[error("source and target collections must differ")]
    SameCollection,
    #[error(transparent)]
    Store(#[from] JobStoreError),
}

/// Outcome of a submission: the effective job row after dispatch.
#[derive(Debug, Clone)]
pub struct Submitted {
    pub job: Job,
    /// Whether this submission inserted the row (false on idempotent replay).
    pub created: bool,
    /// Whether the processor ran to a terminal status before returning.
    pub ran_inline: bool,
}

/// Front door of the job subsystem.
#[derive(Debug, Clone)]
pub struct Dispatcher<J, L, C, M> {
    jobs: J,
    collections: L,
    processor: BulkMoveProcessor<J, C, M>,
    config: DispatchConfig,
}

impl<J, L, C, M> Dispatcher<J, L, C, M>
where
    J: JobStore + Clone + Send + Sync + 'static,
    L: CollectionStore,
    C: CompanyStore + Clone + Send + Sync + 'static,
    M: MembershipStore + Clone + Send + Sync + 'static,
{
    pub fn new(
        jobs: J,
        collections: L,
        companies: C,
        memberships: M,
        config: DispatchConfig,
    ) -> Self {
        let processor =
            BulkMoveProcessor::new(jobs.clone(), companies, memberships, config.processor);
        Self {
            jobs,
            collections,
            processor,
            config,
        }
    }

    /// Record the submission and dispatch it.
    ///
    /// Replays (same idempotency key, job already Pending/Processing or
    /// Completed) return the existing row; a Failed/Cancelled predecessor
    /// comes back reset to Pending and is dispatched again. Dispatch of a
    /// non-Pending job is a no-op by way of the store's begin guard.
    pub async fn submit(&self, request: SubmitRequest) -> Result<Submitted, SubmitError> {
        if self.collections.get(request.source_collection_id).is_none() {
            return Err(SubmitError::SourceNotFound(request.source_collection_id));
        }
        if self.collections.get(request.target_collection_id).is_none() {
            return Err(SubmitError::TargetNotFound(request.target_collection_id));
        }
        if request.source_collection_id == request.target_collection_id {
            return Err(SubmitError::SameCollection);
        }

        let key = request.idempotency_key.clone().unwrap_or_else(|| {
            derive_idempotency_key(
                request.source_collection_id,
                request.target_collection_id,
                &request.selection,
                &self.config.actor,
            )
        });

        let candidate = Job::new(
            key,
            request.selection,
            request.source_collection_id,
            request.target_collection_id,
        );
        let outcome = self.jobs.create_or_get(candidate)?;
        let mut job = outcome.job;
        if !outcome.created {
            debug!(job_id = %job.id, status = ?job.status, "idempotent replay");
        }

        let mut ran_inline = false;
        if job.status == JobStatus::Pending {
            if job.total_items <= self.config.inline_threshold {
                self.processor.run(job.id).await;
                ran_inline = true;
                // Report the terminal row, not the pending snapshot.
                if let Some(finished) = self.jobs.get(job.id)? {
                    job = finished;
                }
            } else {
                info!(job_id = %job.id, total = job.total_items, "dispatching in background");
                let processor = self.processor.clone();
                let job_id = job.id;
                tokio::spawn(async move { processor.run(job_id).await });
            }
        }

        Ok(Submitted {
            job,
            created: outcome.created,
            ran_inline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use curator_core::{Collection, Company, CompanyId};
    use curator_store::{
        InMemoryCollectionStore, InMemoryCompanyStore, InMemoryJobStore, InMemoryMembershipStore,
    };

    type TestDispatcher = Dispatcher<
        Arc<InMemoryJobStore>,
        Arc<InMemoryCollectionStore>,
        Arc<InMemoryCompanyStore>,
        Arc<InMemoryMembershipStore>,
    >;

    struct Fixture {
        jobs: Arc<InMemoryJobStore>,
        memberships: Arc<InMemoryMembershipStore>,
        dispatcher: TestDispatcher,
        source: CollectionId,
        target: CollectionId,
    }

    impl Fixture {
        fn new(inline_threshold: u64) -> Self {
            let jobs = InMemoryJobStore::arc();
            let collections = Arc::new(InMemoryCollectionStore::new());
            let companies = Arc::new(InMemoryCompanyStore::new());
            let memberships = Arc::new(InMemoryMembershipStore::new());

            let source_collection = Collection::new("liked");
            let target_collection = Collection::new("to review");
            let source = source_collection.id;
            let target = target_collection.id;
            collections.insert(source_collection);
            collections.insert(target_collection);

            for id in 1..=200 {
                companies.insert(Company::new(CompanyId(id), format!("company-{id}")));
            }

            let dispatcher = Dispatcher::new(
                jobs.clone(),
                collections,
                companies,
                memberships.clone(),
                DispatchConfig {
                    inline_threshold,
                    processor: ProcessorConfig {
                        throttle: Duration::ZERO,
                        checkpoint_every: 10,
                    },
                    actor: DEFAULT_ACTOR.to_string(),
                },
            );

            Self {
                jobs,
                memberships,
                dispatcher,
                source,
                target,
            }
        }

        fn request(&self, ids: std::ops::RangeInclusive<i64>) -> SubmitRequest {
            SubmitRequest {
                source_collection_id: self.source,
                target_collection_id: self.target,
                selection: Selection::Explicit {
                    ids: ids.map(CompanyId).collect(),
                },
                idempotency_key: None,
            }
        }
    }

    #[tokio::test]
    async fn small_selection_runs_inline_to_completion() {
        let fx = Fixture::new(50);

        let submitted = fx.dispatcher.submit(fx.request(1..=3)).await.unwrap();

        assert!(submitted.created);
        assert!(submitted.ran_inline);
        assert_eq!(submitted.job.status, JobStatus::Completed);
        assert_eq!(submitted.job.counters.added, 3);
        assert_eq!(fx.memberships.count(fx.target).unwrap(), 3);
    }

    #[tokio::test]
    async fn large_selection_goes_to_background() {
        let fx = Fixture::new(50);

        let submitted = fx.dispatcher.submit(fx.request(1..=60)).await.unwrap();
        assert!(!submitted.ran_inline);
        assert!(!submitted.job.status.is_terminal());

        // Wait for the spawned task to drain the job.
        let job_id = submitted.job.id;
        let finished = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let job = fx.jobs.get(job_id).unwrap().unwrap();
                if job.status.is_terminal() {
                    return job;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(finished.status, JobStatus::Completed);
        assert_eq!(finished.counters.added, 60);
    }

    #[tokio::test]
    async fn resubmission_replays_the_same_job() {
        let fx = Fixture::new(50);

        let first = fx.dispatcher.submit(fx.request(1..=3)).await.unwrap();
        let second = fx.dispatcher.submit(fx.request(1..=3)).await.unwrap();

        assert!(!second.created);
        assert!(!second.ran_inline);
        assert_eq!(second.job.id, first.job.id);
        assert_eq!(second.job.status, JobStatus::Completed);
        // No double-move happened.
        assert_eq!(fx.memberships.count(fx.target).unwrap(), 3);
    }

    #[tokio::test]
    async fn client_supplied_key_takes_precedence() {
        let fx = Fixture::new(50);

        let mut a = fx.request(1..=2);
        a.idempotency_key = Some("client-key".to_string());
        let mut b = fx.request(10..=12);
        b.idempotency_key = Some("client-key".to_string());

        let first = fx.dispatcher.submit(a).await.unwrap();
        let second = fx.dispatcher.submit(b).await.unwrap();

        // Different payloads, same client key: one job.
        assert_eq!(second.job.id, first.job.id);
        assert!(!second.created);
    }

    #[tokio::test]
    async fn unknown_collections_are_rejected_before_any_write() {
        let fx = Fixture::new(50);

        let mut bad_source = fx.request(1..=2);
        bad_source.source_collection_id = CollectionId::new();
        assert!(matches!(
            fx.dispatcher.submit(bad_source).await,
            Err(SubmitError::SourceNotFound(_))
        ));

        let mut bad_target = fx.request(1..=2);
        bad_target.target_collection_id = CollectionId::new();
        assert!(matches!(
            fx.dispatcher.submit(bad_target).await,
            Err(SubmitError::TargetNotFound(_))
        ));
    }

    #[tokio::test]
    async fn same_source_and_target_is_rejected() {
        let fx = Fixture::new(50);

        let mut request = fx.request(1..=2);
        request.target_collection_id = request.source_collection_id;
        assert!(matches!(
            fx.dispatcher.submit(request).await,
            Err(SubmitError::SameCollection)
        ));
    }

    #[tokio::test]
    async fn failed_predecessor_is_retried_on_resubmit() {
        let fx = Fixture::new(50);

        let first = fx.dispatcher.submit(fx.request(1..=2)).await.unwrap();
        fx.jobs
            .set_status(first.job.id, JobStatus::Failed, Some("boom".into()))
            .unwrap();

        let retried = fx.dispatcher.submit(fx.request(1..=2)).await.unwrap();
        assert!(!retried.created);
        assert_eq!(retried.job.id, first.job.id);
        // The reset row went back through the processor.
        assert_eq!(retried.job.status, JobStatus::Completed);
        assert!(retried.job.error_message.is_none());
    }
}
