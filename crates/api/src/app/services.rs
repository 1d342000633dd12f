//! Store wiring and the job dispatcher shared by all handlers.

use std::sync::Arc;

use curator_jobs::{DispatchConfig, Dispatcher};
use curator_store::{
    InMemoryCollectionStore, InMemoryCompanyStore, InMemoryJobStore, InMemoryMembershipStore,
};

/// Dispatcher over the in-memory store wiring.
pub type AppDispatcher = Dispatcher<
    Arc<InMemoryJobStore>,
    Arc<InMemoryCollectionStore>,
    Arc<InMemoryCompanyStore>,
    Arc<InMemoryMembershipStore>,
>;

/// Shared application services.
///
/// The store handles are exposed directly so dev setups and tests can seed
/// collections, companies, and memberships without a management API.
#[derive(Clone)]
pub struct AppServices {
    pub jobs: Arc<InMemoryJobStore>,
    pub collections: Arc<InMemoryCollectionStore>,
    pub companies: Arc<InMemoryCompanyStore>,
    pub memberships: Arc<InMemoryMembershipStore>,
    pub dispatcher: AppDispatcher,
}

/// Default wiring.
pub fn build_services() -> AppServices {
    build_services_with(DispatchConfig::default())
}

/// Wiring with explicit dispatch tunables (tests shrink the throttle and
/// threshold to drive both dispatch paths deterministically).
pub fn build_services_with(config: DispatchConfig) -> AppServices {
    let jobs = InMemoryJobStore::arc();
    let collections = Arc::new(InMemoryCollectionStore::new());
    let companies = Arc::new(InMemoryCompanyStore::new());
    let memberships = Arc::new(InMemoryMembershipStore::new());

    let dispatcher = Dispatcher::new(
        jobs.clone(),
        collections.clone(),
        companies.clone(),
        memberships.clone(),
        config,
    );

    AppServices {
        jobs,
        collections,
        companies,
        memberships,
        dispatcher,
    }
}
