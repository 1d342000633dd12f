//! Record-store abstractions and in-memory implementations.
//!
//! The job subsystem reaches persistence only through the traits in this
//! crate. The in-memory implementations back tests, dev, and the default
//! server wiring; a SQL-backed implementation would slot in behind the same
//! traits.

pub mod job_store;
pub mod records;

pub use job_store::{CreateOrGet, InMemoryJobStore, JobStore, JobStoreError};
pub use records::{
    CollectionStore, CompanyStore, InMemoryCollectionStore, InMemoryCompanyStore,
    InMemoryMembershipStore, MembershipError, MembershipStore,
};
