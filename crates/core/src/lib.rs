//! `curator-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod collection;
pub mod company;
pub mod error;
pub mod id;
pub mod job;

pub use collection::Collection;
pub use company::Company;
pub use error::{DomainError, DomainResult};
pub use id::{CollectionId, CompanyId, JobId};
pub use job::{Job, JobCounters, JobKind, JobStatus, Selection};
