//! Collection, company, and membership stores.
//!
//! Memberships are the many-to-many link the processor's skip/add decision
//! is based on; the pair (company, collection) is unique at the store level.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use curator_core::{Collection, CollectionId, Company, CompanyId};

/// Membership store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MembershipError {
    /// Uniqueness violation on (company, collection).
    #[error("company {company_id} is already a member of collection {collection_id}")]
    Duplicate {
        company_id: CompanyId,
        collection_id: CollectionId,
    },
    /// Backend fault. The in-memory store never produces this; it is the
    /// variant a SQL-backed implementation maps connection/query errors into.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Collection records; referenced, never mutated, by the job subsystem.
pub trait CollectionStore: Send + Sync {
    fn insert(&self, collection: Collection);
    fn get(&self, id: CollectionId) -> Option<Collection>;
}

/// Company records.
pub trait CompanyStore: Send + Sync {
    fn insert(&self, company: Company);
    fn get(&self, id: CompanyId) -> Option<Company>;
}

/// Membership associations between companies and collections.
pub trait MembershipStore: Send + Sync {
    /// Insert the association as one atomic commit; a duplicate pair is a
    /// `MembershipError::Duplicate`.
    fn insert(
        &self,
        company_id: CompanyId,
        collection_id: CollectionId,
    ) -> Result<(), MembershipError>;

    fn exists(
        &self,
        company_id: CompanyId,
        collection_id: CollectionId,
    ) -> Result<bool, MembershipError>;

    /// Current members of a collection, in association-insertion order.
    fn members_of(&self, collection_id: CollectionId) -> Result<Vec<CompanyId>, MembershipError>;

    fn count(&self, collection_id: CollectionId) -> Result<u64, MembershipError>;
}

impl<S> CollectionStore for Arc<S>
where
    S: CollectionStore + ?Sized,
{
    fn insert(&self, collection: Collection) {
        (**self).insert(collection)
    }

    fn get(&self, id: CollectionId) -> Option<Collection> {
        (**self).get(id)
    }
}

impl<S> CompanyStore for Arc<S>
where
    S: CompanyStore + ?Sized,
{
    fn insert(&self, company: Company) {
        (**self).insert(company)
    }

    fn get(&self, id: CompanyId) -> Option<Company> {
        (**self).get(id)
    }
}

impl<S> MembershipStore for Arc<S>
where
    S: MembershipStore + ?Sized,
{
    fn insert(
        &self,
        company_id: CompanyId,
        collection_id: CollectionId,
    ) -> Result<(), MembershipError> {
        (**self).insert(company_id, collection_id)
    }

    fn exists(
        &self,
        company_id: CompanyId,
        collection_id: CollectionId,
    ) -> Result<bool, MembershipError> {
        (**self).exists(company_id, collection_id)
    }

    fn members_of(&self, collection_id: CollectionId) -> Result<Vec<CompanyId>, MembershipError> {
        (**self).members_of(collection_id)
    }

    fn count(&self, collection_id: CollectionId) -> Result<u64, MembershipError> {
        (**self).count(collection_id)
    }
}

/// In-memory collection store.
#[derive(Debug, Default)]
pub struct InMemoryCollectionStore {
    inner: RwLock<HashMap<CollectionId, Collection>>,
}

impl InMemoryCollectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CollectionStore for InMemoryCollectionStore {
    fn insert(&self, collection: Collection) {
        self.inner.write().unwrap().insert(collection.id, collection);
    }

    fn get(&self, id: CollectionId) -> Option<Collection> {
        self.inner.read().unwrap().get(&id).cloned()
    }
}

/// In-memory company store.
#[derive(Debug, Default)]
pub struct InMemoryCompanyStore {
    inner: RwLock<HashMap<CompanyId, Company>>,
}

impl InMemoryCompanyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CompanyStore for InMemoryCompanyStore {
    fn insert(&self, company: Company) {
        self.inner.write().unwrap().insert(company.id, company);
    }

    fn get(&self, id: CompanyId) -> Option<Company> {
        self.inner.read().unwrap().get(&id).cloned()
    }
}

/// In-memory membership store.
///
/// Associations are kept in insertion order so `members_of` is stable, the
/// way a serial-keyed association table reads back.
#[derive(Debug, Default)]
pub struct InMemoryMembershipStore {
    inner: RwLock<Vec<(CompanyId, CollectionId)>>,
}

impl InMemoryMembershipStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MembershipStore for InMemoryMembershipStore {
    fn insert(
        &self,
        company_id: CompanyId,
        collection_id: CollectionId,
    ) -> Result<(), MembershipError> {
        let mut rows = self.inner.write().unwrap();
        if rows.iter().any(|&(c, l)| c == company_id && l == collection_id) {
            return Err(MembershipError::Duplicate {
                company_id,
                collection_id,
            });
        }
        rows.push((company_id, collection_id));
        Ok(())
    }

    fn exists(
        &self,
        company_id: CompanyId,
        collection_id: CollectionId,
    ) -> Result<bool, MembershipError> {
        let rows = self.inner.read().unwrap();
        Ok(rows.iter().any(|&(c, l)| c == company_id && l == collection_id))
    }

    fn members_of(&self, collection_id: CollectionId) -> Result<Vec<CompanyId>, MembershipError> {
        let rows = self.inner.read().unwrap();
        Ok(rows
            .iter()
            .filter(|&&(_, l)| l == collection_id)
            .map(|&(c, _)| c)
            .collect())
    }

    fn count(&self, collection_id: CollectionId) -> Result<u64, MembershipError> {
        let rows = self.inner.read().unwrap();
        Ok(rows.iter().filter(|&&(_, l)| l == collection_id).count() as u64)
    }
}
