//! Selection resolution: turn a job's selection snapshot into the concrete
//! work list at execution time.

use curator_core::{CompanyId, Job, Selection};
use curator_store::{CompanyStore, MembershipError, MembershipStore};

/// Resolve a job's selection into the ordered list of company ids to process.
///
/// Explicit selections keep their submitted order; ids that no longer name an
/// existing company are silently dropped, which is how the resolved total can
/// land below the submission-time estimate. All-matching selections read the
/// source collection's current membership (the carried filter payload is an
/// audit artifact of the submission, not a re-evaluated query).
pub fn resolve_selection<C, M>(
    job: &Job,
    companies: &C,
    memberships: &M,
) -> Result<Vec<CompanyId>, MembershipError>
where
    C: CompanyStore,
    M: MembershipStore,
{
    let candidates: Vec<CompanyId> = match &job.selection {
        Selection::Explicit { ids } => ids.clone(),
        Selection::AllMatching { .. } => memberships.members_of(job.source_collection_id)?,
    };

    Ok(candidates
        .into_iter()
        .filter(|&id| companies.get(id).is_some())
        .collect())
}
