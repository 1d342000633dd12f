//! Collection records. Referenced, never mutated, by the job subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::CollectionId;

/// A named grouping of companies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: CollectionId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: CollectionId::new(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}
