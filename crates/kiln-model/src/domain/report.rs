use serde::{Deserialize, Serialize};

use crate::{EnvDeleteResponse, EnvUpdateResponse};

/// Names touched by a single mutation of the job environment.
///
/// Invariants after [`MutationReport::normalize`]:
/// - each list is sorted ascending and free of duplicates;
/// - `added` and `updated` are disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationReport {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
}

impl MutationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sort and de-duplicate every list.
    pub fn normalize(&mut self) {
        for names in [&mut self.added, &mut self.updated, &mut self.deleted] {
            names.sort_unstable();
            names.dedup();
        }
    }

    /// True when the mutation changed nothing.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn into_update_response(self) -> EnvUpdateResponse {
        EnvUpdateResponse {
            added: self.added,
            updated: self.updated,
        }
    }

    pub fn into_delete_response(self) -> EnvDeleteResponse {
        EnvDeleteResponse {
            deleted: self.deleted,
        }
    }
}
