//! Classification of the names affected by a mutation.
//!
//! Both functions look at the environment as it was *before* the mutation is applied.
//! Callers must hold the store's write lock between computing the report and applying the change, otherwise the classification may not match what was written.
use kiln_model::{JobEnv, MutationReport};

/// Classify the targets of an update into `added` and `updated`.
pub fn update_report<'a, I>(before: &JobEnv, names: I) -> MutationReport
where
    I: IntoIterator<Item = &'a str>,
{
    let mut report = MutationReport::new();
    for name in names {
        if before.contains(name) {
            report.updated.push(name.to_owned());
        } else {
            report.added.push(name.to_owned());
        }
    }
    report.normalize();
    report
}

/// Select the targets of a delete that actually exist.
///
/// Absent names are silently skipped.
pub fn delete_report<'a, I>(before: &JobEnv, names: I) -> MutationReport
where
    I: IntoIterator<Item = &'a str>,
{
    let mut report = MutationReport::new();
    report.deleted = names
        .into_iter()
        .filter(|name| before.contains(name))
        .map(str::to_owned)
        .collect();
    report.normalize();
    report
}
