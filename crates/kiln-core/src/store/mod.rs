use std::{
    collections::BTreeMap,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use kiln_model::{JobEnv, MutationReport};
use tracing::trace;

use crate::{
    diff::{delete_report, update_report},
    protected::ProtectedKeys,
};

/// In-memory environment of one job.
///
/// Reads take the shared lock; every mutation takes the exclusive lock exactly once.
/// Whole-request operations ([`EnvStore::apply_update`], [`EnvStore::apply_delete`]) classify and apply under that single acquisition, so concurrent requests never interleave their individual keys.
///
/// Protected names must be filtered out by the caller before any mutation reaches the store.
/// The store only asserts that contract in debug builds.
#[derive(Clone)]
pub struct EnvStore {
    inner: Arc<RwLock<JobEnv>>,
    protected: Arc<ProtectedKeys>,
}

impl EnvStore {
    /// Create a store seeded with the job's initial environment.
    pub fn new(env: JobEnv, protected: ProtectedKeys) -> Self {
        Self {
            inner: Arc::new(RwLock::new(env)),
            protected: Arc::new(protected),
        }
    }

    /// Registry this store was built with.
    pub fn protected(&self) -> &ProtectedKeys {
        &self.protected
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.read().get(name).map(str::to_owned)
    }

    /// Set a single variable, returning the previous value.
    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        self.assert_mutable([name.as_str()]);
        self.write().set(name, value)
    }

    /// Remove a single variable, returning its value if it existed.
    pub fn remove(&self, name: &str) -> Option<String> {
        self.assert_mutable([name]);
        self.write().remove(name)
    }

    /// Sorted point-in-time copy of every variable.
    pub fn dump(&self) -> BTreeMap<String, String> {
        self.read().dump()
    }

    /// Point-in-time copy as a [`JobEnv`].
    pub fn snapshot(&self) -> JobEnv {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Set every pair of `changes` atomically.
    ///
    /// The report is computed against the state observed once the write lock is held.
    pub fn apply_update(&self, changes: BTreeMap<String, String>) -> MutationReport {
        self.assert_mutable(changes.keys().map(String::as_str));

        let mut env = self.write();
        let report = update_report(&env, changes.keys().map(String::as_str));
        env.extend(changes);
        drop(env);

        trace!(
            added = report.added.len(),
            updated = report.updated.len(),
            "environment updated"
        );
        report
    }

    /// Remove every existing name in `names` atomically; absent names are ignored.
    pub fn apply_delete<S: AsRef<str>>(&self, names: &[S]) -> MutationReport {
        self.assert_mutable(names.iter().map(AsRef::as_ref));

        let mut env = self.write();
        let report = delete_report(&env, names.iter().map(AsRef::as_ref));
        for name in &report.deleted {
            env.remove(name);
        }
        drop(env);

        trace!(deleted = report.deleted.len(), "environment keys deleted");
        report
    }

    fn assert_mutable<'a, I>(&self, names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        if cfg!(debug_assertions) {
            let protected = self.protected.protected_in(names);
            debug_assert!(
                protected.is_empty(),
                "protected keys reached the environment store: {protected:?}"
            );
        }
    }

    // A panic while holding the lock cannot leave a half-applied request:
    // classification finishes before the first write.
    fn read(&self) -> RwLockReadGuard<'_, JobEnv> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, JobEnv> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
