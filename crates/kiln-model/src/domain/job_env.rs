use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Environment variables of a running job.
///
/// Keys are unique. Internally kept in a sorted map, so snapshots produced by [`JobEnv::dump`] and iteration order are deterministic.
/// Serialized as a transparent JSON object (`{"NAME": "value"}`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobEnv(BTreeMap<String, String>);

impl JobEnv {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the environment is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the value of a variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Check whether a variable is present.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Set a variable, returning the previous value if there was one.
    pub fn set<K, V>(&mut self, key: K, value: V) -> Option<String>
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.insert(key.into(), value.into())
    }

    /// Remove a variable, returning its value if it was present.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    /// Sorted copy of every pair.
    pub fn dump(&self) -> BTreeMap<String, String> {
        self.0.clone()
    }
}

impl<K, V> FromIterator<(K, V)> for JobEnv
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K, V> Extend<(K, V)> for JobEnv
where
    K: Into<String>,
    V: Into<String>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        self.0
            .extend(iter.into_iter().map(|(k, v)| (k.into(), v.into())));
    }
}

impl From<BTreeMap<String, String>> for JobEnv {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl From<JobEnv> for BTreeMap<String, String> {
    fn from(env: JobEnv) -> Self {
        env.0
    }
}
