use std::collections::{BTreeSet, HashSet};

use kiln_model::{JOB_API_SOCKET_ENV, JOB_API_TOKEN_ENV};

use crate::error::CoreError;

/// Variables the agent reserves for itself.
///
/// The control socket and token are included so a job cannot hijack or leak the channel it is talking through.
const AGENT_PROTECTED: &[&str] = &[
    JOB_API_SOCKET_ENV,
    JOB_API_TOKEN_ENV,
    "KILN_AGENT_ACCESS_TOKEN",
    "KILN_AGENT_DEBUG",
    "KILN_AGENT_ENDPOINT",
    "KILN_AGENT_PID",
    "KILN_BIN_PATH",
    "KILN_BUILD_PATH",
    "KILN_COMMAND_EVAL",
    "KILN_CONFIG_PATH",
    "KILN_GIT_MIRRORS_PATH",
    "KILN_GIT_SUBMODULES",
    "KILN_HOOKS_PATH",
    "KILN_LOCAL_HOOKS_ENABLED",
    "KILN_PLUGINS_ENABLED",
    "KILN_PLUGINS_PATH",
    "KILN_SHELL",
    "KILN_SOCKETS_PATH",
    "KILN_SSH_KEYSCAN",
];

/// Closed set of environment variable names that the control plane never mutates.
///
/// Built once before a job's server starts and never changed afterwards.
#[derive(Debug, Clone, Default)]
pub struct ProtectedKeys {
    keys: HashSet<String>,
}

impl ProtectedKeys {
    /// Build a registry from an explicit list of names.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// The agent's compiled-in reserved names.
    pub fn agent_defaults() -> Self {
        Self::new(AGENT_PROTECTED.iter().copied())
    }

    /// Add names from agent configuration.
    pub fn with_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys.extend(keys.into_iter().map(Into::into));
        self
    }

    #[inline]
    pub fn is_protected(&self, name: &str) -> bool {
        self.keys.contains(name)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Protected names among `candidates`, sorted and without duplicates.
    pub fn protected_in<'a, I>(&self, candidates: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .filter(|name| self.is_protected(name))
            .map(str::to_owned)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Fail if any candidate is protected.
    ///
    /// Every candidate is checked before returning, so the error lists all offenders at once.
    pub fn ensure_mutable<'a, I>(&self, candidates: I) -> Result<(), CoreError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let protected = self.protected_in(candidates);
        if protected.is_empty() {
            Ok(())
        } else {
            Err(CoreError::ProtectedKeys(protected))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_control_channel() {
        let keys = ProtectedKeys::agent_defaults();
        assert!(keys.is_protected(JOB_API_SOCKET_ENV));
        assert!(keys.is_protected(JOB_API_TOKEN_ENV));
        assert!(keys.is_protected("KILN_AGENT_ACCESS_TOKEN"));
        assert!(!keys.is_protected("PATH"));
    }

    #[test]
    fn membership_is_case_sensitive() {
        let keys = ProtectedKeys::new(["READONLY"]);
        assert!(keys.is_protected("READONLY"));
        assert!(!keys.is_protected("readonly"));
    }

    #[test]
    fn with_keys_extends_defaults() {
        let keys = ProtectedKeys::agent_defaults().with_keys(["READONLY"]);
        assert!(keys.is_protected("READONLY"));
        assert!(keys.is_protected(JOB_API_TOKEN_ENV));
        assert_eq!(keys.len(), AGENT_PROTECTED.len() + 1);
    }

    #[test]
    fn protected_in_reports_sorted_unique_offenders() {
        let keys = ProtectedKeys::new(["B", "A"]);
        let found = keys.protected_in(["C", "B", "A", "B"]);
        assert_eq!(found, vec!["A", "B"]);
    }

    #[test]
    fn ensure_mutable_lists_every_offender() {
        let keys = ProtectedKeys::new(["READONLY", "SECRET"]);
        assert!(keys.ensure_mutable(["PACHA", "YZMA"]).is_ok());

        match keys.ensure_mutable(["SECRET", "PACHA", "READONLY"]) {
            Err(CoreError::ProtectedKeys(names)) => assert_eq!(names, vec!["READONLY", "SECRET"]),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
