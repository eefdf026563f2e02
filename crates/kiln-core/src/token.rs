use std::fmt;

use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Per-job bearer credential.
///
/// Lives only in memory and in the job's environment.
/// `Debug` and `Display` are redacted so the value cannot end up in a log line by accident.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Generate a fresh random token (two v4 UUIDs, 64 hex chars).
    pub fn generate() -> Self {
        Self(format!(
            "{}{}",
            Uuid::new_v4().simple(),
            Uuid::new_v4().simple()
        ))
    }

    /// Raw secret, for handing to the job's environment.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison against a presented token.
    ///
    /// A length mismatch is rejected without comparing contents.
    pub fn verify(&self, presented: &str) -> bool {
        self.0.as_bytes().ct_eq(presented.as_bytes()).into()
    }

    /// Check an `Authorization` header value of the form `Bearer <token>`.
    pub fn verify_bearer(&self, header: &str) -> bool {
        header
            .strip_prefix("Bearer ")
            .is_some_and(|presented| self.verify(presented))
    }
}

impl From<String> for SessionToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionToken {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_unique_and_long() {
        let a = SessionToken::generate();
        let b = SessionToken::generate();
        assert_ne!(a, b);
        assert_eq!(a.expose().len(), 64);
        assert!(a.expose().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn verify_exact_match_only() {
        let token = SessionToken::from("to_the_secret_lab");
        assert!(token.verify("to_the_secret_lab"));
        assert!(!token.verify("to_the_secret_lab!"));
        assert!(!token.verify("to_the_secret_la"));
        assert!(!token.verify(""));
        assert!(!token.verify("to_the_secret_lax"));
        assert!(!token.verify("TO_THE_SECRET_LAB"));
    }

    #[test]
    fn generated_token_verifies_itself() {
        let token = SessionToken::generate();
        let copy = token.expose().to_owned();
        assert!(token.verify(&copy));
        assert!(token.verify_bearer(&format!("Bearer {copy}")));
    }

    #[test]
    fn verify_bearer_requires_scheme() {
        let token = SessionToken::from("to_the_secret_lab");
        assert!(token.verify_bearer("Bearer to_the_secret_lab"));
        assert!(!token.verify_bearer("to_the_secret_lab"));
        assert!(!token.verify_bearer("Basic to_the_secret_lab"));
        assert!(!token.verify_bearer("Bearer wrong"));
    }

    #[test]
    fn formatting_never_leaks() {
        let token = SessionToken::from("to_the_secret_lab");
        assert!(!format!("{token:?}").contains("secret"));
        assert!(!format!("{token}").contains("secret"));
    }
}
