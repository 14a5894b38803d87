//! API key generation for the supervised daemon.
//!
//! The key is handed to the daemon through its environment and attached to
//! every REST call as `X-API-Key`. It is generated once per supervisor and
//! survives daemon restarts so existing consumers keep authenticating.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt;

/// Number of characters in a generated key.
pub const CREDENTIAL_LEN: usize = 32;

/// Shared-secret token authenticating local API calls.
///
/// `Debug` and `Display` are redacted so the key never ends up in logs;
/// use [`Credential::expose`] where the raw value is required.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential(String);

impl Credential {
    /// Generates a uniformly distributed key over `A-Z a-z 0-9`.
    pub fn generate() -> Self {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CREDENTIAL_LEN)
            .map(char::from)
            .collect();
        Self(token)
    }

    /// Returns the raw key for use in the daemon environment or request headers.
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}
