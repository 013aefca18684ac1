pub mod pubkey;
pub mod resolver;

use crate::config::types::AccessConfig;
use pubkey::AuthorizedKeySet;
use russh::keys::PublicKey;

/// Outcome of one authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    /// Identity enforcement is on and the claimed user is not the account.
    UnrecognizedUser,
    /// The presented key is not among the published keys.
    UnknownKey,
}

impl Decision {
    pub fn is_accept(self) -> bool {
        self == Decision::Accept
    }
}

/// Decides, once per handshake, whether a presented key may log in.
///
/// Holds the startup key set for the whole process lifetime; it is never
/// refreshed or mutated.
#[derive(Debug)]
pub struct AuthorizationPolicy {
    account: String,
    enforce_identity: bool,
    keys: AuthorizedKeySet,
}

impl AuthorizationPolicy {
    pub fn new(account: impl Into<String>, enforce_identity: bool, keys: AuthorizedKeySet) -> Self {
        Self {
            account: account.into(),
            enforce_identity,
            keys,
        }
    }

    pub fn from_config(access: &AccessConfig, keys: AuthorizedKeySet) -> Self {
        Self::new(access.github_user.clone(), access.check_github_user, keys)
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn enforces_identity(&self) -> bool {
        self.enforce_identity
    }

    pub fn keys(&self) -> &AuthorizedKeySet {
        &self.keys
    }

    /// True when the claimed identity passes the identity-equality rule.
    pub fn identity_allowed(&self, claimed: &str) -> bool {
        !self.enforce_identity || claimed == self.account
    }

    pub fn evaluate(&self, claimed: &str, presented: &PublicKey) -> Decision {
        if !self.identity_allowed(claimed) {
            return Decision::UnrecognizedUser;
        }
        if self.keys.contains(presented) {
            Decision::Accept
        } else {
            Decision::UnknownKey
        }
    }

    pub fn accept(&self, claimed: &str, presented: &PublicKey) -> bool {
        self.evaluate(claimed, presented).is_accept()
    }
}
