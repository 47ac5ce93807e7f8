//! Anonymous vs. authenticated identities.
//!
//! The external identity system decides what a well-formed account key looks
//! like through [`AccountKeyFormat`]; everything else with a non-empty value
//! is an anonymous session token. Tables declare an [`Ownership`]
//! requirement and [`Identity::can_own`] answers whether an identity may hold
//! rows there.

use serde::Serialize;

use crate::error::IdentityError;

/// The identity system's "is this a well-formed account key" predicate.
pub trait AccountKeyFormat: Send + Sync {
    fn is_account_key(&self, raw: &str) -> bool;
}

/// Account keys are UUIDs (any version, hyphenated or simple form).
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidAccountKeys;

impl AccountKeyFormat for UuidAccountKeys {
    fn is_account_key(&self, raw: &str) -> bool {
        uuid::Uuid::parse_str(raw).is_ok()
    }
}

/// A key accepted by the identity system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AccountKey(String);

impl AccountKey {
    pub fn parse(raw: &str, format: &dyn AccountKeyFormat) -> Result<Self, IdentityError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(IdentityError::Empty);
        }
        if !format.is_account_key(raw) {
            return Err(IdentityError::NotAnAccountKey(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who owns a set of rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Identity {
    /// Opaque session token; not guaranteed to look like an account key.
    Anonymous(String),
    Authenticated(AccountKey),
}

/// Which identities a table's key space admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    AnyIdentity,
    AccountOnly,
}

impl Identity {
    /// Authenticated if `format` accepts the value, anonymous otherwise.
    pub fn classify(raw: &str, format: &dyn AccountKeyFormat) -> Result<Self, IdentityError> {
        match AccountKey::parse(raw, format) {
            Ok(key) => Ok(Self::Authenticated(key)),
            Err(IdentityError::NotAnAccountKey(token)) => Ok(Self::Anonymous(token)),
            Err(e) => Err(e),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Anonymous(token) => token,
            Self::Authenticated(key) => key.as_str(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous(_))
    }

    pub fn can_own(&self, ownership: Ownership) -> bool {
        match ownership {
            Ownership::AnyIdentity => true,
            Ownership::AccountOnly => !self.is_anonymous(),
        }
    }
}

impl From<AccountKey> for Identity {
    fn from(key: AccountKey) -> Self {
        Self::Authenticated(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT: &str = "0190f0a4-7c1e-7a55-9a11-3f6a2b8c9d01";

    #[test]
    fn classify_splits_on_format() {
        let format = UuidAccountKeys;
        assert_eq!(
            Identity::classify(ACCOUNT, &format).unwrap(),
            Identity::Authenticated(AccountKey(ACCOUNT.to_string()))
        );
        assert_eq!(
            Identity::classify("anon_k2j4h5", &format).unwrap(),
            Identity::Anonymous("anon_k2j4h5".to_string())
        );
        assert_eq!(Identity::classify("  ", &format), Err(IdentityError::Empty));
    }

    #[test]
    fn anonymous_cannot_own_account_tables() {
        let anon = Identity::Anonymous("anon_1".into());
        let user = Identity::classify(ACCOUNT, &UuidAccountKeys).unwrap();
        assert!(anon.can_own(Ownership::AnyIdentity));
        assert!(!anon.can_own(Ownership::AccountOnly));
        assert!(user.can_own(Ownership::AccountOnly));
    }

    #[test]
    fn account_key_rejects_tokens() {
        assert_eq!(
            AccountKey::parse("anon_1", &UuidAccountKeys),
            Err(IdentityError::NotAnAccountKey("anon_1".into()))
        );
    }
}
