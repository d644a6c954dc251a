//! Static credential storage backing the security manager.

use std::collections::HashMap;

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

/// One configured principal: its password hash, API key (if any) and
/// granted permissions. The hash and key are wrapped in [`SecretString`]
/// so they never appear in `Debug` output or an accidental log line.
pub struct CredentialEntry {
    principal: String,
    password_hash_hex: SecretString,
    api_key: Option<SecretString>,
    permissions: Vec<String>,
}

impl CredentialEntry {
    #[must_use]
    pub fn with_password(
        principal: impl Into<String>,
        password: &str,
        permissions: Vec<String>,
    ) -> Self {
        Self {
            principal: principal.into(),
            password_hash_hex: SecretString::from(hash_password(password)),
            api_key: None,
            permissions,
        }
    }

    #[must_use]
    pub fn from_hash(
        principal: impl Into<String>,
        password_hash_hex: impl Into<String>,
        api_key: Option<String>,
        permissions: Vec<String>,
    ) -> Self {
        Self {
            principal: principal.into(),
            password_hash_hex: SecretString::from(password_hash_hex.into()),
            api_key: api_key.map(SecretString::from),
            permissions,
        }
    }
}

/// Hashes `password` with SHA-256, returning the lowercase hex digest.
#[must_use]
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// In-memory set of configured principals.
#[derive(Default)]
pub struct CredentialStore {
    by_principal: HashMap<String, CredentialEntry>,
    api_key_to_principal: HashMap<String, String>,
}

impl CredentialStore {
    pub fn insert(&mut self, entry: CredentialEntry) {
        if let Some(key) = &entry.api_key {
            self.api_key_to_principal
                .insert(key.expose_secret().to_string(), entry.principal.clone());
        }
        self.by_principal.insert(entry.principal.clone(), entry);
    }

    #[must_use]
    pub fn verify_password(&self, principal: &str, password: &str) -> bool {
        self.by_principal.get(principal).is_some_and(|entry| {
            entry.password_hash_hex.expose_secret() == hash_password(password)
        })
    }

    #[must_use]
    pub fn principal_for_api_key(&self, api_key: &str) -> Option<String> {
        self.api_key_to_principal.get(api_key).cloned()
    }

    #[must_use]
    pub fn permissions_for(&self, principal: &str) -> Vec<String> {
        self.by_principal
            .get(principal)
            .map(|e| e.permissions.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_is_deterministic_and_never_plaintext() {
        let hash = hash_password("hunter2");
        assert_eq!(hash.len(), 64);
        assert_ne!(hash, "hunter2");
        assert_eq!(hash, hash_password("hunter2"));
    }

    #[test]
    fn store_verifies_correct_password_only() {
        let mut store = CredentialStore::default();
        store.insert(CredentialEntry::with_password("bob", "s3cret", vec![]));
        assert!(store.verify_password("bob", "s3cret"));
        assert!(!store.verify_password("bob", "wrong"));
        assert!(!store.verify_password("unknown", "s3cret"));
    }

    #[test]
    fn api_key_resolves_to_principal() {
        let mut store = CredentialStore::default();
        store.insert(CredentialEntry::from_hash(
            "svc-account",
            hash_password("unused"),
            Some("key-123".to_string()),
            vec!["tools:call".to_string()],
        ));
        assert_eq!(
            store.principal_for_api_key("key-123"),
            Some("svc-account".to_string())
        );
        assert_eq!(store.principal_for_api_key("wrong-key"), None);
    }

    #[test]
    fn credential_entry_debug_does_not_leak_secret_material() {
        // SecretString has no `Debug` derive on CredentialEntry itself, so
        // this is enforced at compile time: CredentialEntry intentionally
        // does not derive Debug. Nothing to assert at runtime beyond the
        // store behaving correctly, covered above.
        let mut store = CredentialStore::default();
        store.insert(CredentialEntry::with_password("carol", "hunter2", vec![]));
        assert!(store.verify_password("carol", "hunter2"));
    }
}
