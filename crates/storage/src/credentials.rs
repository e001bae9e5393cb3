//! In-memory credential store.

use conflux_handler::Credentials;
use dashmap::DashMap;

/// Decrypted credential values held in a process-local map.
///
/// Real deployments put an encrypting backend behind the
/// [`Credentials`] port; this store exists for tests and the CLI, where
/// values arrive already in the clear.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    // id -> (name, value)
    by_id: DashMap<String, (String, String)>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a credential under a generated id; returns the id.
    pub fn add(&self, name: impl Into<String>, value: impl Into<String>) -> String {
        let id = conflux_core::id::prefixed("cred");
        self.by_id.insert(id.clone(), (name.into(), value.into()));
        id
    }

    /// Store a credential under a caller-chosen id.
    pub fn insert(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.by_id.insert(id.into(), (name.into(), value.into()));
    }

    /// Remove a credential by id. Returns `true` if one was removed.
    pub fn remove(&self, id: &str) -> bool {
        self.by_id.remove(id).is_some()
    }
}

impl Credentials for MemoryCredentialStore {
    fn decrypted_by_id(&self, id: &str) -> Option<String> {
        self.by_id.get(id).map(|entry| entry.1.clone())
    }

    fn decrypted_by_name(&self, name: &str) -> Option<String> {
        self.by_id
            .iter()
            .find(|entry| entry.0 == name)
            .map(|entry| entry.1.clone())
    }
}
