use std::collections::HashMap;
use std::fmt::{Debug, Formatter};

use crate::Credentials;

/// Unlocked vault state: the held password and the credentials decrypted
/// with it.
///
/// Created on unlock and dropped as a whole. Entries are only ever added;
/// nothing removes a single provider.
pub struct VaultSession {
    password: String,
    generation: u64,
    cache: HashMap<String, Credentials>,
}

impl VaultSession {
    pub(crate) fn new(password: String, generation: u64) -> Self {
        Self {
            password,
            generation,
            cache: HashMap::new(),
        }
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }

    pub const fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cached(&self, provider_id: &str) -> Option<&Credentials> {
        self.cache.get(provider_id)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    pub(crate) fn remember(&mut self, provider_id: String, credentials: Credentials) {
        self.cache.insert(provider_id, credentials);
    }
}

impl Debug for VaultSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSession")
            .field("generation", &self.generation)
            .field("cached_providers", &self.cache.len())
            .finish_non_exhaustive()
    }
}
