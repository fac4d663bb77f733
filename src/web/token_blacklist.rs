//! Revoked bearer tokens, kept until they would have expired anyway.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone, Default)]
pub struct TokenBlacklist {
    inner: Arc<Mutex<HashMap<String, usize>>>,
}

impl TokenBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, usize>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Revoke `token`, which expires at `exp` (seconds since the epoch).
    pub fn insert(&self, token: String, exp: usize) {
        let now = chrono::Utc::now().timestamp().max(0) as usize;
        let mut revoked = self.lock();
        revoked.retain(|_, expires| *expires > now);
        revoked.insert(token, exp);
    }

    pub fn contains(&self, token: &str) -> bool {
        self.lock().contains_key(token)
    }
}
