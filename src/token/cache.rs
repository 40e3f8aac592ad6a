//! Persisted session token cache
//!
//! One entry under one well-known key. The entry records the token's expiry
//! next to it so that an expired token can be treated as absent without
//! decoding the token itself.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{IssuedToken, SessionToken};
use crate::error::Result;
use crate::storage::KeyValueStore;

/// Default storage key for the cached token
pub const DEFAULT_STORAGE_KEY: &str = "wallet_session.token";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedEntry {
    token: SessionToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

pub struct TokenCache {
    store: Arc<dyn KeyValueStore>,
    key: String,
    enforce_expiry: bool,
}

impl TokenCache {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>, enforce_expiry: bool) -> Self {
        Self {
            store,
            key: key.into(),
            enforce_expiry,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Cached token, if present (and unexpired when expiry is enforced)
    pub fn get(&self) -> Result<Option<SessionToken>> {
        self.get_at(Utc::now())
    }

    pub fn get_at(&self, now: DateTime<Utc>) -> Result<Option<SessionToken>> {
        let Some(entry) = self.load()? else {
            return Ok(None);
        };

        if self.enforce_expiry {
            if let Some(expires_at) = entry.expires_at {
                if expires_at <= now {
                    info!("Cached session token expired at {}, discarding", expires_at);
                    self.store.remove(&self.key)?;
                    return Ok(None);
                }
            }
        }

        Ok(Some(entry.token))
    }

    /// Expiry recorded for the cached token, ignoring enforcement
    pub fn expires_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.load()?.and_then(|entry| entry.expires_at))
    }

    pub fn set(&self, issued: &IssuedToken) -> Result<()> {
        let entry = CachedEntry {
            token: issued.token.clone(),
            expires_at: Some(issued.expires_at),
        };
        self.store.set(&self.key, &serde_json::to_string(&entry)?)?;

        debug!("Cached session token under {:?}", self.key);
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.store.remove(&self.key)?;
        info!("Cleared cached session token");
        Ok(())
    }

    fn load(&self) -> Result<Option<CachedEntry>> {
        let Some(raw) = self.store.get(&self.key)? else {
            return Ok(None);
        };

        if raw.trim().is_empty() {
            return Ok(None);
        }

        // Entries written as a bare token string carry no expiry
        match serde_json::from_str::<CachedEntry>(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(_) => {
                warn!("Cached token under {:?} has no expiry metadata", self.key);
                Ok(Some(CachedEntry {
                    token: SessionToken::new(raw),
                    expires_at: None,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn issued(expires_at: DateTime<Utc>) -> IssuedToken {
        IssuedToken {
            token: SessionToken::new("dG9rZW4="),
            expires_at,
        }
    }

    #[test]
    fn test_empty_cache() {
        let cache = TokenCache::new(Arc::new(MemoryStore::new()), DEFAULT_STORAGE_KEY, true);
        assert!(cache.get_at(now()).unwrap().is_none());
    }

    #[test]
    fn test_set_then_get() {
        let store = Arc::new(MemoryStore::new());
        let cache = TokenCache::new(store.clone(), DEFAULT_STORAGE_KEY, true);

        cache.set(&issued(now() + Duration::hours(1))).unwrap();
        assert_eq!(
            cache.get_at(now()).unwrap(),
            Some(SessionToken::new("dG9rZW4="))
        );
        assert_eq!(cache.expires_at().unwrap(), Some(now() + Duration::hours(1)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_expired_entry_is_absent_and_removed() {
        let store = Arc::new(MemoryStore::new());
        let cache = TokenCache::new(store.clone(), DEFAULT_STORAGE_KEY, true);

        cache.set(&issued(now())).unwrap();
        assert!(cache.get_at(now()).unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_expiry_not_enforced() {
        let cache = TokenCache::new(Arc::new(MemoryStore::new()), DEFAULT_STORAGE_KEY, false);

        cache.set(&issued(now() - Duration::days(3))).unwrap();
        assert!(cache.get_at(now()).unwrap().is_some());
    }

    #[test]
    fn test_bare_legacy_token() {
        let store = Arc::new(MemoryStore::new());
        store.set(DEFAULT_STORAGE_KEY, "legacy-token").unwrap();

        let cache = TokenCache::new(store, DEFAULT_STORAGE_KEY, true);
        assert_eq!(
            cache.get_at(now()).unwrap(),
            Some(SessionToken::new("legacy-token"))
        );
        assert!(cache.expires_at().unwrap().is_none());
    }

    #[test]
    fn test_clear() {
        let cache = TokenCache::new(Arc::new(MemoryStore::new()), "custom", true);
        cache.set(&issued(now() + Duration::hours(1))).unwrap();
        cache.clear().unwrap();
        assert!(cache.get_at(now()).unwrap().is_none());
        assert_eq!(cache.key(), "custom");
    }
}
