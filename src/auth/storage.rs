//! Session snapshot persistence.
//!
//! The session manager keeps the live session in memory; this module holds the
//! serialized copy that survives restarts. Storage is a small key/value
//! capability so the manager never touches the filesystem directly: the real
//! implementation keeps a JSON map in the platform cache directory, and a
//! no-op implementation stands in where no persistent storage is available.
//! Malformed or partial snapshots always degrade to "no session"; nothing in
//! this module returns an error to the caller.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// Storage file name inside the store directory
const STORE_FILE: &str = "auth.json";

// Keys for the persisted session fields
pub const TOKEN_KEY: &str = "token";
pub const EXPIRATION_KEY: &str = "expiration";
pub const USER_ID_KEY: &str = "userId";

/// Minimal key/value storage capability over string keys.
///
/// Implementations are synchronous and infallible from the caller's
/// perspective; failures are logged and swallowed so a broken store behaves
/// like an empty one.
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: &str);
    fn remove_item(&self, key: &str);
}

/// JSON-file-backed store under a directory (typically the platform cache dir).
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            path: dir.join(STORE_FILE),
        }
    }

    fn read_map(&self) -> BTreeMap<String, String> {
        if !self.path.exists() {
            return BTreeMap::new();
        }
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(map) => map,
                Err(e) => {
                    debug!(error = %e, "Auth store file is not valid JSON, treating as empty");
                    BTreeMap::new()
                }
            },
            Err(e) => {
                debug!(error = %e, "Failed to read auth store file");
                BTreeMap::new()
            }
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!(error = %e, "Failed to create auth store directory");
                return;
            }
        }
        match serde_json::to_string_pretty(map) {
            Ok(contents) => {
                if let Err(e) = std::fs::write(&self.path, contents) {
                    warn!(error = %e, "Failed to write auth store file");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize auth store"),
        }
    }
}

impl KeyValueStore for FileStore {
    fn get_item(&self, key: &str) -> Option<String> {
        self.read_map().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) {
        let mut map = self.read_map();
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map);
    }

    fn remove_item(&self, key: &str) {
        let mut map = self.read_map();
        if map.remove(key).is_some() {
            self.write_map(&map);
        }
    }
}

/// Store for contexts without persistent storage: reads are always absent,
/// writes are discarded.
pub struct NoopStore;

impl KeyValueStore for NoopStore {
    fn get_item(&self, _key: &str) -> Option<String> {
        None
    }

    fn set_item(&self, _key: &str, _value: &str) {}

    fn remove_item(&self, _key: &str) {}
}

/// A session snapshot read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user_id: Option<String>,
}

/// Write the three session fields. The expiration is stored as an RFC 3339
/// timestamp string.
pub fn save_session(
    store: &dyn KeyValueStore,
    token: &str,
    expires_at: DateTime<Utc>,
    user_id: Option<&str>,
) {
    store.set_item(TOKEN_KEY, token);
    store.set_item(EXPIRATION_KEY, &expires_at.to_rfc3339());
    match user_id {
        Some(id) => store.set_item(USER_ID_KEY, id),
        None => store.remove_item(USER_ID_KEY),
    }
}

/// Remove all persisted session fields.
pub fn clear_session(store: &dyn KeyValueStore) {
    store.remove_item(TOKEN_KEY);
    store.remove_item(EXPIRATION_KEY);
    store.remove_item(USER_ID_KEY);
}

/// Load the persisted snapshot. Absent token or expiration, an empty token,
/// or an unparsable expiration all yield `None`.
pub fn load_session(store: &dyn KeyValueStore) -> Option<PersistedSession> {
    let token = store.get_item(TOKEN_KEY)?;
    if token.is_empty() {
        return None;
    }

    let raw_expiration = store.get_item(EXPIRATION_KEY)?;
    let expires_at = match DateTime::parse_from_rfc3339(&raw_expiration) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(e) => {
            debug!(error = %e, "Stored expiration is not a valid timestamp, discarding session");
            return None;
        }
    };

    let user_id = store.get_item(USER_ID_KEY).filter(|id| !id.is_empty());

    Some(PersistedSession {
        token,
        expires_at,
        user_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().to_path_buf());

        let expires = Utc::now() + Duration::hours(1);
        save_session(&store, "tok-123", expires, Some("u-1"));

        let loaded = load_session(&store).expect("session present");
        assert_eq!(loaded.token, "tok-123");
        assert_eq!(loaded.user_id.as_deref(), Some("u-1"));
        // RFC 3339 round trip preserves the instant
        assert_eq!(loaded.expires_at.timestamp(), expires.timestamp());

        clear_session(&store);
        assert!(load_session(&store).is_none());
    }

    #[test]
    fn test_load_missing_expiration_is_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().to_path_buf());

        store.set_item(TOKEN_KEY, "tok-123");
        assert!(load_session(&store).is_none());
    }

    #[test]
    fn test_load_unparsable_expiration_is_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().to_path_buf());

        store.set_item(TOKEN_KEY, "tok-123");
        store.set_item(EXPIRATION_KEY, "next tuesday");
        assert!(load_session(&store).is_none());
    }

    #[test]
    fn test_load_empty_token_is_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().to_path_buf());

        store.set_item(TOKEN_KEY, "");
        store.set_item(EXPIRATION_KEY, &Utc::now().to_rfc3339());
        assert!(load_session(&store).is_none());
    }

    #[test]
    fn test_load_without_user_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileStore::new(dir.path().to_path_buf());

        save_session(&store, "tok-123", Utc::now() + Duration::hours(1), None);
        let loaded = load_session(&store).expect("session present");
        assert!(loaded.user_id.is_none());
    }

    #[test]
    fn test_corrupt_store_file_reads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(STORE_FILE), "{ not json").expect("write");

        let store = FileStore::new(dir.path().to_path_buf());
        assert!(store.get_item(TOKEN_KEY).is_none());
        assert!(load_session(&store).is_none());

        // Writes still work after a corrupt read
        store.set_item(TOKEN_KEY, "tok");
        assert_eq!(store.get_item(TOKEN_KEY).as_deref(), Some("tok"));
    }

    #[test]
    fn test_noop_store_is_always_absent() {
        let store = NoopStore;
        save_session(&store, "tok-123", Utc::now() + Duration::hours(1), Some("u-1"));
        assert!(load_session(&store).is_none());
    }
}
