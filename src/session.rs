//! Session handle and session data

use data_encoding::BASE32_NOPAD;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Options;
use crate::error::SessionError;
use crate::securecookie::generate_random_key;

/// Number of random bytes behind a session ID
pub const SESSION_ID_BYTES: usize = 32;

/// Generate a new session ID.
///
/// 32 random bytes in unpadded RFC 4648 base32, which only uses `A-Z` and `2-7`
/// and is safe in cookies and record keys.
pub fn generate_session_id() -> String {
    BASE32_NOPAD.encode(&generate_random_key(SESSION_ID_BYTES))
}

/// Application data stored in a session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionValues {
    data: HashMap<String, Value>,
}

impl SessionValues {
    /// Create an empty value map
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value, deserialized into `T`
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Get the raw JSON value
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Set a value
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), SessionError> {
        let value = serde_json::to_value(value)?;
        self.data.insert(key.to_string(), value);
        Ok(())
    }

    /// Remove a value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Check if a key exists
    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Remove every value
    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }
}

impl From<HashMap<String, Value>> for SessionValues {
    fn from(data: HashMap<String, Value>) -> Self {
        Self { data }
    }
}

struct SessionState {
    id: Option<String>,
    values: SessionValues,
    options: Options,
    is_new: bool,
    expired: bool,
    modified: bool,
}

/// A named session.
///
/// Clones share state, so a clone handed out by the per-request registry
/// observes every change made through any other clone.
pub struct Session {
    name: String,
    state: Arc<RwLock<SessionState>>,
}

impl Session {
    /// Create a fresh session with no ID
    pub fn new<S: Into<String>>(name: S, options: Options) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(RwLock::new(SessionState {
                id: None,
                values: SessionValues::new(),
                options,
                is_new: true,
                expired: false,
                modified: false,
            })),
        }
    }

    /// Name of the session, which is also the cookie name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Session ID, assigned on first save or restored from the cookie
    pub fn id(&self) -> Option<String> {
        self.state.read().id.clone()
    }

    /// Whether the session was created in this request rather than restored
    pub fn is_new(&self) -> bool {
        self.state.read().is_new
    }

    /// Whether the request carried a valid cookie whose record no longer exists
    pub fn is_expired(&self) -> bool {
        self.state.read().expired
    }

    /// Whether values or options changed since the session was loaded or saved
    pub fn is_modified(&self) -> bool {
        self.state.read().modified
    }

    /// Get a value from the session
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.state.read().values.get(key)
    }

    /// Set a value in the session
    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<(), SessionError> {
        let mut state = self.state.write();
        state.values.set(key, value)?;
        state.modified = true;
        Ok(())
    }

    /// Remove a value from the session
    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut state = self.state.write();
        let result = state.values.remove(key);
        if result.is_some() {
            state.modified = true;
        }
        result
    }

    /// Check if a key exists in the session
    pub fn contains(&self, key: &str) -> bool {
        self.state.read().values.contains(key)
    }

    /// Clear all session data
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.values.clear();
        state.modified = true;
    }

    /// Check if the session holds no data
    pub fn is_empty(&self) -> bool {
        self.state.read().values.is_empty()
    }

    /// Get a copy of the session data
    pub fn values(&self) -> SessionValues {
        self.state.read().values.clone()
    }

    /// Get the cookie options of this session
    pub fn options(&self) -> Options {
        self.state.read().options.clone()
    }

    /// Replace the cookie options of this session
    pub fn set_options(&self, options: Options) {
        let mut state = self.state.write();
        state.options = options;
        state.modified = true;
    }

    /// Set the max age of this session's cookie and record.
    ///
    /// A negative value deletes the session on the next save.
    pub fn set_max_age(&self, max_age: i64) {
        let mut state = self.state.write();
        state.options.max_age = max_age;
        state.modified = true;
    }

    /// Mark the session for deletion on the next save
    pub fn destroy(&self) {
        self.set_max_age(-1);
    }

    /// Whether both handles refer to the same session
    pub fn ptr_eq(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    pub(crate) fn restore(&self, id: String, values: SessionValues) {
        let mut state = self.state.write();
        state.id = Some(id);
        state.values = values;
        state.is_new = false;
        state.expired = false;
    }

    pub(crate) fn mark_expired(&self) {
        self.state.write().expired = true;
    }

    /// Return the session ID, generating one if none has been assigned yet
    pub(crate) fn ensure_id(&self) -> String {
        self.state
            .write()
            .id
            .get_or_insert_with(generate_session_id)
            .clone()
    }

    /// Take the values and options to persist and clear the modified flag
    /// under the same lock. Changes made after this point flag the session
    /// again.
    pub(crate) fn begin_save(&self) -> (SessionValues, Options) {
        let mut state = self.state.write();
        state.modified = false;
        (state.values.clone(), state.options.clone())
    }

    /// Flag the session for saving again after a failed save
    pub(crate) fn mark_modified(&self) {
        self.state.write().modified = true;
    }

    /// Drop the ID after the record was deleted
    pub(crate) fn forget_id(&self) {
        self.state.write().id = None;
    }
}

impl Clone for Session {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Session")
            .field("name", &self.name)
            .field("id", &state.id)
            .field("values", &state.values)
            .field("options", &state.options)
            .field("is_new", &state.is_new)
            .field("modified", &state.modified)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_session_ids_are_unique_base32() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_session_id()).collect();
        assert_eq!(ids.len(), 1000);
        for id in &ids {
            assert_eq!(id.len(), 52);
            assert!(id
                .chars()
                .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c)));
            assert!(!id.contains('='));
        }
    }

    #[test]
    fn test_fresh_session() {
        let session = Session::new("sid", Options::default());
        assert_eq!(session.name(), "sid");
        assert!(session.is_new());
        assert!(session.id().is_none());
        assert!(session.is_empty());
        assert!(!session.is_modified());
    }

    #[test]
    fn test_values_and_modified_flag() {
        let session = Session::new("sid", Options::default());
        session.set("user", "alice").unwrap();
        session.set("views", 3).unwrap();
        assert!(session.is_modified());
        assert_eq!(session.get::<String>("user"), Some("alice".to_string()));
        assert_eq!(session.get::<i32>("views"), Some(3));
        assert_eq!(session.get::<i32>("user"), None);

        let (values, _) = session.begin_save();
        assert_eq!(values.len(), 2);
        assert!(session.remove("missing").is_none());
        assert!(!session.is_modified());
        assert!(session.remove("views").is_some());
        assert!(session.is_modified());
    }

    #[test]
    fn test_clones_share_state() {
        let session = Session::new("sid", Options::default());
        let other = session.clone();
        other.set("user", "bob").unwrap();
        assert_eq!(session.get::<String>("user"), Some("bob".to_string()));
        assert!(session.ptr_eq(&other));
        assert!(!session.ptr_eq(&Session::new("sid", Options::default())));
    }

    #[test]
    fn test_id_is_assigned_once() {
        let session = Session::new("sid", Options::default());
        let first = session.ensure_id();
        let second = session.ensure_id();
        assert_eq!(first, second);
        assert_eq!(session.id(), Some(first));
    }

    #[test]
    fn test_destroy_sets_negative_max_age() {
        let session = Session::new("sid", Options::default());
        session.destroy();
        assert!(session.options().is_deletion());
    }

    #[test]
    fn test_change_after_begin_save_stays_modified() {
        let session = Session::new("sid", Options::default());
        session.set("step", 1).unwrap();

        let (values, _) = session.begin_save();
        assert!(!session.is_modified());
        session.clone().set("step", 2).unwrap();
        assert!(session.is_modified());
        assert_eq!(values.get::<i32>("step"), Some(1));

        session.begin_save();
        session.mark_modified();
        assert!(session.is_modified());
    }
}
