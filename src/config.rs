//! Store and cookie configuration

use std::time::Duration;

/// Default cookie max age: 30 days
pub const DEFAULT_MAX_AGE: i64 = 86400 * 30;

/// Cookie attributes applied to a session cookie.
///
/// `max_age` follows the usual cookie convention:
/// - `> 0`: the cookie (and the stored record) expire after that many seconds
/// - `0`: no `Max-Age` attribute, the cookie lasts for the browser session
/// - `< 0`: the session is deleted on save and the cookie is expired
#[derive(Clone, Debug, PartialEq)]
pub struct Options {
    /// Cookie path (default: "/")
    pub path: String,

    /// Cookie domain (default: None - current domain only)
    pub domain: Option<String>,

    /// Max age in seconds (default: 30 days)
    pub max_age: i64,

    /// Secure flag for cookie (default: false)
    pub secure: bool,

    /// HttpOnly flag for cookie (default: true)
    pub http_only: bool,

    /// SameSite attribute for cookie (default: Lax)
    pub same_site: SameSite,
}

/// SameSite cookie attribute
#[derive(Clone, Debug, PartialEq)]
pub enum SameSite {
    /// Strict - cookie only sent for same-site requests
    Strict,
    /// Lax - cookie sent for same-site requests and top-level navigations
    Lax,
    /// None - cookie sent for all requests (requires Secure)
    None,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: None,
            max_age: DEFAULT_MAX_AGE,
            secure: false,
            http_only: true,
            same_site: SameSite::Lax,
        }
    }
}

impl Options {
    /// Set the cookie path (default: "/")
    pub fn with_path<S: Into<String>>(mut self, path: S) -> Self {
        self.path = path.into();
        self
    }

    /// Set the cookie domain
    pub fn with_domain<S: Into<String>>(mut self, domain: S) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Set max age in seconds
    pub fn with_max_age(mut self, max_age: i64) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set max age from Duration
    pub fn with_max_age_duration(mut self, duration: Duration) -> Self {
        self.max_age = i64::try_from(duration.as_secs()).unwrap_or(i64::MAX);
        self
    }

    /// Set the Secure flag (default: false)
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the HttpOnly flag (default: true)
    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Set the SameSite attribute (default: Lax)
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    /// TTL to apply to the stored record, if any
    pub fn record_ttl(&self) -> Option<u64> {
        u64::try_from(self.max_age).ok().filter(|secs| *secs > 0)
    }

    /// Whether saving with these options deletes the session
    pub fn is_deletion(&self) -> bool {
        self.max_age < 0
    }
}

/// Configuration for a [`SessionStore`](crate::SessionStore)
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Backend namespace (similar to a database)
    pub namespace: String,

    /// Backend collection (similar to a table)
    pub collection: String,

    /// Prefix prepended to the session ID to form the record key (default: "session_")
    pub key_prefix: String,

    /// Name of the record field holding the payload (default: "data")
    pub bin_name: String,

    /// Default cookie options copied onto every new session
    pub options: Options,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            namespace: "app".to_string(),
            collection: "sessions".to_string(),
            key_prefix: "session_".to_string(),
            bin_name: "data".to_string(),
            options: Options::default(),
        }
    }
}

impl StoreConfig {
    /// Create a configuration for the given namespace and collection
    pub fn new<N: Into<String>, C: Into<String>>(namespace: N, collection: C) -> Self {
        Self {
            namespace: namespace.into(),
            collection: collection.into(),
            ..Default::default()
        }
    }

    /// Set the record key prefix (default: "session_")
    pub fn with_key_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the payload field name (default: "data")
    pub fn with_bin_name<S: Into<String>>(mut self, bin: S) -> Self {
        self.bin_name = bin.into();
        self
    }

    /// Set the default cookie options
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Record key for a session ID
    pub fn record_key(&self, session_id: &str) -> String {
        format!("{}{}", self.key_prefix, session_id)
    }
}
