//! Per-execution request state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::CacheService;

/// User id used when none is supplied
pub const UNKNOWN_USER_ID: &str = "UNKNOWN";

/// The principal a chain runs for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User id
    pub user_id: String,
    /// Data authorisations
    #[serde(default)]
    pub data_auths: BTreeSet<String>,
}

impl User {
    /// A user without authorisations
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            data_auths: BTreeSet::new(),
        }
    }

    /// Grant a data authorisation
    pub fn with_data_auth(mut self, auth: impl Into<String>) -> Self {
        self.data_auths.insert(auth.into());
        self
    }
}

impl Default for User {
    fn default() -> Self {
        Self::new(UNKNOWN_USER_ID)
    }
}

/// State owned by one chain execution
///
/// A context is created for a single run and dropped when it ends. The
/// export map lives only as long as the context; the optional cache service
/// is shared across runs.
pub struct Context {
    user: User,
    job_id: String,
    created_at: DateTime<Utc>,
    options: HashMap<String, String>,
    exports: HashMap<String, Vec<serde_json::Value>>,
    cache_service: Option<Arc<dyn CacheService>>,
}

impl Context {
    /// A context for a user with a fresh job id
    pub fn new(user: User) -> Self {
        Self {
            user,
            job_id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            options: HashMap::new(),
            exports: HashMap::new(),
            cache_service: None,
        }
    }

    /// Attach a cross-execution cache service
    pub fn with_cache_service(mut self, cache_service: Arc<dyn CacheService>) -> Self {
        self.cache_service = Some(cache_service);
        self
    }

    /// Use a specific job id
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = job_id.into();
        self
    }

    /// Set an option
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// The requesting user
    pub fn user(&self) -> &User {
        &self.user
    }

    /// Job id used for tracing
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Creation time
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// An option value
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// The cross-execution cache service
    pub fn cache_service(&self) -> Option<&Arc<dyn CacheService>> {
        self.cache_service.as_ref()
    }

    /// Append items to an export of this run
    pub fn export(&mut self, key: impl Into<String>, items: Vec<serde_json::Value>) {
        self.exports.entry(key.into()).or_default().extend(items);
    }

    /// An export of this run
    pub fn exported(&self, key: &str) -> Option<&[serde_json::Value]> {
        self.exports.get(key).map(Vec::as_slice)
    }

    /// Every export of this run
    pub fn exports(&self) -> &HashMap<String, Vec<serde_json::Value>> {
        &self.exports
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(User::default())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("user", &self.user)
            .field("job_id", &self.job_id)
            .field("created_at", &self.created_at)
            .field("exports", &self.exports.keys().collect::<Vec<_>>())
            .field("cache_service", &self.cache_service.is_some())
            .finish()
    }
}
