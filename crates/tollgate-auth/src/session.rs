//! Session store.
//!
//! Holds the current credentials as an immutable snapshot. Writers swap the
//! whole snapshot under a lock, so a reader never observes a half-written
//! session. Persistence goes through a [`SessionStorage`] backend; storage
//! failures are logged and never surface to callers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::StorageError;

/// Default session file name within the tollgate data directory.
pub const SESSION_FILE: &str = "session.json";

// ============================================================================
// Session
// ============================================================================

/// Current credentials. An absent access token means unauthenticated.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_context_id: Option<String>,
    /// Last-known profile payload. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<serde_json::Value>,
}

impl Session {
    /// An all-absent session.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A session holding an access token and optional refresh token.
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token,
            ..Self::default()
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_refresh_token(mut self, token: Option<String>) -> Self {
        self.refresh_token = token;
        self
    }

    pub fn with_brand_context(mut self, brand_id: Option<String>) -> Self {
        self.brand_context_id = brand_id;
        self
    }

    pub fn with_user(mut self, user: Option<serde_json::Value>) -> Self {
        self.user = user;
        self
    }
}

// Tokens stay out of logs.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Session")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("brand_context_id", &self.brand_context_id)
            .field("user", &self.user.is_some())
            .finish()
    }
}

// ============================================================================
// Storage backends
// ============================================================================

/// Key/value capability backing the session store.
pub trait SessionStorage: Send + Sync + std::fmt::Debug {
    /// Load the stored session, if any.
    fn load(&self) -> Result<Option<Session>, StorageError>;

    /// Persist the session, replacing whatever was stored.
    fn save(&self, session: &Session) -> Result<(), StorageError>;

    /// Remove the stored session. Succeeds when nothing is stored.
    fn clear(&self) -> Result<(), StorageError>;
}

/// In-memory storage for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    session: Mutex<Option<Session>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            session: Mutex::new(Some(session)),
        }
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self) -> Result<Option<Session>, StorageError> {
        Ok(self.session.lock().clone())
    }

    fn save(&self, session: &Session) -> Result<(), StorageError> {
        *self.session.lock() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        *self.session.lock() = None;
        Ok(())
    }
}

/// JSON file storage.
///
/// Writes go to a sibling temp file first and are renamed into place.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Store the session as [`SESSION_FILE`] inside `data_dir`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SESSION_FILE),
        }
    }

    /// Store the session at an explicit path.
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl SessionStorage for FileStorage {
    fn load(&self) -> Result<Option<Session>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        let session = serde_json::from_str(&content)
            .map_err(|e| StorageError::Serialization(format!("Failed to parse session: {}", e)))?;
        Ok(Some(session))
    }

    fn save(&self, session: &Session) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let json = serde_json::to_string_pretty(session).map_err(|e| {
            StorageError::Serialization(format!("Failed to serialize session: {}", e))
        })?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

// ============================================================================
// Session consumer boundary
// ============================================================================

/// Callbacks into the layer that consumes session state.
pub trait SessionEvents: Send + Sync {
    /// The authenticated flag flipped.
    fn authenticated_changed(&self, _authenticated: bool) {}

    /// The session ended irrecoverably; route the user to the login view.
    fn redirect_to_login(&self);
}

/// Events sink that ignores everything.
#[derive(Debug, Default)]
pub struct NoopEvents;

impl SessionEvents for NoopEvents {
    fn redirect_to_login(&self) {}
}

// ============================================================================
// SessionStore
// ============================================================================

/// Shared handle to the current session.
pub struct SessionStore {
    current: RwLock<Arc<Session>>,
    storage: Arc<dyn SessionStorage>,
    events: Arc<dyn SessionEvents>,
    authenticated: watch::Sender<bool>,
}

impl SessionStore {
    /// Create a store backed by `storage`, loading any persisted session.
    pub fn new(storage: Arc<dyn SessionStorage>, events: Arc<dyn SessionEvents>) -> Self {
        let initial = match storage.load() {
            Ok(session) => session.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load stored session, starting empty");
                Session::default()
            }
        };

        let (authenticated, _) = watch::channel(initial.is_authenticated());
        Self {
            current: RwLock::new(Arc::new(initial)),
            storage,
            events,
            authenticated,
        }
    }

    /// An in-memory store with no event sink.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), Arc::new(NoopEvents))
    }

    /// Current session snapshot. Never fails; empty when logged out.
    pub fn get(&self) -> Arc<Session> {
        self.current.read().clone()
    }

    /// Replace the session.
    pub fn set(&self, session: Session) {
        self.apply(|_| true, |_| session);
    }

    /// Apply `update` to the session only if the stored refresh token still
    /// equals `expected_refresh`. Returns whether the write happened.
    pub(crate) fn update_if_refresh_matches(
        &self,
        expected_refresh: &str,
        update: impl FnOnce(Session) -> Session,
    ) -> bool {
        self.apply(
            |current| current.refresh_token.as_deref() == Some(expected_refresh),
            update,
        )
    }

    /// Read-modify-write under the write lock, so concurrent updates never
    /// overwrite each other with stale snapshots.
    fn apply(
        &self,
        guard: impl FnOnce(&Session) -> bool,
        update: impl FnOnce(Session) -> Session,
    ) -> bool {
        let authenticated = {
            let mut current = self.current.write();
            if !guard(&**current) {
                return false;
            }
            let updated = update(Session::clone(&current));
            let authenticated = updated.is_authenticated();
            *current = Arc::new(updated);
            if let Err(e) = self.storage.save(&current) {
                tracing::warn!(error = %e, "Failed to persist session");
            }
            authenticated
        };
        self.publish(authenticated);
        true
    }

    /// Drop all credentials. Idempotent.
    pub fn clear(&self) {
        {
            let mut current = self.current.write();
            *current = Arc::new(Session::default());
            if let Err(e) = self.storage.clear() {
                tracing::warn!(error = %e, "Failed to clear stored session");
            }
        }
        self.publish(false);
    }

    /// Store credentials obtained from a successful login.
    ///
    /// Brand context and user record from the previous session are kept.
    pub fn login(&self, access_token: impl Into<String>, refresh_token: Option<String>) {
        let access_token = access_token.into();
        self.apply(
            |_| true,
            |session| {
                session
                    .with_access_token(access_token)
                    .with_refresh_token(refresh_token)
            },
        );
        tracing::info!("Session established");
    }

    /// Set or unset the brand context on the current session.
    pub fn set_brand_context(&self, brand_id: Option<String>) {
        self.apply(|_| true, |session| session.with_brand_context(brand_id));
    }

    /// Set or unset the cached user record.
    pub fn set_user(&self, user: Option<serde_json::Value>) {
        self.apply(|_| true, |session| session.with_user(user));
    }

    /// Clear the session and route the consumer to login.
    pub fn logout(&self) {
        self.clear();
        self.events.redirect_to_login();
        tracing::info!("Session ended");
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.read().is_authenticated()
    }

    /// Observe the authenticated flag.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.authenticated.subscribe()
    }

    fn publish(&self, authenticated: bool) {
        let changed = self.authenticated.send_if_modified(|value| {
            if *value == authenticated {
                false
            } else {
                *value = authenticated;
                true
            }
        });
        if changed {
            self.events.authenticated_changed(authenticated);
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("current", &self.get())
            .field("storage", &self.storage)
            .finish()
    }
}
