//! # Credentials Storage
//!
//! Access tokens per role, persisted as JSON in the platform config
//! directory, plus an in-memory provider for embedding and tests.

use jobsync_realtime::TokenProvider;
use jobsync_types::{Role, SessionIdentity};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors reading or writing the credentials file.
#[derive(Debug, Error)]
pub enum CredentialsError {
    /// The platform has no config directory.
    #[error("could not determine config directory")]
    NoConfigDir,

    /// Reading or writing the file failed.
    #[error("credentials file {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid credentials JSON.
    #[error("invalid credentials file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A signed-in session for one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    /// Backend user id.
    pub subject_id: String,
    /// Bearer token for REST and WebSocket calls.
    pub access_token: String,
}

/// On-disk layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    /// Session per role.
    #[serde(default)]
    pub sessions: BTreeMap<Role, StoredSession>,
}

/// Token provider backed by a JSON file.
///
/// The file is read on [`FileTokenProvider::open`] and
/// [`FileTokenProvider::reload`]; lookups use the cached copy.
#[derive(Debug)]
pub struct FileTokenProvider {
    path: PathBuf,
    cache: RwLock<StoredCredentials>,
}

impl FileTokenProvider {
    /// Default location: `<config dir>/jobsync/credentials.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("jobsync").join("credentials.json"))
    }

    /// Open the file at the default location.
    pub fn open_default() -> Result<Self, CredentialsError> {
        let path = Self::default_path().ok_or(CredentialsError::NoConfigDir)?;
        Self::open(path)
    }

    /// Open `path`. A missing file means no sessions.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CredentialsError> {
        let path = path.into();
        let stored = read(&path)?;
        tracing::debug!(?path, sessions = stored.sessions.len(), "Loaded credentials");
        Ok(Self {
            path,
            cache: RwLock::new(stored),
        })
    }

    /// File backing this provider.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file.
    pub fn reload(&self) -> Result<(), CredentialsError> {
        *self.cache.write() = read(&self.path)?;
        Ok(())
    }

    /// Session stored for `role`.
    pub fn session(&self, role: Role) -> Option<StoredSession> {
        self.cache.read().sessions.get(&role).cloned()
    }

    /// Identity stored for `role`.
    pub fn identity(&self, role: Role) -> Option<SessionIdentity> {
        self.session(role)
            .map(|session| SessionIdentity::new(session.subject_id, role))
    }

    /// Store a session for `role` and write the file.
    pub fn store(&self, role: Role, session: StoredSession) -> Result<(), CredentialsError> {
        let snapshot = {
            let mut cache = self.cache.write();
            cache.sessions.insert(role, session);
            cache.clone()
        };
        write(&self.path, &snapshot)
    }

    /// Forget the session for `role` and write the file.
    pub fn remove(&self, role: Role) -> Result<bool, CredentialsError> {
        let (removed, snapshot) = {
            let mut cache = self.cache.write();
            let removed = cache.sessions.remove(&role).is_some();
            (removed, cache.clone())
        };
        if removed {
            write(&self.path, &snapshot)?;
        }
        Ok(removed)
    }
}

impl TokenProvider for FileTokenProvider {
    fn access_token(&self, role: Role) -> Option<String> {
        self.cache
            .read()
            .sessions
            .get(&role)
            .map(|session| session.access_token.clone())
    }
}

fn read(path: &Path) -> Result<StoredCredentials, CredentialsError> {
    if !path.exists() {
        tracing::debug!(?path, "Credentials file not found");
        return Ok(StoredCredentials::default());
    }
    let contents = fs::read_to_string(path).map_err(|source| CredentialsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&contents)?)
}

fn write(path: &Path, stored: &StoredCredentials) -> Result<(), CredentialsError> {
    let io = |source| CredentialsError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io)?;
    }
    let contents = serde_json::to_string_pretty(stored)?;
    fs::write(path, contents).map_err(io)?;
    tracing::info!(?path, "Saved credentials");
    Ok(())
}

/// In-memory token provider.
#[derive(Debug, Default)]
pub struct StaticTokenProvider {
    tokens: RwLock<HashMap<Role, String>>,
}

impl StaticTokenProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`StaticTokenProvider::set`].
    pub fn with(self, role: Role, token: impl Into<String>) -> Self {
        self.set(role, token);
        self
    }

    /// Set the token for `role`.
    pub fn set(&self, role: Role, token: impl Into<String>) {
        self.tokens.write().insert(role, token.into());
    }

    /// Drop the token for `role`.
    pub fn clear(&self, role: Role) {
        self.tokens.write().remove(&role);
    }
}

impl TokenProvider for StaticTokenProvider {
    fn access_token(&self, role: Role) -> Option<String> {
        self.tokens.read().get(&role).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(subject_id: &str, token: &str) -> StoredSession {
        StoredSession {
            subject_id: subject_id.to_string(),
            access_token: token.to_string(),
        }
    }

    #[test]
    fn test_missing_file_has_no_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileTokenProvider::open(dir.path().join("credentials.json")).unwrap();

        assert_eq!(provider.access_token(Role::JobSeeker), None);
        assert_eq!(provider.identity(Role::Employer), None);
    }

    #[test]
    fn test_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials.json");

        let provider = FileTokenProvider::open(&path).unwrap();
        provider.store(Role::Employer, session("12", "emp-token")).unwrap();

        let reopened = FileTokenProvider::open(&path).unwrap();
        assert_eq!(reopened.access_token(Role::Employer).as_deref(), Some("emp-token"));
        assert_eq!(
            reopened.identity(Role::Employer),
            Some(SessionIdentity::new("12", Role::Employer))
        );
        assert_eq!(reopened.access_token(Role::JobSeeker), None);
    }

    #[test]
    fn test_file_format_uses_role_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        fs::write(
            &path,
            r#"{"sessions": {"JOB_SEEKER": {"subject_id": "3", "access_token": "js"}}}"#,
        )
        .unwrap();

        let provider = FileTokenProvider::open(&path).unwrap();
        assert_eq!(provider.access_token(Role::JobSeeker).as_deref(), Some("js"));
    }

    #[test]
    fn test_remove_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let provider = FileTokenProvider::open(&path).unwrap();
        provider.store(Role::JobSeeker, session("3", "js")).unwrap();

        let other = FileTokenProvider::open(&path).unwrap();
        assert!(other.remove(Role::JobSeeker).unwrap());
        assert!(!other.remove(Role::JobSeeker).unwrap());

        assert!(provider.access_token(Role::JobSeeker).is_some());
        provider.reload().unwrap();
        assert!(provider.access_token(Role::JobSeeker).is_none());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            FileTokenProvider::open(&path),
            Err(CredentialsError::Parse(_))
        ));
    }

    #[test]
    fn test_static_provider() {
        let provider = StaticTokenProvider::new().with(Role::Employer, "t");
        assert_eq!(provider.access_token(Role::Employer).as_deref(), Some("t"));

        provider.clear(Role::Employer);
        assert_eq!(provider.access_token(Role::Employer), None);
    }
}
