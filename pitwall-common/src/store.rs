//! Credential store
//!
//! Durable client-side persistence for the session. Holds at most one
//! canonical credential and one cached profile snapshot, always read and
//! written together as a single [`StoredSession`] document. There are no
//! per-key accessors: callers load the whole document, replace it, or
//! clear it.
//!
//! # File layout
//!
//! [`FileCredentialStore`] keeps the document as JSON at a single path.
//! Writes go to `<path>.tmp` first and are renamed over the target, so a
//! reader never sees a half-written document. On Unix the file is created
//! with mode 0600.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::{Error, Result};

// ========================================
// Persisted schema
// ========================================

/// Opaque bearer token
///
/// `Debug` never prints the token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token for the authorization header
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Cached copy of the actor's profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    #[serde(default)]
    pub id: Option<String>,
    pub email: String,
    #[serde(default)]
    pub display_name: String,
}

/// The single persisted session document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    #[serde(default)]
    pub credential: Option<Credential>,
    #[serde(default)]
    pub profile: Option<ProfileSnapshot>,
}

impl StoredSession {
    pub fn new(credential: Option<Credential>, profile: Option<ProfileSnapshot>) -> Self {
        Self {
            credential: credential.filter(|c| !c.is_blank()),
            profile,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.credential.is_none() && self.profile.is_none()
    }
}

// ========================================
// Store trait
// ========================================

/// Persistence seam for the session document
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read the whole document. A missing document is an empty session.
    async fn load(&self) -> Result<StoredSession>;

    /// Replace the whole document
    async fn save(&self, session: &StoredSession) -> Result<()>;

    /// Remove credential and profile in one operation
    async fn clear(&self) -> Result<()>;
}

// ========================================
// File-backed store
// ========================================

/// JSON document on disk
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "session".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<StoredSession> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No stored session");
                return Ok(StoredSession::default());
            }
            Err(e) => return Err(Error::Io(e)),
        };

        match serde_json::from_slice::<StoredSession>(&bytes) {
            Ok(session) => Ok(StoredSession::new(session.credential, session.profile)),
            Err(e) => {
                // Unreadable document carries no usable identity
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Stored session is corrupt, treating as signed out"
                );
                Ok(StoredSession::default())
            }
        }
    }

    async fn save(&self, session: &StoredSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_vec_pretty(session)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, &json).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&temp, std::fs::Permissions::from_mode(0o600)).await?;
        }

        tokio::fs::rename(&temp, &self.path).await.map_err(|e| {
            Error::Store(format!(
                "Failed to move {} into place: {}",
                temp.display(),
                e
            ))
        })?;

        debug!(
            path = %self.path.display(),
            has_credential = session.credential.is_some(),
            has_profile = session.profile.is_some(),
            "Stored session written"
        );
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "Stored session cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

// ========================================
// In-memory store
// ========================================

/// Process-local store, for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    session: Mutex<StoredSession>,
}

impl MemoryCredentialStore {
    pub fn new(session: StoredSession) -> Self {
        Self {
            session: Mutex::new(session),
        }
    }

    fn with_session<T>(&self, f: impl FnOnce(&mut StoredSession) -> T) -> Result<T> {
        let mut guard = self
            .session
            .lock()
            .map_err(|_| Error::Store("Memory store lock poisoned".to_string()))?;
        Ok(f(&mut guard))
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<StoredSession> {
        self.with_session(|s| s.clone())
    }

    async fn save(&self, session: &StoredSession) -> Result<()> {
        self.with_session(|s| *s = session.clone())
    }

    async fn clear(&self) -> Result<()> {
        self.with_session(|s| *s = StoredSession::default())
    }
}
