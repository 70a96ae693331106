//! JSON-file backed session store.
//!
//! The backing file maps session id to an ordered array of
//! `{ "role", "content" }` records. Every mutation rewrites the whole file
//! through a temp file in the same directory followed by an atomic rename.
//! A missing or corrupt file on open degrades to an empty store.
//!
//! There is no cross-process locking; one process is assumed to own the file.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::models::session::{compose_prompt, new_session_id, Role, Turn};
use crate::{AppError, Result};

type SessionMap = BTreeMap<String, Vec<Turn>>;

/// Owner of every session's ordered turn history.
#[derive(Debug)]
pub struct SessionStore {
    path: Option<PathBuf>,
    sessions: Mutex<SessionMap>,
}

impl SessionStore {
    /// Open the store backed by `path`, loading whatever it holds.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let sessions = load(&path);
        info!(path = %path.display(), sessions = sessions.len(), "session store opened");
        Self {
            path: Some(path),
            sessions: Mutex::new(sessions),
        }
    }

    /// Store without a backing file; contents live for the process only.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            sessions: Mutex::new(SessionMap::new()),
        }
    }

    /// Backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Create an empty session under a fresh random identifier.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Session` if the backing file cannot be rewritten;
    /// the session still exists in memory.
    pub fn new_session(&self) -> Result<String> {
        let id = new_session_id();
        let mut sessions = self.lock();
        sessions.insert(id.clone(), Vec::new());
        debug!(session_id = %id, "session created");
        self.save(&sessions)?;
        Ok(id)
    }

    /// Append a turn to `session_id`, creating the session if unknown.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Session` if the backing file cannot be rewritten;
    /// the turn is still recorded in memory.
    pub fn append(&self, session_id: &str, role: Role, content: &str) -> Result<()> {
        let mut sessions = self.lock();
        sessions
            .entry(session_id.to_owned())
            .or_default()
            .push(Turn::new(role, content));
        self.save(&sessions)
    }

    /// Ordered turns of `session_id`; empty for an unknown id.
    #[must_use]
    pub fn get(&self, session_id: &str) -> Vec<Turn> {
        self.lock().get(session_id).cloned().unwrap_or_default()
    }

    /// Whether `session_id` is known.
    #[must_use]
    pub fn contains(&self, session_id: &str) -> bool {
        self.lock().contains_key(session_id)
    }

    /// Identifiers of every known session, sorted.
    #[must_use]
    pub fn session_ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Cumulative prompt for sending `message` within `session_id`.
    #[must_use]
    pub fn compose_prompt(&self, session_id: &str, message: &str) -> String {
        compose_prompt(&self.get(session_id), message)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionMap> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn save(&self, sessions: &SessionMap) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(sessions)
            .map_err(|err| AppError::Session(format!("failed to serialize sessions: {err}")))?;

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|err| {
            AppError::Session(format!(
                "failed to create session directory {}: {err}",
                parent.display()
            ))
        })?;

        let mut tmp = NamedTempFile::new_in(&parent)
            .map_err(|err| AppError::Session(format!("failed to create temporary file: {err}")))?;
        tmp.write_all(json.as_bytes())
            .map_err(|err| AppError::Session(format!("failed to write temporary file: {err}")))?;
        tmp.persist(path).map_err(|err| {
            AppError::Session(format!(
                "failed to persist sessions to {}: {err}",
                path.display()
            ))
        })?;
        Ok(())
    }
}

fn load(path: &Path) -> SessionMap {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return SessionMap::new(),
        Err(err) => {
            warn!(path = %path.display(), %err, "failed to read session store, starting empty");
            return SessionMap::new();
        }
    };
    if raw.trim().is_empty() {
        return SessionMap::new();
    }
    match serde_json::from_str(&raw) {
        Ok(sessions) => sessions,
        Err(err) => {
            warn!(path = %path.display(), %err, "corrupt session store, starting empty");
            SessionMap::new()
        }
    }
}
