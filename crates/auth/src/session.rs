//! Session state and its persistent store.
//!
//! A `Session` is either anonymous or carries both a user and a token; the
//! type makes the half-populated state unrepresentable. The `SessionStore`
//! keeps the current session in memory, mirrors it to a `SessionStorage`
//! backend and publishes changes to subscribers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use crate::claims::{decode_unverified, validate_claims};
use crate::storage::{SessionStorage, StorageError};
use crate::{Role, User};

/// Storage key the session blob lives under.
pub const SESSION_KEY: &str = "hivegate.session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: User,
    pub token: String,
}

/// Current authentication state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Session {
    credentials: Option<Credentials>,
}

/// On-disk shape: `{ "user": User | null, "token": string | null }`.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedSession {
    user: Option<User>,
    token: Option<String>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self { credentials: None }
    }

    pub fn authenticated(user: User, token: impl Into<String>) -> Self {
        Self {
            credentials: Some(Credentials {
                user,
                token: token.into(),
            }),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn user(&self) -> Option<&User> {
        self.credentials.as_ref().map(|c| &c.user)
    }

    pub fn token(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.token.as_str())
    }

    pub fn role(&self) -> Option<Role> {
        self.user().map(|u| u.role)
    }

    fn to_blob(&self) -> Result<String, SessionError> {
        let persisted = PersistedSession {
            user: self.user().cloned(),
            token: self.token().map(str::to_string),
        };
        serde_json::to_string(&persisted).map_err(|e| SessionError::Encode(e.to_string()))
    }

    /// Parse a persisted blob. `None` means the blob is not a valid session.
    fn from_blob(blob: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(blob).ok()?;
        let object = value.as_object()?;
        if object.len() != 2 || !object.contains_key("user") || !object.contains_key("token") {
            return None;
        }

        let persisted: PersistedSession = serde_json::from_value(value).ok()?;
        match (persisted.user, persisted.token) {
            (Some(user), Some(token)) if !token.is_empty() => Some(Self::authenticated(user, token)),
            (None, None) => Some(Self::anonymous()),
            _ => None,
        }
    }
}

/// Anything that can hand out the bearer token to use right now.
pub trait TokenSource: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

impl TokenSource for Session {
    fn bearer_token(&self) -> Option<String> {
        self.token().map(str::to_string)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("refusing to sign in with an empty token")]
    EmptyToken,

    #[error("failed to encode session: {0}")]
    Encode(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Holds the current session and keeps it in sync with durable storage.
pub struct SessionStore {
    storage: Arc<dyn SessionStorage>,
    key: String,
    state: watch::Sender<Session>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn SessionStorage>) -> Self {
        Self::with_key(storage, SESSION_KEY)
    }

    pub fn with_key(storage: Arc<dyn SessionStorage>, key: impl Into<String>) -> Self {
        let (state, _) = watch::channel(Session::anonymous());
        Self {
            storage,
            key: key.into(),
            state,
        }
    }

    /// Restore the persisted session. Never fails: anything unreadable
    /// degrades to an anonymous session.
    pub fn initialize(&self) -> Session {
        self.initialize_at(Utc::now())
    }

    pub fn initialize_at(&self, now: DateTime<Utc>) -> Session {
        let blob = match self.storage.load(&self.key) {
            Ok(blob) => blob,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read persisted session; starting signed out");
                None
            }
        };

        let mut session = match blob {
            None => Session::anonymous(),
            Some(blob) => match Session::from_blob(&blob) {
                Some(session) => session,
                None => {
                    tracing::warn!("discarding corrupt persisted session");
                    self.discard_blob();
                    Session::anonymous()
                }
            },
        };

        if let Some(token) = session.token() {
            // Opaque tokens carry no claims; only JWTs can be checked here.
            if let Ok(claims) = decode_unverified(token) {
                if validate_claims(&claims, now).is_err() {
                    tracing::info!(user_id = %claims.user_id, "persisted session token expired");
                    self.discard_blob();
                    session = Session::anonymous();
                }
            }
        }

        if let Some(user) = session.user() {
            tracing::debug!(user_id = %user.id, role = %user.role, "restored session");
        }

        self.state.send_replace(session.clone());
        session
    }

    /// Sign in. The session is persisted before subscribers see it.
    pub fn login(&self, user: User, token: impl Into<String>) -> Result<(), SessionError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(SessionError::EmptyToken);
        }

        let session = Session::authenticated(user, token);
        self.storage.save(&self.key, &session.to_blob()?)?;

        if let Some(user) = session.user() {
            tracing::info!(user_id = %user.id, role = %user.role, "signed in");
        }
        self.state.send_replace(session);
        Ok(())
    }

    /// Sign out. Memory is cleared first, so the store never reports stale
    /// credentials even when storage misbehaves.
    pub fn logout(&self) -> Result<(), SessionError> {
        let previous = self.state.send_replace(Session::anonymous());
        if let Some(user) = previous.user() {
            tracing::info!(user_id = %user.id, "signed out");
        }

        match self.storage.remove(&self.key) {
            Ok(()) => Ok(()),
            Err(remove_err) => {
                tracing::warn!(error = %remove_err, "failed to remove session blob; overwriting instead");
                let blob = Session::anonymous().to_blob()?;
                self.storage.save(&self.key, &blob)?;
                Ok(())
            }
        }
    }

    /// Replace the cached profile of the signed-in user.
    ///
    /// Returns `false` (and changes nothing) when signed out or when `user`
    /// is somebody else.
    pub fn refresh_user(&self, user: User) -> Result<bool, SessionError> {
        let current = self.current();
        let Some(credentials) = current.credentials() else {
            return Ok(false);
        };
        if credentials.user.id != user.id {
            return Ok(false);
        }

        let session = Session::authenticated(user, credentials.token.clone());
        self.storage.save(&self.key, &session.to_blob()?)?;
        self.state.send_replace(session);
        Ok(true)
    }

    pub fn current(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }
}

impl TokenSource for SessionStore {
    fn bearer_token(&self) -> Option<String> {
        self.state.borrow().token().map(str::to_string)
    }
}

impl SessionStore {
    fn discard_blob(&self) {
        if let Err(err) = self.storage.remove(&self.key) {
            tracing::warn!(error = %err, "failed to discard session blob");
        }
    }
}
