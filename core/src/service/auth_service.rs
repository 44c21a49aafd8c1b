use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::model::User;
use crate::storage::{AuthBackend, BackendKind};

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Session {
    pub user: User,
    pub backend: BackendKind,
}

/// Session establishment. Unlike tasks there is no sticky mode: every call
/// tries the remote backend first and falls back on its own.
pub struct AuthService {
    remote: Option<Arc<dyn AuthBackend>>,
    local: Arc<dyn AuthBackend>,
    session: Mutex<Option<Session>>,
}

impl AuthService {
    pub fn new(remote: Option<Arc<dyn AuthBackend>>, local: Arc<dyn AuthBackend>) -> Self {
        Self {
            remote,
            local,
            session: Mutex::new(None),
        }
    }

    pub async fn signup(&self, email: &str, password: &str) -> Result<Session> {
        if let Some(remote) = &self.remote {
            match remote.signup(email, password).await {
                Ok(user) => return Ok(self.establish(user, BackendKind::Remote)),
                Err(err) if err.triggers_fallback() => {
                    warn!(error = %err, "remote signup failed, using local storage");
                }
                Err(err) => return Err(err),
            }
        }
        let user = self.local.signup(email, password).await?;
        Ok(self.establish(user, BackendKind::Local))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        if let Some(remote) = &self.remote {
            match remote.login(email, password).await {
                Ok(user) => return Ok(self.establish(user, BackendKind::Remote)),
                Err(err) if err.triggers_fallback() => {
                    warn!(error = %err, "remote login failed, using local storage");
                }
                Err(err) => return Err(err),
            }
        }
        let user = self.local.login(email, password).await?;
        Ok(self.establish(user, BackendKind::Local))
    }

    /// Signs out of the remote backend when the session came from it; the
    /// local user record and the in-process session are always cleared.
    pub async fn logout(&self) -> Result<()> {
        let was_remote = self
            .session
            .lock()
            .as_ref()
            .map(|s| s.backend == BackendKind::Remote)
            .unwrap_or(false);
        if was_remote {
            if let Some(remote) = &self.remote {
                if let Err(err) = remote.logout().await {
                    warn!(error = %err, "remote logout failed");
                }
            }
        }
        let cleared = self.local.logout().await;
        *self.session.lock() = None;
        cleared
    }

    /// Re-reads the persisted session: remote first, then the local record.
    pub async fn restore_session(&self) -> Result<Option<Session>> {
        if let Some(remote) = &self.remote {
            match remote.current_user().await {
                Ok(Some(user)) => return Ok(Some(self.establish(user, BackendKind::Remote))),
                Ok(None) => {}
                Err(err) => warn!(error = %err, "could not read remote session"),
            }
        }
        match self.local.current_user().await? {
            Some(user) => Ok(Some(self.establish(user, BackendKind::Local))),
            None => {
                *self.session.lock() = None;
                Ok(None)
            }
        }
    }

    pub fn current_session(&self) -> Option<Session> {
        self.session.lock().clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.current_session().map(|s| s.user)
    }

    pub fn is_using_local(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .map(|s| s.backend == BackendKind::Local)
            .unwrap_or(false)
    }

    fn establish(&self, user: User, backend: BackendKind) -> Session {
        info!(uid = %user.uid, %backend, "session established");
        let session = Session { user, backend };
        *self.session.lock() = Some(session.clone());
        session
    }
}
