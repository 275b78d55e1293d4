//! In-memory deploy sessions

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::deploy::archive::ArchiveUpload;
use crate::deploy::cancel::CancelFlag;
use crate::deploy::fsm::DeployFsm;
use crate::errors::PanelError;
use crate::storage::UserId;

/// One deploy conversation
#[derive(Debug, Clone)]
pub struct DeploySession {
    pub id: String,
    pub user_id: UserId,
    pub owner: String,
    pub repo: String,
    pub archive: Option<Arc<ArchiveUpload>>,
    pub remote_path: Option<String>,
    pub fsm: DeployFsm,
    /// Shared with the job once the pipeline starts
    pub cancel: CancelFlag,
    pub touched_at: DateTime<Utc>,
}

impl DeploySession {
    pub fn new(user_id: UserId, owner: &str, repo: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            owner: owner.to_string(),
            repo: repo.to_string(),
            archive: None,
            remote_path: None,
            fsm: DeployFsm::new(),
            cancel: CancelFlag::new(),
            touched_at: Utc::now(),
        }
    }

    pub fn touch(&mut self) {
        self.touched_at = Utc::now();
    }
}

#[derive(Default)]
struct Sessions {
    by_id: HashMap<String, DeploySession>,
    /// Users whose pipeline is running right now
    executing: HashSet<UserId>,
}

/// Session table shared by all requests
#[derive(Default)]
pub struct SessionStore {
    inner: Arc<RwLock<Sessions>>,
}

/// A user's claim on the pipeline. Dropping it frees the user for the next
/// deploy, however the holder ends.
pub struct ExecutionSlot {
    inner: Arc<RwLock<Sessions>>,
    user: UserId,
}

impl Drop for ExecutionSlot {
    fn drop(&mut self) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.executing.remove(&self.user);
        debug!("Released execution slot of user {}", self.user);
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session, replacing any idle one of the same user.
    ///
    /// Fails with `Busy` while the user's previous deploy is executing.
    pub fn open(&self, session: DeploySession) -> Result<(), PanelError> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if inner.executing.contains(&session.user_id) {
            return Err(busy());
        }
        inner.by_id.retain(|_, s| s.user_id != session.user_id);
        inner.by_id.insert(session.id.clone(), session);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<DeploySession> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.by_id.get(id).cloned()
    }

    /// Write back a modified session.
    ///
    /// Returns `false` when the session was cancelled or expired meanwhile;
    /// it is not brought back.
    pub fn save(&self, session: DeploySession) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        match inner.by_id.get_mut(&session.id) {
            Some(slot) => {
                *slot = session;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, id: &str) -> Option<DeploySession> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.by_id.remove(id)
    }

    /// Claim the user's execution slot
    pub fn begin_execution(&self, user: UserId) -> Result<ExecutionSlot, PanelError> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if !inner.executing.insert(user) {
            return Err(busy());
        }
        Ok(ExecutionSlot {
            inner: self.inner.clone(),
            user,
        })
    }

    pub fn is_executing(&self, user: UserId) -> bool {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.executing.contains(&user)
    }

    /// Drop sessions untouched for longer than `idle_ttl`.
    ///
    /// Sessions whose user holds the execution slot stay. A session left in
    /// `Executing` after its slot was released was abandoned and expires too.
    pub fn expire_idle(&self, now: DateTime<Utc>, idle_ttl: Duration) -> Vec<String> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let Sessions { by_id, executing } = &mut *inner;

        let expired: Vec<String> = by_id
            .values()
            .filter(|s| !executing.contains(&s.user_id))
            .filter(|s| now - s.touched_at > idle_ttl)
            .map(|s| s.id.clone())
            .collect();

        for id in &expired {
            by_id.remove(id);
            debug!("Expired idle deploy session {}", id);
        }
        expired
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn busy() -> PanelError {
    PanelError::Busy("a deploy is already running for this user".to_string())
}
