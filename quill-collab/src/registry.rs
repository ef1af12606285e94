//! Fixed-capacity session table and broadcast fan-out.
//!
//! A slot holds the admitted user, their role, and the outbound channel
//! of their connection's writer task. Broadcast renders the delta once
//! and pushes the same `Arc<str>` to every active slot, so all sessions
//! receive byte-identical bytes. A slot whose channel is full or closed
//! is skipped with a log line; one slow client never stalls the rest.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::roles::{Role, RoleStore};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AdmitError {
    #[error("user is not listed in the role store")]
    Unauthorised,
    #[error("no free session slot")]
    Full,
}

/// One admitted session.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub user: String,
    pub role: Role,
    outbound: mpsc::Sender<Arc<str>>,
}

pub struct SessionRegistry {
    slots: RwLock<Vec<Option<Session>>>,
}

impl SessionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: RwLock::new(vec![None; capacity]),
        }
    }

    /// Authenticates against the role store and takes the first free
    /// slot. Returns the slot index and the resolved role.
    pub async fn admit(
        &self,
        roles: &RoleStore,
        user: &str,
        outbound: mpsc::Sender<Arc<str>>,
    ) -> Result<(usize, Role), AdmitError> {
        let role = roles.lookup(user).ok_or(AdmitError::Unauthorised)?;
        let mut slots = self.slots.write().await;
        let slot = slots
            .iter()
            .position(Option::is_none)
            .ok_or(AdmitError::Full)?;
        let session = Session {
            id: Uuid::new_v4(),
            user: user.to_string(),
            role,
            outbound,
        };
        log::info!("session {} admitted: {user} ({role}) in slot {slot}", session.id);
        slots[slot] = Some(session);
        Ok((slot, role))
    }

    /// Clears a slot, returning the session that occupied it.
    pub async fn release(&self, slot: usize) -> Option<Session> {
        let mut slots = self.slots.write().await;
        let session = slots.get_mut(slot)?.take();
        if let Some(ref s) = session {
            log::info!("session {} released: {} from slot {slot}", s.id, s.user);
        }
        session
    }

    /// Whether any active session grants this user the write role.
    pub async fn can_write(&self, user: &str) -> bool {
        self.slots
            .read()
            .await
            .iter()
            .flatten()
            .any(|s| s.user == user && s.role.can_write())
    }

    pub async fn active_count(&self) -> usize {
        self.slots.read().await.iter().flatten().count()
    }

    /// Pushes the rendered delta to every active session. Returns how
    /// many sessions accepted it; failures are logged and skipped.
    pub async fn broadcast(&self, delta: Arc<str>) -> usize {
        let slots = self.slots.read().await;
        let mut delivered = 0;
        for session in slots.iter().flatten() {
            match session.outbound.try_send(delta.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    log::warn!("session {} lagging, delta dropped", session.id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    log::debug!("session {} channel closed, skipping", session.id);
                }
            }
        }
        delivered
    }
}
