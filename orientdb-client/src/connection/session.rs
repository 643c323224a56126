//! Logical sessions multiplexed over one connection.

use std::collections::HashMap;
use std::sync::Arc;

use orientdb_core::Result;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use super::reader::ResponseReader;

/// A response handed from the reader task to a waiting session.
pub(crate) struct Delivery {
    pub(crate) payload: Result<ResponseReader>,
    pub(crate) accepted: oneshot::Sender<()>,
}

/// A logical request/response channel identified by the server's session id.
///
/// At most one request is in flight per session; concurrent callers on the
/// same session queue behind each other.
pub struct Session {
    id: i32,
    sender: mpsc::Sender<Delivery>,
    inbox: tokio::sync::Mutex<mpsc::Receiver<Delivery>>,
    token: Mutex<Option<Vec<u8>>>,
}

impl Session {
    fn new(id: i32) -> Self {
        let (sender, receiver) = mpsc::channel(1);
        Self {
            id,
            sender,
            inbox: tokio::sync::Mutex::new(receiver),
            token: Mutex::new(None),
        }
    }

    /// Returns the session id.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Returns the authentication token the server issued, if any.
    pub fn token(&self) -> Option<Vec<u8>> {
        self.token.lock().clone()
    }

    pub(crate) fn set_token(&self, token: Option<Vec<u8>>) {
        *self.token.lock() = token.filter(|t| !t.is_empty());
    }

    pub(crate) fn sender(&self) -> &mpsc::Sender<Delivery> {
        &self.sender
    }

    pub(crate) fn inbox(&self) -> &tokio::sync::Mutex<mpsc::Receiver<Delivery>> {
        &self.inbox
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("has_token", &self.token.lock().is_some())
            .finish()
    }
}

/// Session id to session map shared by callers and the reader task.
#[derive(Debug, Default)]
pub(crate) struct SessionRegistry {
    sessions: Mutex<HashMap<i32, Arc<Session>>>,
    active: Mutex<Option<i32>>,
}

impl SessionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the session for `id`, creating it if needed.
    pub(crate) fn get_or_create(&self, id: i32) -> Arc<Session> {
        Arc::clone(
            self.sessions
                .lock()
                .entry(id)
                .or_insert_with(|| Arc::new(Session::new(id))),
        )
    }

    /// Removes a session; clears the active database session if it matches.
    pub(crate) fn remove(&self, id: i32) -> Option<Arc<Session>> {
        let removed = self.sessions.lock().remove(&id);
        let mut active = self.active.lock();
        if *active == Some(id) {
            *active = None;
        }
        removed
    }

    pub(crate) fn set_active(&self, id: i32) {
        *self.active.lock() = Some(id);
    }

    pub(crate) fn active(&self) -> Option<i32> {
        *self.active.lock()
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.lock().len()
    }
}
