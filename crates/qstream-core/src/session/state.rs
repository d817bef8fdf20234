//! Observable session lifecycle.

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Single writer of a session's status. Only the first resolution sticks.
#[derive(Debug)]
pub struct SessionState {
    tx: watch::Sender<SessionStatus>,
}

impl SessionState {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(SessionStatus::Active);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> SessionStatus {
        *self.tx.borrow()
    }

    /// Move out of `Active`. Returns `false` if the session had already
    /// resolved, in which case nothing changes.
    pub fn resolve(&self, status: SessionStatus) -> bool {
        if !status.is_terminal() {
            return false;
        }
        self.tx.send_if_modified(|current| {
            if current.is_terminal() {
                false
            } else {
                *current = status;
                true
            }
        })
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
