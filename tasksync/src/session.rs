//! Process-wide session context: identity and connectivity.
//!
//! One [`Session`] is constructed per engine and shared by `Arc` with the
//! connection manager and the command dispatcher, so there is exactly one
//! place identity lives. Reconnect timers read identity through
//! [`Session::is_live`] at fire time — never from a value captured when
//! the timer was armed — which is what stops retries promptly after logout.

use parking_lot::RwLock;

/// Identity and connectivity context for one engine instance.
#[derive(Debug, Default)]
pub struct Session {
    /// The logged-in identity, `None` while logged out.
    identity: RwLock<Option<String>>,
}

impl Session {
    /// Creates a logged-out session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the session as logged in under `name`.
    pub fn login(&self, name: impl Into<String>) {
        *self.identity.write() = Some(name.into());
    }

    /// Clears the identity. In-memory task state is cleared by the engine;
    /// the durable cache is deliberately left untouched.
    pub fn logout(&self) {
        *self.identity.write() = None;
    }

    /// Returns the current identity, if logged in.
    #[must_use]
    pub fn identity(&self) -> Option<String> {
        self.identity.read().clone()
    }

    /// Live check used by reconnect timers at fire time.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.identity.read().is_some()
    }
}
