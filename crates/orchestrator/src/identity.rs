//! Execution identity and the privileged scope modules are upgraded under.

use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Identity on whose behalf work is performed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Identity {
    #[default]
    Anonymous,
    User(String),
    /// Privileged identity used for module upgrades.
    System,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("anonymous"),
            Self::User(name) => write!(f, "user:{name}"),
            Self::System => f.write_str("system"),
        }
    }
}

/// Source of the current execution identity.
pub trait IdentityProvider: Send + Sync {
    fn current(&self) -> Identity;

    fn set_current(&self, identity: Identity);
}

/// In-process identity holder.
#[derive(Debug, Default)]
pub struct ProcessIdentity {
    current: Mutex<Identity>,
}

impl ProcessIdentity {
    pub fn new(identity: Identity) -> Self {
        Self {
            current: Mutex::new(identity),
        }
    }
}

impl IdentityProvider for ProcessIdentity {
    fn current(&self) -> Identity {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_current(&self, identity: Identity) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = identity;
    }
}

/// RAII guard that runs under [`Identity::System`].
///
/// The identity that was current on creation is restored when the guard is
/// dropped, whether the guarded work succeeded, failed or panicked.
pub struct PrivilegedScope {
    provider: Arc<dyn IdentityProvider>,
    previous: Identity,
}

impl PrivilegedScope {
    pub fn enter(provider: Arc<dyn IdentityProvider>) -> Self {
        let previous = provider.current();
        provider.set_current(Identity::System);
        debug!(previous = %previous, "Entered privileged scope");

        Self { provider, previous }
    }
}

impl Drop for PrivilegedScope {
    fn drop(&mut self) {
        self.provider.set_current(self.previous.clone());
        debug!(restored = %self.previous, "Left privileged scope");
    }
}
