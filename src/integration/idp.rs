use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use uuid::Uuid;

use crate::user;

pub type Listener = Box<dyn Fn(Option<Principal>) + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    pub sub: user::Sub,
}

impl Principal {
    pub fn new(sub: impl Into<user::Sub>) -> Self {
        Self { sub: sub.into() }
    }
}

pub trait AuthProvider {
    /// Registers `listener` for sign-in state changes. The provider calls it
    /// with the current state once it is known, then on every transition.
    fn on_identity_change(&self, listener: Listener) -> Registration;
}

/// Keeps a listener registered. Dropping it unregisters.
pub struct Registration {
    unregister: Option<Box<dyn FnOnce() + Send>>,
}

impl Registration {
    pub fn new(unregister: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unregister: Some(Box::new(unregister)),
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if let Some(f) = self.unregister.take() {
            f();
        }
    }
}

#[derive(Default)]
struct IdpState {
    resolved: bool,
    current: Option<Principal>,
    listeners: HashMap<Uuid, Arc<Listener>>,
}

/// Identity provider held in process memory.
#[derive(Clone)]
pub struct InMemoryIdp {
    state: Arc<Mutex<IdpState>>,
}

impl Default for InMemoryIdp {
    fn default() -> Self {
        Self::signed_out()
    }
}

impl InMemoryIdp {
    pub fn signed_out() -> Self {
        Self::with_state(IdpState {
            resolved: true,
            ..Default::default()
        })
    }

    /// A provider that has not restored its session yet: listeners stay
    /// silent until the first `sign_in` or `sign_out`.
    pub fn pending() -> Self {
        Self::with_state(IdpState::default())
    }

    fn with_state(state: IdpState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, IdpState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn sign_in(&self, principal: Principal) {
        debug!("signing in {}", principal.sub);
        self.transition(Some(principal));
    }

    pub fn sign_out(&self) {
        debug!("signing out");
        self.transition(None);
    }

    pub fn listeners(&self) -> usize {
        self.lock().listeners.len()
    }

    fn transition(&self, principal: Option<Principal>) {
        let listeners = {
            let mut state = self.lock();
            state.resolved = true;
            state.current = principal.clone();
            state.listeners.values().cloned().collect::<Vec<_>>()
        };

        for listener in listeners {
            listener(principal.clone());
        }
    }
}

impl AuthProvider for InMemoryIdp {
    fn on_identity_change(&self, listener: Listener) -> Registration {
        let id = Uuid::new_v4();
        let listener = Arc::new(listener);

        let initial = {
            let mut state = self.lock();
            state.listeners.insert(id, listener.clone());
            state.resolved.then(|| state.current.clone())
        };

        if let Some(principal) = initial {
            listener(principal);
        }

        let state = Arc::downgrade(&self.state);
        Registration::new(move || {
            if let Some(state) = state.upgrade() {
                let mut state = state
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                state.listeners.remove(&id);
            }
        })
    }
}
