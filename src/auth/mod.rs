use log::debug;
use tokio::sync::watch;

use crate::integration::idp::{AuthProvider, Registration};
use crate::user;

/// Sign-in state as last reported by the identity provider.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AuthState {
    /// The provider has not reported yet.
    #[default]
    Unknown,
    Absent,
    Present(user::Sub),
}

impl AuthState {
    pub fn sub(&self) -> Option<&user::Sub> {
        match self {
            AuthState::Present(sub) => Some(sub),
            AuthState::Unknown | AuthState::Absent => None,
        }
    }
}

/// Mirrors the provider's sign-in state into an observable value.
///
/// Starts as [`AuthState::Unknown`]. Identical consecutive reports are not
/// re-emitted. Dropping the watcher unregisters from the provider, which in
/// turn closes every receiver handed out by [`IdentityWatcher::subscribe`].
pub struct IdentityWatcher {
    state: watch::Receiver<AuthState>,
    _registration: Registration,
}

impl IdentityWatcher {
    pub fn new(provider: &dyn AuthProvider) -> Self {
        let (tx, state) = watch::channel(AuthState::Unknown);

        let registration = provider.on_identity_change(Box::new(move |principal| {
            let next = match principal {
                Some(p) => AuthState::Present(p.sub),
                None => AuthState::Absent,
            };

            tx.send_if_modified(|current| {
                if *current == next {
                    return false;
                }
                debug!("auth state: {current:?} -> {next:?}");
                *current = next;
                true
            });
        }));

        Self {
            state,
            _registration: registration,
        }
    }

    pub fn current(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use crate::integration::idp::{InMemoryIdp, Principal};

    use super::*;

    #[test]
    fn should_start_unknown() {
        let idp = InMemoryIdp::pending();
        let watcher = IdentityWatcher::new(&idp);
        assert_eq!(watcher.current(), AuthState::Unknown);
    }

    #[test]
    fn should_follow_transitions() {
        let idp = InMemoryIdp::pending();
        let watcher = IdentityWatcher::new(&idp);

        idp.sign_out();
        assert_eq!(watcher.current(), AuthState::Absent);

        idp.sign_in(Principal::new("u1"));
        assert_eq!(watcher.current(), AuthState::Present("u1".into()));
        assert_eq!(watcher.current().sub(), Some(&user::Sub::from("u1")));
    }

    #[tokio::test]
    async fn should_not_reemit_identical_state() {
        let idp = InMemoryIdp::signed_out();
        idp.sign_in(Principal::new("u1"));
        let watcher = IdentityWatcher::new(&idp);

        let mut rx = watcher.subscribe();
        rx.borrow_and_update();

        idp.sign_in(Principal::new("u1"));
        assert!(!rx.has_changed().unwrap());

        idp.sign_in(Principal::new("u2"));
        assert!(rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn should_unregister_and_close_on_drop() {
        let idp = InMemoryIdp::signed_out();
        let watcher = IdentityWatcher::new(&idp);
        let mut rx = watcher.subscribe();
        assert_eq!(*rx.borrow_and_update(), AuthState::Absent);
        assert_eq!(idp.listeners(), 1);

        drop(watcher);

        assert_eq!(idp.listeners(), 0);
        assert!(rx.changed().await.is_err());
    }
}
