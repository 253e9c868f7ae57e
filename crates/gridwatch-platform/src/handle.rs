//! Process-global platform client slot.
//!
//! Engines observe the current client at the start of an operation and
//! may request a refresh when they see a closed-client fault. Refresh is a
//! compare-and-swap on the observed instance: when two tasks race, one
//! wins and the loser keeps the winner's fresh client instead of
//! replacing it again.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::client::PlatformClient;

type ClientFactory = Box<dyn Fn() -> Arc<dyn PlatformClient> + Send + Sync>;

/// Shared, swappable handle to the platform client.
pub struct PlatformHandle {
    current: Mutex<Arc<dyn PlatformClient>>,
    factory: ClientFactory,
}

impl PlatformHandle {
    /// Create a handle whose refresh builds a new client via `factory`.
    pub fn new(factory: ClientFactory) -> Self {
        let current = factory();
        Self {
            current: Mutex::new(current),
            factory,
        }
    }

    /// Create a handle pinned to a single client instance. `refresh`
    /// keeps handing out the same instance; used for in-memory platforms
    /// and tests.
    pub fn with_client(client: Arc<dyn PlatformClient>) -> Self {
        let pinned = Arc::clone(&client);
        Self {
            current: Mutex::new(client),
            factory: Box::new(move || Arc::clone(&pinned)),
        }
    }

    /// The current client.
    pub fn get(&self) -> Arc<dyn PlatformClient> {
        Arc::clone(&self.current.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Swap in a fresh client only if `observed` is still the current
    /// instance. Returns the client that is current afterwards — the
    /// fresh one for the winner, the winner's for everyone else.
    pub fn refresh_if_current(
        &self,
        observed: &Arc<dyn PlatformClient>,
    ) -> Arc<dyn PlatformClient> {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if Arc::ptr_eq(&current, observed) {
            *current = (self.factory)();
            debug!("platform client refreshed");
        }
        Arc::clone(&current)
    }

    /// Refresh unconditionally relative to the instant of observation.
    pub fn refresh(&self) -> Arc<dyn PlatformClient> {
        let observed = self.get();
        self.refresh_if_current(&observed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryPlatform;

    fn factory() -> ClientFactory {
        Box::new(|| Arc::new(InMemoryPlatform::new()))
    }

    #[test]
    fn refresh_replaces_the_instance() {
        let handle = PlatformHandle::new(factory());
        let before = handle.get();
        let after = handle.refresh();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(Arc::ptr_eq(&after, &handle.get()));
    }

    #[test]
    fn losing_refresh_keeps_the_winner() {
        let handle = PlatformHandle::new(factory());
        let observed = handle.get();

        // First refresher wins.
        let winner = handle.refresh_if_current(&observed);
        assert!(!Arc::ptr_eq(&observed, &winner));

        // Second refresher raced on the same observation and loses: the
        // winner's client is returned, no second swap happens.
        let seen_by_loser = handle.refresh_if_current(&observed);
        assert!(Arc::ptr_eq(&winner, &seen_by_loser));
    }

    #[test]
    fn pinned_handle_survives_refresh() {
        let client = Arc::new(InMemoryPlatform::new());
        let handle = PlatformHandle::with_client(client.clone());
        let after = handle.refresh();
        // The pinned factory hands back the same instance.
        let after_dyn: Arc<dyn PlatformClient> = client;
        assert!(Arc::ptr_eq(&after, &after_dyn));
    }
}
