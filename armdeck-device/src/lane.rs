//! Shared view of the current session's command channel
//!
//! The `ConnectionManager` installs a `CommandExchanger` when a session gets
//! its command endpoint and removes it on teardown. The `ButtonSynchronizer`
//! only reads from here; it never touches the transport itself. When one of
//! its exchanges fails at the link level it reports that here, and the
//! session's link watcher ends the session.

use std::sync::Arc;

use armdeck_transport::CommandExchanger;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;

use crate::error::DeckError;
use crate::state::ConnectionState;

/// Exchanger of one session, tagged with its generation
struct Attached {
    generation: u64,
    exchanger: Arc<CommandExchanger>,
}

pub struct CommandLane {
    state: watch::Receiver<ConnectionState>,
    attached: RwLock<Option<Attached>>,
    /// Generation of the last session whose link failed under an exchange
    link_failures: watch::Sender<u64>,
}

impl CommandLane {
    pub fn new(state: watch::Receiver<ConnectionState>) -> Self {
        let (link_failures, _) = watch::channel(0);
        Self {
            state,
            attached: RwLock::new(None),
            link_failures,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Configuration writes are allowed right now
    pub fn is_usable(&self) -> bool {
        self.state().is_fully_connected() && self.attached.read().is_some()
    }

    /// Exchanger of a fully connected session, or `NotReady`
    pub fn usable(&self, operation: &'static str) -> Result<Arc<CommandExchanger>, DeckError> {
        self.session(operation).map(|(_, exchanger)| exchanger)
    }

    /// Like `usable`, with the session's generation
    pub(crate) fn session(
        &self,
        operation: &'static str,
    ) -> Result<(u64, Arc<CommandExchanger>), DeckError> {
        let state = self.state();
        match self.attached.read().as_ref() {
            Some(a) if state.is_fully_connected() => Ok((a.generation, a.exchanger.clone())),
            _ => Err(DeckError::NotReady { operation, state }),
        }
    }

    pub(crate) fn generation(&self) -> Option<u64> {
        self.attached.read().as_ref().map(|a| a.generation)
    }

    pub(crate) fn attach(&self, generation: u64, exchanger: Arc<CommandExchanger>) {
        *self.attached.write() = Some(Attached {
            generation,
            exchanger,
        });
    }

    pub(crate) fn detach(&self) {
        self.attached.write().take();
    }

    pub(crate) fn subscribe_link_failures(&self) -> watch::Receiver<u64> {
        self.link_failures.subscribe()
    }

    /// Pass `result` through. A transport error on the attached exchanger
    /// is published to the session's link watcher.
    pub(crate) fn check<T>(
        &self,
        exchanger: &Arc<CommandExchanger>,
        result: Result<T, DeckError>,
    ) -> Result<T, DeckError> {
        if let Err(DeckError::Transport(e)) = &result {
            let generation = self
                .attached
                .read()
                .as_ref()
                .filter(|a| Arc::ptr_eq(&a.exchanger, exchanger))
                .map(|a| a.generation);
            if let Some(generation) = generation {
                debug!("Session {} link failed: {}", generation, e);
                self.link_failures.send_replace(generation);
            }
        }
        result
    }
}
