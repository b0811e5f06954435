//! Session readiness signal.
//!
//! Counting and subscribing both require an established session with the
//! backing store (anonymous or token sign-in, handled elsewhere). The core
//! only consumes the outcome: either a ready store handle or a failure.
//!
//! ```rust
//! use contavisite::session;
//! use contavisite::store::MemoryStore;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let (signal, mut session) = session::channel::<MemoryStore>();
//! assert!(!session.is_ready());
//!
//! signal.establish(MemoryStore::new());
//! let store = session.ready().await.unwrap();
//! # let _ = store;
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{Result, VisitError};

/// Where session establishment currently stands.
#[derive(Debug)]
pub enum SessionState<S> {
    /// Sign-in has not completed yet.
    Pending,
    /// The store is usable.
    Ready(Arc<S>),
    /// Sign-in failed; nothing will be counted for this page load.
    Failed(String),
}

impl<S> SessionState<S> {
    fn is_settled(&self) -> bool {
        !matches!(self, SessionState::Pending)
    }
}

/// Creates a connected signal/session pair in the pending state.
pub fn channel<S>() -> (SessionSignal<S>, Session<S>) {
    let (tx, rx) = watch::channel(SessionState::Pending);
    (SessionSignal { tx }, Session { rx })
}

/// Producer side, owned by whatever establishes the session.
#[derive(Debug)]
pub struct SessionSignal<S> {
    tx: watch::Sender<SessionState<S>>,
}

impl<S> SessionSignal<S> {
    /// Marks the session ready with the given store.
    pub fn establish(&self, store: S) -> Arc<S> {
        self.establish_shared(Arc::new(store))
    }

    /// Marks the session ready with an already shared store.
    pub fn establish_shared(&self, store: Arc<S>) -> Arc<S> {
        info!("session established");
        self.tx.send_replace(SessionState::Ready(Arc::clone(&store)));
        store
    }

    /// Marks the session as failed.
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%reason, "session establishment failed");
        self.tx.send_replace(SessionState::Failed(reason));
    }

    /// Creates another consumer of this signal.
    pub fn session(&self) -> Session<S> {
        Session {
            rx: self.tx.subscribe(),
        }
    }
}

/// Consumer side: the readiness flag plus the store handle.
#[derive(Debug)]
pub struct Session<S> {
    rx: watch::Receiver<SessionState<S>>,
}

impl<S> Clone for Session<S> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<S> Session<S> {
    /// Returns `true` once the session is established.
    pub fn is_ready(&self) -> bool {
        matches!(*self.rx.borrow(), SessionState::Ready(_))
    }

    /// The store handle, if the session is ready.
    pub fn store(&self) -> Option<Arc<S>> {
        match &*self.rx.borrow() {
            SessionState::Ready(store) => Some(Arc::clone(store)),
            _ => None,
        }
    }

    /// Waits until the session settles.
    ///
    /// Fails if establishment failed, or if the signal was dropped while
    /// still pending.
    pub async fn ready(&mut self) -> Result<Arc<S>> {
        let state = self
            .rx
            .wait_for(SessionState::is_settled)
            .await
            .map_err(|_| VisitError::Session("session signal dropped".into()))?;
        match &*state {
            SessionState::Ready(store) => Ok(Arc::clone(store)),
            SessionState::Failed(reason) => Err(VisitError::Session(reason.clone())),
            SessionState::Pending => Err(VisitError::Session("session still pending".into())),
        }
    }
}
