use tokio::sync::mpsc;

use crate::document::{Document, DocumentPath};
use crate::error::Result;

/// One change notification: the document as it now stands (`None` if it
/// does not exist) or an error reported by the backend.
pub type SubscriptionEvent = Result<Option<Document>>;

/// Creates a connected sink/subscription pair for `path`.
///
/// Store backends keep the sink and push events into it; the consumer owns
/// the [`Subscription`].
pub fn channel(path: DocumentPath) -> (SubscriptionSink, Subscription) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        SubscriptionSink {
            path: path.clone(),
            tx,
        },
        Subscription { path, rx },
    )
}

/// Producer side of a subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionSink {
    path: DocumentPath,
    tx: mpsc::UnboundedSender<SubscriptionEvent>,
}

impl SubscriptionSink {
    /// Delivers an event. Returns `false` once the consumer has gone away.
    pub fn send(&self, event: SubscriptionEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// Returns `true` once the consumer has unsubscribed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// The watched document.
    pub fn path(&self) -> &DocumentPath {
        &self.path
    }
}

/// Consumer side of a subscription: a cancellable stream of events.
#[derive(Debug)]
pub struct Subscription {
    path: DocumentPath,
    rx: mpsc::UnboundedReceiver<SubscriptionEvent>,
}

impl Subscription {
    /// Waits for the next event. `None` once the backend stops publishing.
    pub async fn next(&mut self) -> Option<SubscriptionEvent> {
        self.rx.recv().await
    }

    /// Returns an already queued event without waiting.
    pub fn try_next(&mut self) -> Option<SubscriptionEvent> {
        self.rx.try_recv().ok()
    }

    /// Stops the subscription; the backend drops its sink on the next
    /// publish. Dropping the subscription has the same effect.
    pub fn unsubscribe(mut self) {
        self.rx.close();
    }

    /// The watched document.
    pub fn path(&self) -> &DocumentPath {
        &self.path
    }
}
