use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use crate::EventKey;

/// Consumer side of the dispatcher.
///
/// `push` is called from a dispatcher worker and should only hand the payload
/// over to the listener's own processing (usually a channel). Doing real work
/// here stalls every other listener pinned to the same worker.
#[async_trait]
pub trait Listener<N, P>: Send + Sync {
    async fn push(&self, name: N, payload: P);
}

/// One payload delivered to a listener, tagged with the name it was dispatched under
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery<N, P> {
    pub name: N,
    pub payload: P,
}

/// Channel-backed listener.
///
/// The dispatcher pushes into a bounded channel and the owner consumes the
/// returned receiver on its own task. A full inbox blocks the delivering
/// worker until the owner catches up.
pub struct Inbox<N, P> {
    tx: mpsc::Sender<Delivery<N, P>>,
}

impl<N, P> Inbox<N, P>
where
    N: EventKey,
    P: Send + 'static,
{
    /// Create an inbox with room for `capacity` pending deliveries
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Delivery<N, P>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl<N, P> Listener<N, P> for Inbox<N, P>
where
    N: EventKey,
    P: Send + 'static,
{
    async fn push(&self, name: N, payload: P) {
        if self.tx.send(Delivery { name, payload }).await.is_err() {
            warn!(event = %name, "listener inbox closed, dropping event");
        }
    }
}
