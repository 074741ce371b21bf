//! Ordered delivery of client events.

use tokio::sync::mpsc;

use crate::event::ClientEvent;

/// The consumer is gone; nothing more can be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Disconnected;

/// Sending half of a turn's event channel.
///
/// `emit` waits for channel capacity, so a slow consumer slows the turn
/// down instead of growing a buffer.
#[derive(Debug)]
pub(crate) struct EventSink {
    tx: mpsc::Sender<ClientEvent>,
    sent: usize,
    terminated: bool,
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::Sender<ClientEvent>) -> Self {
        Self {
            tx,
            sent: 0,
            terminated: false,
        }
    }

    /// Nothing may follow a `done` or `error` event.
    pub(crate) async fn emit(&mut self, event: ClientEvent) -> Result<(), Disconnected> {
        debug_assert!(!self.terminated, "event emitted after terminal event");
        let terminal = event.is_terminal();
        self.tx.send(event).await.map_err(|_| Disconnected)?;
        self.sent += 1;
        self.terminated |= terminal;
        Ok(())
    }

    /// Resolves once the receiver has been dropped.
    pub(crate) async fn closed(&self) {
        self.tx.closed().await;
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub(crate) fn sent(&self) -> usize {
        self.sent
    }
}
