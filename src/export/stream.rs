//! Result stream between the scroll engine and its consumer
//!
//! A bounded channel holding at most one pending document. The producer
//! suspends while the slot is full; the consumer suspends while it is empty
//! and the stream is still open. Dropping the [`DocumentSender`] closes the
//! stream, which the consumer observes as `None`.

use tokio::sync::mpsc;

use super::document::Document;

/// Number of documents buffered between producer and consumer
pub const STREAM_CAPACITY: usize = 1;

/// Create a connected sender/receiver pair
pub fn channel() -> (DocumentSender, DocumentReceiver) {
    let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
    (DocumentSender { tx }, DocumentReceiver { rx, closed: false })
}

/// Producer half, owned by the scroll engine
#[derive(Debug)]
pub struct DocumentSender {
    tx: mpsc::Sender<Document>,
}

/// Returned when the consumer has gone away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerGone;

impl DocumentSender {
    /// Forward one document, waiting for buffer space
    ///
    /// # Returns
    /// * `Err(ConsumerGone)` if the receiver was dropped
    pub async fn send(&self, doc: Document) -> Result<(), ConsumerGone> {
        self.tx.send(doc).await.map_err(|_| ConsumerGone)
    }

    /// Close the stream. Consuming `self` makes a second close impossible.
    pub fn close(self) {
        drop(self);
    }
}

/// Consumer half
#[derive(Debug)]
pub struct DocumentReceiver {
    rx: mpsc::Receiver<Document>,
    closed: bool,
}

impl DocumentReceiver {
    /// Receive the next document, or None once the stream is closed
    pub async fn recv(&mut self) -> Option<Document> {
        if self.closed {
            return None;
        }
        let doc = self.rx.recv().await;
        if doc.is_none() {
            self.closed = true;
        }
        doc
    }

    /// Whether end-of-stream has been observed
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
