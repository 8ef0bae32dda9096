//! Async event streams.
//!
//! Long-running provider work, such as a command executing on a host,
//! reports progress as a stream of events instead of a single result.

use std::pin::Pin;

use futures_core::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Type alias for a boxed async stream of events.
pub type EventStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

/// Sending half of an event stream.
#[derive(Debug)]
pub struct EventSender<T> {
    tx: mpsc::Sender<T>,
}

impl<T> EventSender<T> {
    pub fn new(tx: mpsc::Sender<T>) -> Self {
        Self { tx }
    }

    /// Send an event.
    ///
    /// Returns `Err(event)` when the stream has been dropped.
    pub async fn send(&self, event: T) -> Result<(), T> {
        self.tx.send(event).await.map_err(|e| e.0)
    }

    /// Check if the stream has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Wait until the stream has been dropped.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

impl<T> Clone for EventSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// Create an event stream backed by a channel of `buffer_size` events.
///
/// # Example
///
/// ```rust
/// use rustadmin::stream::create_stream;
///
/// # async fn example() {
/// let (sender, stream) = create_stream::<String>(16);
/// sender.send("started".to_string()).await.unwrap();
/// # }
/// ```
pub fn create_stream<T: Send + 'static>(buffer_size: usize) -> (EventSender<T>, EventStream<T>) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    let stream: EventStream<T> = Box::pin(ReceiverStream::new(rx));
    (EventSender::new(tx), stream)
}
