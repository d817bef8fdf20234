//! Caller-supplied lazy sequence of outbound payloads.
//!
//! Any `Stream<Item = Result<T, E>>` works: an async generator, a channel fed
//! by another task, or a fixed list. The source may suspend between items and
//! fails at most once; after an error or exhaustion it yields nothing more.

use std::convert::Infallible;
use std::fmt;
use std::pin::Pin;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

/// Boxed error raised by a caller's event source.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

type PayloadStream = Pin<Box<dyn Stream<Item = Result<String, BoxError>> + Send>>;

pub struct EventSource {
    inner: PayloadStream,
    finished: bool,
}

impl EventSource {
    pub fn new<S, T, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<T, E>> + Send + 'static,
        T: Into<String> + 'static,
        E: Into<BoxError> + 'static,
    {
        let payloads = stream.map(|item: Result<T, E>| -> Result<String, BoxError> {
            item.map(Into::into).map_err(Into::into)
        });
        Self {
            inner: Box::pin(payloads),
            finished: false,
        }
    }

    /// Source over a fixed, infallible list of payloads.
    pub fn from_values<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
        T: Into<String> + 'static,
    {
        Self::new(tokio_stream::iter(
            values.into_iter().map(Ok::<T, Infallible>),
        ))
    }

    /// Source fed by another task; it ends when every sender is dropped.
    pub fn from_receiver(rx: mpsc::Receiver<Result<String, BoxError>>) -> Self {
        Self::new(ReceiverStream::new(rx))
    }

    /// Source that finishes immediately.
    pub fn empty() -> Self {
        Self::from_values(Vec::<String>::new())
    }

    /// Next payload, suspending until the caller produces one.
    pub async fn next(&mut self) -> Option<Result<String, BoxError>> {
        if self.finished {
            return None;
        }
        let item = self.inner.next().await;
        if !matches!(item, Some(Ok(_))) {
            self.finished = true;
        }
        item
    }
}

impl fmt::Debug for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn yields_values_in_order_then_ends() {
        let mut source = EventSource::from_values(["apple", "banana"]);
        assert_eq!(source.next().await.unwrap().unwrap(), "apple");
        assert_eq!(source.next().await.unwrap().unwrap(), "banana");
        assert!(source.next().await.is_none());
        assert!(source.next().await.is_none());
    }

    #[tokio::test]
    async fn fails_once_then_stays_finished() {
        let items: Vec<Result<&str, std::io::Error>> = vec![
            Ok("a"),
            Err(std::io::Error::other("typing interrupted")),
            Ok("never seen"),
        ];
        let mut source = EventSource::new(tokio_stream::iter(items));
        assert_eq!(source.next().await.unwrap().unwrap(), "a");
        let err = source.next().await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "typing interrupted");
        assert!(source.next().await.is_none());
    }

    #[tokio::test]
    async fn receiver_source_waits_for_producer() {
        let (tx, rx) = mpsc::channel(1);
        let mut source = EventSource::from_receiver(rx);
        let producer = tokio::spawn(async move {
            tokio::task::yield_now().await;
            tx.send(Ok("late".to_string())).await.unwrap();
        });
        assert_eq!(source.next().await.unwrap().unwrap(), "late");
        producer.await.unwrap();
        assert!(source.next().await.is_none());
    }
}
