//! FIFO hand-off from worker tasks to the channel's consumer.
//!
//! Worker tasks never touch channel state. They post a [`Completion`] and the
//! channel turns it into an event after applying the state change, so the
//! consumer never sees an event before the state it implies.

use crate::Result;
use tokio::sync::mpsc;

/// Something delivered to the consumer side.
#[derive(Debug)]
pub(crate) enum Completion<E> {
    /// Notification posted by the controller itself.
    Event(E),
    /// Raw reply frame (or failure) from the worker of round trip `round`.
    Reply { round: u64, result: Result<Vec<u8>> },
}

/// Unbounded queue with one consumer.
#[derive(Debug)]
pub(crate) struct Dispatcher<E> {
    tx: mpsc::UnboundedSender<Completion<E>>,
    rx: mpsc::UnboundedReceiver<Completion<E>>,
}

impl<E> Dispatcher<E> {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// Sender for worker tasks.
    pub(crate) fn handle(&self) -> mpsc::UnboundedSender<Completion<E>> {
        self.tx.clone()
    }

    pub(crate) fn post(&self, event: E) {
        // The receiver lives in `self`, so the send cannot fail.
        let _ = self.tx.send(Completion::Event(event));
    }

    /// Next completion without waiting.
    pub(crate) fn try_next(&mut self) -> Option<Completion<E>> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next completion.
    pub(crate) async fn next(&mut self) -> Option<Completion<E>> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_across_sources() {
        let mut dispatcher = Dispatcher::<&'static str>::new();
        dispatcher.post("connected");

        let handle = dispatcher.handle();
        tokio::spawn(async move {
            let _ = handle.send(Completion::Reply {
                round: 1,
                result: Ok(b"reply".to_vec()),
            });
        })
        .await
        .unwrap();
        dispatcher.post("after");

        assert!(matches!(
            dispatcher.next().await,
            Some(Completion::Event("connected"))
        ));
        assert!(matches!(
            dispatcher.next().await,
            Some(Completion::Reply { round: 1, result: Ok(ref body) }) if body == b"reply"
        ));
        assert!(matches!(
            dispatcher.try_next(),
            Some(Completion::Event("after"))
        ));
        assert!(dispatcher.try_next().is_none());
    }
}
