//! Decoded-message queue and the end-of-stream completion signal.
//!
//! The parser writes [`DecodedMessage`]s through a [`MessageSink`]; consumers
//! on other threads read them from a [`MessageStream`]. A graceful stop
//! resolves the shared [`Completion`] exactly once and closes the channel.
//! A cancelled or faulted session closes the channel without resolving it,
//! so consumers can tell the two apart.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use parking_lot::{Condvar, Mutex};

use crate::dem::DemoCommand;

/// Payload handed to asynchronous consumers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    pub frame: u32,
    pub ingame_tick: i32,
    pub command: DemoCommand,
    pub payload: Vec<u8>,
}

/// One-shot signal, resolved at most once
#[derive(Debug, Clone, Default)]
pub struct Completion {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Completion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the signal. Returns true only for the call that resolved it.
    pub fn resolve(&self) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut done = lock.lock();
        if *done {
            return false;
        }
        *done = true;
        cvar.notify_all();
        true
    }

    pub fn is_complete(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Block until resolved
    pub fn wait(&self) {
        let (lock, cvar) = &*self.inner;
        let mut done = lock.lock();
        while !*done {
            cvar.wait(&mut done);
        }
    }

    /// Block until resolved or `timeout` elapses. Returns whether it resolved.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let mut done = lock.lock();
        if !*done {
            cvar.wait_for(&mut done, timeout);
        }
        *done
    }
}

/// Writing end, owned by the parser
#[derive(Debug)]
pub struct MessageSink {
    tx: Option<Sender<DecodedMessage>>,
    completion: Completion,
    closed: bool,
    sent: u64,
    dropped: u64,
}

impl MessageSink {
    pub(crate) fn new(completion: Completion) -> Self {
        Self {
            tx: None,
            completion,
            closed: false,
            sent: 0,
            dropped: 0,
        }
    }

    /// Open the channel. Returns `None` if a stream was already handed out
    /// or the sink has been closed.
    pub(crate) fn subscribe(&mut self, capacity: Option<usize>) -> Option<MessageStream> {
        if self.tx.is_some() || self.closed {
            return None;
        }
        let (tx, rx) = match capacity {
            Some(cap) => crossbeam_channel::bounded(cap),
            None => crossbeam_channel::unbounded(),
        };
        self.tx = Some(tx);
        Some(MessageStream {
            rx,
            completion: self.completion.clone(),
        })
    }

    /// Whether anybody is listening for messages
    pub fn is_subscribed(&self) -> bool {
        self.tx.is_some()
    }

    /// Queue a message without blocking.
    ///
    /// Dropped silently if nobody subscribed or the consumer went away.
    /// When a bounded queue is full the message is dropped and counted.
    pub fn push(&mut self, message: DecodedMessage) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(message) {
            Ok(()) => self.sent += 1,
            Err(TrySendError::Full(message)) => {
                self.dropped += 1;
                if self.dropped == 1 {
                    tracing::warn!(
                        frame = message.frame,
                        capacity = ?tx.capacity(),
                        "Message queue full; dropping decoded messages"
                    );
                } else {
                    tracing::debug!(frame = message.frame, dropped = self.dropped, "Dropped decoded message");
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("Message stream receiver dropped; no longer forwarding");
                self.tx = None;
            }
        }
    }

    /// Messages delivered to the channel so far
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Messages discarded because a bounded queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Resolve completion and close the channel
    pub(crate) fn complete(&mut self) -> bool {
        self.closed = true;
        self.tx = None;
        self.completion.resolve()
    }

    /// Close the channel without resolving completion
    pub(crate) fn abort(&mut self) {
        self.closed = true;
        self.tx = None;
    }
}

/// Reading end, handed to consumers
#[derive(Debug)]
pub struct MessageStream {
    rx: Receiver<DecodedMessage>,
    completion: Completion,
}

impl MessageStream {
    /// Next message if one is queued
    pub fn try_next(&self) -> Option<DecodedMessage> {
        match self.rx.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Blocking iterator that ends once the parser closes the channel
    pub fn iter(&self) -> impl Iterator<Item = DecodedMessage> + '_ {
        self.rx.iter()
    }

    /// Whether the parser reached the stop frame
    pub fn is_complete(&self) -> bool {
        self.completion.is_complete()
    }

    pub fn completion(&self) -> Completion {
        self.completion.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(frame: u32) -> DecodedMessage {
        DecodedMessage {
            frame,
            ingame_tick: frame as i32 * 2,
            command: DemoCommand::Packet,
            payload: vec![frame as u8],
        }
    }

    #[test]
    fn test_completion_resolves_once() {
        let completion = Completion::new();
        assert!(!completion.is_complete());
        assert!(completion.resolve());
        assert!(!completion.resolve());
        assert!(completion.is_complete());
        assert!(completion.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn test_completion_wakes_waiter() {
        let completion = Completion::new();
        let waiter = {
            let completion = completion.clone();
            std::thread::spawn(move || completion.wait())
        };

        completion.resolve();
        waiter.join().unwrap();
    }

    #[test]
    fn test_wait_timeout_unresolved() {
        let completion = Completion::new();
        assert!(!completion.wait_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn test_push_without_subscriber_is_dropped() {
        let mut sink = MessageSink::new(Completion::new());
        sink.push(message(1));
        assert_eq!(sink.sent(), 0);
        assert!(!sink.is_subscribed());
    }

    #[test]
    fn test_stream_ends_after_complete() {
        let mut sink = MessageSink::new(Completion::new());
        let stream = sink.subscribe(None).unwrap();
        assert!(sink.subscribe(None).is_none());

        sink.push(message(1));
        sink.push(message(2));
        assert!(sink.complete());
        assert!(!sink.complete());

        let frames: Vec<_> = stream.iter().map(|m| m.frame).collect();
        assert_eq!(frames, vec![1, 2]);
        assert!(stream.is_complete());
    }

    #[test]
    fn test_abort_closes_without_completion() {
        let mut sink = MessageSink::new(Completion::new());
        let stream = sink.subscribe(Some(4)).unwrap();

        sink.push(message(1));
        sink.abort();

        assert_eq!(stream.iter().count(), 1);
        assert!(!stream.is_complete());
        assert!(stream.try_next().is_none());
    }

    #[test]
    fn test_full_queue_drops_instead_of_blocking() {
        let mut sink = MessageSink::new(Completion::new());
        let stream = sink.subscribe(Some(1)).unwrap();

        for frame in 1..=5 {
            sink.push(message(frame));
        }
        assert_eq!(sink.sent(), 1);
        assert_eq!(sink.dropped(), 4);

        // Room again once the consumer catches up
        assert_eq!(stream.try_next().map(|m| m.frame), Some(1));
        sink.push(message(6));
        assert_eq!(sink.sent(), 2);
        assert_eq!(stream.try_next().map(|m| m.frame), Some(6));
    }

    #[test]
    fn test_dropped_stream_stops_forwarding() {
        let mut sink = MessageSink::new(Completion::new());
        drop(sink.subscribe(None).unwrap());

        sink.push(message(1));
        assert!(!sink.is_subscribed());
        assert_eq!(sink.sent(), 0);
    }
}
