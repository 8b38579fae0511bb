//! Asynchronous event sink.
//!
//! Servers and transfers run in background tasks, so failures and progress
//! cannot be returned to whoever started them. They are pushed through a
//! [`Notifier`] instead. The core never assumes what sits on the other end:
//! a GUI bridge, a terminal printer, or nothing at all.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::p2p::TransferSession;

/// A named event emitted from a background task.
#[derive(Debug, Clone)]
pub enum Event {
    /// The file server stopped serving unexpectedly
    ServerError(String),
    /// The P2P session server or a download failed
    P2pError(String),
    /// A P2P session changed status
    P2pStatus(TransferSession),
    /// A P2P download wrote more bytes
    P2pProgress(TransferSession),
}

impl Event {
    /// Wire name of the event.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ServerError(_) => "server-error",
            Self::P2pError(_) => "p2p-error",
            Self::P2pStatus(_) => "p2p-status",
            Self::P2pProgress(_) => "p2p-progress",
        }
    }

    /// JSON payload of the event.
    pub fn payload(&self) -> serde_json::Value {
        match self {
            Self::ServerError(msg) | Self::P2pError(msg) => serde_json::Value::from(msg.as_str()),
            Self::P2pStatus(session) | Self::P2pProgress(session) => {
                serde_json::to_value(session).unwrap_or(serde_json::Value::Null)
            }
        }
    }
}

/// Receiver of background events.
pub trait Notifier: Send + Sync {
    /// Deliver one event. Must not block.
    fn notify(&self, event: Event);
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, event: Event) {
        tracing::trace!(event = event.name(), "dropping event");
    }
}

/// Progress events allowed to wait in a [`ChannelNotifier`] queue.
pub const MAX_QUEUED_PROGRESS: usize = 64;

/// Forwards events into a channel.
///
/// Status and error events are always queued. Progress events are dropped
/// while [`MAX_QUEUED_PROGRESS`] of them are still unread, so a slow
/// consumer sees fewer progress updates instead of an ever growing queue.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Event>,
    queued_progress: Arc<AtomicUsize>,
}

impl ChannelNotifier {
    /// Create a notifier and the receiving end of its channel.
    pub fn new() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queued_progress = Arc::new(AtomicUsize::new(0));
        let receiver = EventReceiver {
            rx,
            queued_progress: Arc::clone(&queued_progress),
        };
        (Self { tx, queued_progress }, receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: Event) {
        let is_progress = matches!(event, Event::P2pProgress(_));
        if is_progress {
            let queued = self.queued_progress.fetch_add(1, Ordering::AcqRel);
            if queued >= MAX_QUEUED_PROGRESS {
                self.queued_progress.fetch_sub(1, Ordering::AcqRel);
                tracing::trace!("consumer lagging, dropping progress event");
                return;
            }
        }

        tracing::debug!(event = event.name(), "emitting event");
        if self.tx.send(event).is_err() {
            if is_progress {
                self.queued_progress.fetch_sub(1, Ordering::AcqRel);
            }
            tracing::trace!("event receiver dropped");
        }
    }
}

/// Receiving end of a [`ChannelNotifier`].
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<Event>,
    queued_progress: Arc<AtomicUsize>,
}

impl EventReceiver {
    /// Wait for the next event. `None` once every notifier is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        let event = self.rx.recv().await?;
        self.taken(&event);
        Some(event)
    }

    /// Take the next event if one is queued.
    pub fn try_recv(&mut self) -> Option<Event> {
        let event = self.rx.try_recv().ok()?;
        self.taken(&event);
        Some(event)
    }

    fn taken(&self, event: &Event) {
        if matches!(event, Event::P2pProgress(_)) {
            self.queued_progress.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl<F> Notifier for F
where
    F: Fn(Event) + Send + Sync,
{
    fn notify(&self, event: Event) {
        tracing::debug!(event = event.name(), "emitting event");
        self(event);
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Mutex;

    use super::*;
    use crate::p2p::TransferStatus;

    fn progress(bytes: u64) -> Event {
        Event::P2pProgress(TransferSession {
            code: "123456".into(),
            url: "http://10.0.0.2:5000".into(),
            file_path: PathBuf::from("/tmp/a.bin"),
            file_name: "a.bin".into(),
            file_size: 1 << 20,
            is_dir: false,
            status: TransferStatus::Transferring,
            bytes_transferred: bytes,
        })
    }

    #[test]
    fn test_event_names() {
        assert_eq!(Event::ServerError(String::new()).name(), "server-error");
        assert_eq!(Event::P2pError(String::new()).name(), "p2p-error");
    }

    #[test]
    fn test_error_payload_is_string() {
        let event = Event::P2pError("listener closed".into());
        assert_eq!(event.payload(), serde_json::json!("listener closed"));
    }

    #[tokio::test]
    async fn test_channel_notifier_delivers_in_order() {
        let (notifier, mut rx) = ChannelNotifier::new();
        notifier.notify(Event::ServerError("first".into()));
        notifier.notify(Event::P2pError("second".into()));

        assert!(matches!(rx.recv().await, Some(Event::ServerError(m)) if m == "first"));
        assert!(matches!(rx.recv().await, Some(Event::P2pError(m)) if m == "second"));
    }

    #[test]
    fn test_channel_notifier_survives_dropped_receiver() {
        let (notifier, rx) = ChannelNotifier::new();
        drop(rx);
        notifier.notify(Event::ServerError("nobody listening".into()));
    }

    #[test]
    fn test_closure_notifier() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let notifier = move |event: Event| sink.lock().unwrap().push(event.name());

        notifier.notify(Event::ServerError("boom".into()));
        assert_eq!(*seen.lock().unwrap(), vec!["server-error"]);
    }

    #[test]
    fn test_lagging_consumer_drops_progress_but_not_status() {
        let (notifier, mut rx) = ChannelNotifier::new();
        for bytes in 0..10_000 {
            notifier.notify(progress(bytes));
        }
        notifier.notify(Event::P2pError("transfer aborted".into()));

        let mut progress_seen = 0;
        let mut last = None;
        while let Some(event) = rx.try_recv() {
            if matches!(event, Event::P2pProgress(_)) {
                progress_seen += 1;
            }
            last = Some(event);
        }
        assert_eq!(progress_seen, MAX_QUEUED_PROGRESS);
        assert!(matches!(last, Some(Event::P2pError(m)) if m == "transfer aborted"));
    }

    #[tokio::test]
    async fn test_draining_frees_progress_slots() {
        let (notifier, mut rx) = ChannelNotifier::new();
        for bytes in 0..MAX_QUEUED_PROGRESS as u64 {
            notifier.notify(progress(bytes));
        }
        assert!(matches!(rx.recv().await, Some(Event::P2pProgress(s)) if s.bytes_transferred == 0));

        notifier.notify(progress(999));
        let mut last = 0;
        while let Some(Event::P2pProgress(s)) = rx.try_recv() {
            last = s.bytes_transferred;
        }
        assert_eq!(last, 999);
    }
}
