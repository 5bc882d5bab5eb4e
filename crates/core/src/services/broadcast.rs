//! Broadcast hub.
//!
//! Fans poll change notifications out to every live viewer. A single task
//! owns the subscriber table; callers talk to it over one command channel,
//! so registration, removal and delivery happen in call order.

use std::{
    collections::HashMap,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    task::{Context, Poll},
};

use futures::Stream;
use tokio::sync::{
    Notify,
    mpsc::{self, error::TrySendError},
    watch,
};
use tracing::{debug, info};

use super::aggregation::ResultSnapshot;

/// Subscriber identifier, unique per hub.
pub type SubscriberId = u64;

/// A change to a poll that live viewers should see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    /// Results changed. `payload` is the serialized [`ResultSnapshot`].
    Updated { poll_id: i32, payload: Arc<str> },
    /// The poll no longer exists.
    Deleted { poll_id: i32 },
}

impl PollEvent {
    /// Build an update event, serializing the snapshot once for all viewers.
    pub fn updated(snapshot: &ResultSnapshot) -> Result<Self, serde_json::Error> {
        let payload = serde_json::to_string(snapshot)?;
        Ok(Self::Updated {
            poll_id: snapshot.poll_id,
            payload: payload.into(),
        })
    }

    /// The poll this event is about.
    #[must_use]
    pub const fn poll_id(&self) -> i32 {
        match self {
            Self::Updated { poll_id, .. } | Self::Deleted { poll_id } => *poll_id,
        }
    }

    /// Event name used on the wire.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Updated { poll_id, .. } => format!("poll_update_{poll_id}"),
            Self::Deleted { poll_id } => format!("poll_deleted_{poll_id}"),
        }
    }

    /// Event body used on the wire.
    #[must_use]
    pub fn data(&self) -> String {
        match self {
            Self::Updated { payload, .. } => payload.to_string(),
            Self::Deleted { poll_id } => serde_json::json!({ "pollId": poll_id }).to_string(),
        }
    }
}

/// Requests handled by the hub task, in the order they were made.
enum Command {
    Register(SubscriberId, mpsc::Sender<PollEvent>),
    Deregister(SubscriberId),
    Publish(PollEvent),
}

/// Handle to the hub task. Cheap to clone.
#[derive(Clone)]
pub struct BroadcastHub {
    commands: mpsc::UnboundedSender<Command>,
    subscribers: watch::Receiver<usize>,
    shutdown: Arc<Notify>,
    next_id: Arc<AtomicU64>,
    buffer: usize,
}

impl BroadcastHub {
    /// Start the hub task. Each subscriber may lag by up to `buffer` events
    /// before further events to it are dropped.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(buffer: usize) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (count_tx, subscribers) = watch::channel(0);
        let shutdown = Arc::new(Notify::new());

        tokio::spawn(run(commands_rx, count_tx, Arc::clone(&shutdown)));

        Self {
            commands,
            subscribers,
            shutdown,
            next_id: Arc::new(AtomicU64::new(1)),
            buffer: buffer.max(1),
        }
    }

    /// Register a new live viewer.
    ///
    /// The viewer receives every event published after this call returns.
    /// After the hub has shut down the returned stream ends immediately.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, receiver) = mpsc::channel(self.buffer);

        if self.commands.send(Command::Register(id, tx)).is_err() {
            debug!(subscriber = id, "Hub stopped; subscription closed");
        }

        Subscription {
            id,
            receiver,
            commands: self.commands.clone(),
        }
    }

    /// Queue an event for every current subscriber. Never blocks.
    pub fn publish(&self, event: PollEvent) {
        if self.commands.send(Command::Publish(event)).is_err() {
            debug!("Hub stopped; event discarded");
        }
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        *self.subscribers.borrow()
    }

    /// Watch the subscriber count.
    #[must_use]
    pub fn subscribers(&self) -> watch::Receiver<usize> {
        self.subscribers.clone()
    }

    /// Stop the hub. Every subscription stream ends.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

async fn run(
    mut commands: mpsc::UnboundedReceiver<Command>,
    count_tx: watch::Sender<usize>,
    shutdown: Arc<Notify>,
) {
    let mut subscribers: HashMap<SubscriberId, mpsc::Sender<PollEvent>> = HashMap::new();

    loop {
        tokio::select! {
            biased;

            () = shutdown.notified() => break,

            command = commands.recv() => match command {
                Some(Command::Register(id, tx)) => {
                    subscribers.insert(id, tx);
                    debug!(subscriber = id, total = subscribers.len(), "Subscriber registered");
                }
                Some(Command::Deregister(id)) => {
                    if subscribers.remove(&id).is_some() {
                        debug!(subscriber = id, total = subscribers.len(), "Subscriber removed");
                    }
                }
                Some(Command::Publish(event)) => deliver(&mut subscribers, &event),
                None => break,
            },
        }

        count_tx.send_replace(subscribers.len());
    }

    let remaining = subscribers.len();
    subscribers.clear();
    count_tx.send_replace(0);
    info!(subscribers = remaining, "Broadcast hub stopped");
}

fn deliver(subscribers: &mut HashMap<SubscriberId, mpsc::Sender<PollEvent>>, event: &PollEvent) {
    subscribers.retain(|id, tx| match tx.try_send(event.clone()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            debug!(
                subscriber = id,
                poll_id = event.poll_id(),
                "Subscriber buffer full; event dropped"
            );
            true
        }
        Err(TrySendError::Closed(_)) => {
            debug!(subscriber = id, "Subscriber gone");
            false
        }
    });
}

/// A live viewer's event stream.
///
/// Dropping it removes the viewer from the hub.
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<PollEvent>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Subscription {
    /// This subscription's identifier.
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event. `None` once the hub has stopped.
    pub async fn recv(&mut self) -> Option<PollEvent> {
        self.receiver.recv().await
    }
}

impl Stream for Subscription {
    type Item = PollEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // The hub may already be gone.
        let _ = self.commands.send(Command::Deregister(self.id));
    }
}
