//! Watch bus for store change notifications.

use std::fmt;

use operator_api::{Object, ObjectKind, OwnerReference};
use tokio::sync::broadcast;
use tracing::trace;

use crate::error::{Error, Result};

const DEFAULT_CAPACITY: usize = 1024;

/// What happened to an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Added => "Added",
            Self::Modified => "Modified",
            Self::Deleted => "Deleted",
        };
        f.write_str(text)
    }
}

/// A change notification.
///
/// Carries the owner references so that listeners can requeue parents
/// without reading the object back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: ObjectKind,
    pub name: String,
    pub change: ChangeKind,
    pub owner_references: Vec<OwnerReference>,
}

impl WatchEvent {
    /// Notification for an object.
    pub fn for_object<T: Object>(object: &T, change: ChangeKind) -> Self {
        Self {
            kind: T::KIND,
            name: object.name().to_string(),
            change,
            owner_references: object.metadata().owner_references.clone(),
        }
    }

    /// Owner of the given kind, if any.
    pub fn owner(&self, kind: ObjectKind) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|r| r.kind == kind)
    }
}

/// Pattern for filtering notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchPattern {
    /// Match all notifications.
    All,
    /// Match notifications for one kind.
    ByKind(ObjectKind),
    /// Match notifications for any of several kinds.
    ByKinds(Vec<ObjectKind>),
}

impl WatchPattern {
    /// Check if a notification matches this pattern.
    pub fn matches(&self, event: &WatchEvent) -> bool {
        match self {
            Self::All => true,
            Self::ByKind(kind) => event.kind == *kind,
            Self::ByKinds(kinds) => kinds.contains(&event.kind),
        }
    }
}

/// Subscription handle for receiving notifications.
pub struct WatchSubscription {
    receiver: broadcast::Receiver<WatchEvent>,
    pattern: WatchPattern,
}

impl WatchSubscription {
    /// Receive the next matching notification.
    ///
    /// # Errors
    ///
    /// [`Error::Lagged`] when notifications were dropped because the
    /// subscriber fell behind; the subscription stays usable.
    /// [`Error::ChannelClosed`] once every store is gone.
    pub async fn recv(&mut self) -> Result<WatchEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.pattern.matches(&event) => return Ok(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    return Err(Error::Lagged { missed });
                }
                Err(broadcast::error::RecvError::Closed) => return Err(Error::ChannelClosed),
            }
        }
    }
}

/// Broadcast bus shared by every store of a cluster.
#[derive(Debug, Clone)]
pub struct WatchBus {
    sender: broadcast::Sender<WatchEvent>,
}

impl WatchBus {
    /// Create a bus with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus buffering up to `capacity` notifications per subscriber.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish a notification. Having no subscriber is not an error.
    pub fn publish(&self, event: WatchEvent) {
        trace!(kind = %event.kind, name = %event.name, change = %event.change, "Publishing change");
        let _ = self.sender.send(event);
    }

    /// Subscribe to notifications matching a pattern.
    pub fn subscribe(&self, pattern: WatchPattern) -> WatchSubscription {
        WatchSubscription {
            receiver: self.sender.subscribe(),
            pattern,
        }
    }
}

impl Default for WatchBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use operator_api::Node;

    use super::*;

    #[tokio::test]
    async fn test_pattern_filters_by_kind() -> Result<()> {
        let bus = WatchBus::new();
        let mut nodes_only = bus.subscribe(WatchPattern::ByKind(ObjectKind::Node));
        let mut everything = bus.subscribe(WatchPattern::All);

        bus.publish(WatchEvent {
            kind: ObjectKind::Operation,
            name: "op".to_string(),
            change: ChangeKind::Added,
            owner_references: Vec::new(),
        });
        bus.publish(WatchEvent::for_object(&Node::new("n1"), ChangeKind::Added));

        assert_eq!(everything.recv().await?.kind, ObjectKind::Operation);
        assert_eq!(everything.recv().await?.kind, ObjectKind::Node);
        assert_eq!(nodes_only.recv().await?.name, "n1");
        Ok(())
    }

    #[tokio::test]
    async fn test_lagging_subscriber_is_told() {
        let bus = WatchBus::with_capacity(1);
        let mut sub = bus.subscribe(WatchPattern::All);

        bus.publish(WatchEvent::for_object(&Node::new("n1"), ChangeKind::Added));
        bus.publish(WatchEvent::for_object(&Node::new("n2"), ChangeKind::Added));

        let first = sub.recv().await;
        assert!(matches!(first, Err(Error::Lagged { .. })));
        let next = sub.recv().await.map(|e| e.name);
        assert_eq!(next, Ok("n2".to_string()));
    }

    #[test]
    fn test_patterns() {
        let event = WatchEvent::for_object(&Node::new("n1"), ChangeKind::Deleted);
        assert!(WatchPattern::ByKinds(vec![ObjectKind::Operation, ObjectKind::Node]).matches(&event));
        assert!(!WatchPattern::ByKind(ObjectKind::RuntimeTask).matches(&event));
    }
}
