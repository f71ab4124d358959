//! Snapshot fan-out shared by the store backends.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;

use super::{DocumentPath, Snapshot, SnapshotStream};

/// Registry of open snapshot streams, keyed by document.
///
/// Closed receivers are pruned lazily on the next publish.
#[derive(Debug, Default)]
pub(crate) struct SubscriberHub {
    subscribers: Mutex<HashMap<DocumentPath, Vec<mpsc::UnboundedSender<Snapshot>>>>,
}

impl SubscriberHub {
    /// Open a stream for `path` that starts with `initial`.
    pub(crate) fn register(&self, path: &DocumentPath, initial: Snapshot) -> SnapshotStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        // The receiver is alive here, so the initial send cannot fail.
        let _ = sender.send(initial);
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.entry(path.clone()).or_default().push(sender);
        }
        receiver
    }

    /// Deliver `snapshot` to every open stream for `path`.
    pub(crate) fn publish(&self, path: &DocumentPath, snapshot: &Snapshot) {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return;
        };
        let Some(senders) = subscribers.get_mut(path) else {
            return;
        };
        senders.retain(|sender| sender.send(snapshot.clone()).is_ok());
        if senders.is_empty() {
            subscribers.remove(path);
        }
    }

    /// Number of streams for `path` whose receiver is still alive.
    pub(crate) fn live_count(&self, path: &DocumentPath) -> usize {
        self.subscribers.lock().map_or(0, |subscribers| {
            subscribers
                .get(path)
                .map_or(0, |senders| senders.iter().filter(|s| !s.is_closed()).count())
        })
    }

    /// Documents with at least one live stream.
    pub(crate) fn watched_paths(&self) -> Vec<DocumentPath> {
        self.subscribers.lock().map_or_else(
            |_| Vec::new(),
            |subscribers| {
                subscribers
                    .iter()
                    .filter(|(_, senders)| senders.iter().any(|sender| !sender.is_closed()))
                    .map(|(path, _)| path.clone())
                    .collect()
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DataType;
    use crate::remote::RemoteDocument;
    use serde_json::Map;

    #[test]
    fn publish_prunes_closed_streams() {
        let hub = SubscriberHub::default();
        let path = DocumentPath::new("u1", DataType::Preferences);

        let mut kept = hub.register(&path, None);
        let dropped = hub.register(&path, None);
        drop(dropped);
        assert_eq!(hub.live_count(&path), 1);

        let doc = RemoteDocument {
            payload: Map::new(),
            updated_at: 7,
        };
        hub.publish(&path, &Some(doc.clone()));

        assert_eq!(kept.try_recv().unwrap(), None);
        assert_eq!(kept.try_recv().unwrap(), Some(doc));
        assert_eq!(hub.watched_paths(), vec![path]);
    }
}
